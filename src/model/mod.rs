//! Model orchestration: build configuration, the optimization pipeline, the
//! per-step loop, and the binary model format.
//!
//! A step assembles the combined input vector, runs the stepper, applies the
//! memory operands from the output vector to the memory tree, keeps the
//! fetch result for the next step, and commits the next-state outputs.

mod layout;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::codec::{Reader, Writer};
use crate::error::{EslError, Result};
use crate::expr::{compact, dedup, Builder};
use crate::memory::Memory;
use crate::stepper::Stepper;
use crate::vector::Vector;

pub use layout::Layout;

// ─── Configuration ─────────────────────────────────────────────────

/// Which optimization passes `Builder::finish` runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeOptions {
    pub compact: bool,
    pub collapse: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            compact: true,
            collapse: true,
        }
    }
}

impl OptimizeOptions {
    /// Fold the expressions as written.
    pub fn none() -> Self {
        Self {
            compact: false,
            collapse: false,
        }
    }
}

/// Sizes of a model's vectors plus build options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub random_elements: usize,
    pub input_elements: usize,
    pub output_elements: usize,
    /// Initial state values; the length is the state count.
    pub states: Vec<f32>,
    pub position_elements: usize,
    pub content_elements: usize,
    /// Fold affine operators over terminals into a single terminal.
    pub simplify_expressions: bool,
    pub optimize: OptimizeOptions,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            random_elements: 0,
            input_elements: 1,
            output_elements: 1,
            states: Vec::new(),
            position_elements: 1,
            content_elements: 1,
            simplify_expressions: true,
            optimize: OptimizeOptions::default(),
        }
    }
}

impl ModelConfig {
    pub fn new(input_elements: usize, output_elements: usize) -> Self {
        Self {
            input_elements,
            output_elements,
            ..Self::default()
        }
    }

    pub fn with_random(mut self, random_elements: usize) -> Self {
        self.random_elements = random_elements;
        self
    }

    pub fn with_states(mut self, states: Vec<f32>) -> Self {
        self.states = states;
        self
    }

    pub fn with_memory(mut self, position_elements: usize, content_elements: usize) -> Self {
        self.position_elements = position_elements;
        self.content_elements = content_elements;
        self
    }

    pub fn with_simplify(mut self, simplify: bool) -> Self {
        self.simplify_expressions = simplify;
        self
    }

    pub fn with_optimize(mut self, optimize: OptimizeOptions) -> Self {
        self.optimize = optimize;
        self
    }
}

/// What the optimizer did and what the resulting stepper costs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub unique_expressions: usize,
    pub collapsed_subexpressions: usize,
    pub collapse_rounds: usize,
    pub operation_count: usize,
    pub stepper_depth: usize,
    pub stepper_nodes: usize,
}

impl BuildReport {
    fn for_stepper(stepper: &Stepper) -> Self {
        Self {
            operation_count: stepper.operation_count(),
            stepper_depth: stepper.depth(),
            stepper_nodes: stepper.node_count(),
            ..Self::default()
        }
    }
}

// ─── Building ──────────────────────────────────────────────────────

impl Builder {
    /// Optimize the output expressions and compile them into a model.
    pub fn finish(self) -> Model {
        let Builder {
            config,
            layout,
            graph,
            outputs,
        } = self;
        let (mut forest, mut roots) = graph.materialize(&outputs);
        if config.optimize.compact {
            compact::compact_all(&mut forest, &mut roots);
        }
        let stats = if config.optimize.collapse {
            dedup::collapse(&mut forest, &mut roots)
        } else {
            dedup::CollapseStats {
                unique_expressions: dedup::unique_expressions(&forest, &roots),
                ..Default::default()
            }
        };
        let stepper = Stepper::from_forest(layout.shape(), &forest, &roots);
        let report = BuildReport {
            unique_expressions: stats.unique_expressions,
            collapsed_subexpressions: stats.collapsed,
            collapse_rounds: stats.rounds,
            ..BuildReport::for_stepper(&stepper)
        };
        log::debug!(
            "created stepper (operations {}, depth {}, unique expressions {}, collapsed {})",
            report.operation_count,
            report.stepper_depth,
            report.unique_expressions,
            report.collapsed_subexpressions
        );
        Model::assemble(layout, config.states, stepper, report)
    }
}

// ─── Model ─────────────────────────────────────────────────────────

/// A compiled simulation: stepper, live state, memory, and random source.
pub struct Model {
    layout: Layout,
    states: Vec<f32>,
    memory: Memory,
    stepper: Stepper,
    fetch_result: Vector,
    rng: StdRng,
    report: BuildReport,
    input: Vector,
    output: Vector,
}

impl Model {
    /// Build a model with `define` filling in the output slots.
    pub fn build(
        config: ModelConfig,
        define: impl FnOnce(&mut Builder) -> Result<()>,
    ) -> Result<Model> {
        let mut builder = Builder::new(config);
        define(&mut builder)?;
        Ok(builder.finish())
    }

    fn assemble(layout: Layout, states: Vec<f32>, stepper: Stepper, report: BuildReport) -> Self {
        Self {
            states,
            memory: Memory::new(layout.position_elements, layout.content_elements),
            stepper,
            fetch_result: Vector::zeros(layout.content_elements),
            rng: StdRng::from_entropy(),
            report,
            input: Vector::zeros(layout.input_count),
            output: Vector::zeros(layout.output_count),
            layout,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    pub fn stepper(&self) -> &Stepper {
        &self.stepper
    }

    pub fn states(&self) -> &[f32] {
        &self.states
    }

    pub fn set_states(&mut self, states: &[f32]) -> Result<()> {
        EslError::check_len("model states", self.layout.state_count, states.len())?;
        self.states.copy_from_slice(states);
        Ok(())
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Replace the memory; its dimensions must match the layout.
    pub fn set_memory(&mut self, memory: Memory) -> Result<()> {
        EslError::check_len(
            "memory position elements",
            self.layout.position_elements,
            memory.position_elements(),
        )?;
        EslError::check_len(
            "memory content elements",
            self.layout.content_elements,
            memory.content_elements(),
        )?;
        self.memory = memory;
        Ok(())
    }

    /// Contents fetched by the previous step.
    pub fn fetch_result(&self) -> &[f32] {
        &self.fetch_result
    }

    /// Make the random taps deterministic.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Advance one step and return the full output vector.
    pub fn step(&mut self, inputs: &[f32]) -> Result<&[f32]> {
        let l = self.layout;
        EslError::check_len("model inputs", l.input_elements, inputs.len())?;

        self.input[Layout::BIAS_OFFSET] = 1.0;
        for slot in &mut self.input[Layout::RANDOM_OFFSET..l.input_offset] {
            *slot = self.rng.gen::<f32>();
        }
        self.input[l.input_offset..l.state_input_offset].copy_from_slice(inputs);
        self.input[l.state_input_offset..l.contents_input_offset].copy_from_slice(&self.states);
        self.input[l.contents_input_offset..].copy_from_slice(&self.fetch_result);

        self.stepper.step(&self.input, &mut self.output)?;

        let position = &self.output[l.position_output_offset..l.size_output_offset];
        let size = &self.output[l.size_output_offset..l.increment_output_offset];
        let increment = &self.output[l.increment_output_offset..];
        self.memory
            .increment_and_fetch_into(position, size, increment, &mut self.fetch_result)?;

        self.states
            .copy_from_slice(&self.output[l.state_output_offset..l.position_output_offset]);
        Ok(&self.output)
    }

    // ─── Binary form ───────────────────────────────────────────────

    pub fn write(&self, w: &mut Writer) -> Result<()> {
        let l = &self.layout;
        for count in [
            l.random_elements,
            l.input_elements,
            l.output_elements,
            l.state_count,
            l.position_elements,
            l.content_elements,
        ] {
            w.write_len(count)?;
        }
        self.stepper.write(w);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = Writer::new();
        self.write(&mut w)?;
        Ok(w.into_bytes())
    }

    /// Restore a model. States come back zeroed and the memory empty; an
    /// empty stream yields a one-input, one-output model with no state and
    /// no memory.
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        if r.is_at_end() {
            let layout = Layout::from_counts(0, 1, 1, 0, 0, 0);
            let stepper = Stepper::new(layout.shape());
            let report = BuildReport::for_stepper(&stepper);
            return Ok(Model::assemble(layout, Vec::new(), stepper, report));
        }
        let layout = Layout::from_counts(
            r.read_len("random elements")?,
            r.read_len("input elements")?,
            r.read_len("output elements")?,
            r.read_len("state count")?,
            r.read_len("position elements")?,
            r.read_len("content elements")?,
        );
        let stepper = Stepper::read(r, layout.shape())?;
        let report = BuildReport::for_stepper(&stepper);
        Ok(Model::assemble(
            layout,
            vec![0.0; layout.state_count],
            stepper,
            report,
        ))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let model = Model::read(&mut r)?;
        if !r.is_at_end() {
            return Err(EslError::CorruptData(format!(
                "{} trailing bytes after model",
                r.remaining()
            )));
        }
        Ok(model)
    }
}
