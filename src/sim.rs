//! Simulation host: owns one model, steps it once per tick, and publishes
//! bound outputs to a sink as typed signals.
//!
//! A binding names the first of one to three consecutive raw outputs and how
//! to read them. Bindings are checked against the model layout when the
//! host is created, so a tick can only fail on a bad input vector.

use serde::{Deserialize, Serialize};

use crate::error::{EslError, Result};
use crate::model::Model;

// ─── Bindings ──────────────────────────────────────────────────────

/// How consecutive outputs are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingKind {
    Float,
    /// True when the output exceeds 0.5.
    Bool,
    Vector2,
    Vector3,
}

impl BindingKind {
    /// Number of outputs read.
    pub fn width(self) -> usize {
        match self {
            BindingKind::Float | BindingKind::Bool => 1,
            BindingKind::Vector2 => 2,
            BindingKind::Vector3 => 3,
        }
    }

    fn read(self, outputs: &[f32]) -> Signal {
        match self {
            BindingKind::Float => Signal::Float(outputs[0]),
            BindingKind::Bool => Signal::Bool(outputs[0] > 0.5),
            BindingKind::Vector2 => Signal::Vector2([outputs[0], outputs[1]]),
            BindingKind::Vector3 => Signal::Vector3([outputs[0], outputs[1], outputs[2]]),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub kind: BindingKind,
    /// First raw output index.
    pub output: usize,
}

impl Binding {
    pub fn new(kind: BindingKind, output: usize) -> Self {
        Self { kind, output }
    }
}

/// A published value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Signal {
    Float(f32),
    Bool(bool),
    Vector2([f32; 2]),
    Vector3([f32; 3]),
}

// ─── Host ──────────────────────────────────────────────────────────

pub struct Simulation {
    model: Model,
    bindings: Vec<Binding>,
    ticks: u64,
}

impl Simulation {
    pub fn new(model: Model, bindings: Vec<Binding>) -> Result<Self> {
        let outputs = model.layout().output_elements;
        for (i, b) in bindings.iter().enumerate() {
            if b.output + b.kind.width() > outputs {
                return Err(EslError::InvalidArgument(format!(
                    "binding {} reads outputs {}..{} of {}",
                    i,
                    b.output,
                    b.output + b.kind.width(),
                    outputs
                )));
            }
        }
        Ok(Self {
            model,
            bindings,
            ticks: 0,
        })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn into_model(self) -> Model {
        self.model
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Step the model and hand every binding's signal to `sink`, in binding
    /// order.
    pub fn tick(&mut self, inputs: &[f32], mut sink: impl FnMut(usize, Signal)) -> Result<()> {
        let outputs = self.model.step(inputs)?;
        for (i, b) in self.bindings.iter().enumerate() {
            sink(i, b.kind.read(&outputs[b.output..]));
        }
        self.ticks += 1;
        log::trace!("tick {} published {} signals", self.ticks, self.bindings.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;

    fn passthrough(n: usize) -> Model {
        Model::build(ModelConfig::new(n, n).with_memory(0, 0), |b| {
            for i in 0..n {
                let x = b.input(i)?;
                b.set_output(i, x)?;
            }
            Ok(())
        })
        .unwrap()
    }

    #[test]
    fn publishes_each_binding_in_order() {
        let bindings = vec![
            Binding::new(BindingKind::Vector3, 0),
            Binding::new(BindingKind::Bool, 3),
            Binding::new(BindingKind::Float, 3),
            Binding::new(BindingKind::Vector2, 2),
        ];
        let mut sim = Simulation::new(passthrough(4), bindings).unwrap();
        let mut seen = Vec::new();
        sim.tick(&[1.0, 2.0, 3.0, 0.75], |i, s| seen.push((i, s)))
            .unwrap();
        assert_eq!(
            seen,
            vec![
                (0, Signal::Vector3([1.0, 2.0, 3.0])),
                (1, Signal::Bool(true)),
                (2, Signal::Float(0.75)),
                (3, Signal::Vector2([3.0, 0.75])),
            ]
        );

        seen.clear();
        sim.tick(&[0.0, 0.0, 0.0, 0.5], |i, s| seen.push((i, s)))
            .unwrap();
        assert_eq!(seen[1], (1, Signal::Bool(false)));
        assert_eq!(sim.ticks(), 2);
    }

    #[test]
    fn bindings_past_the_outputs_are_rejected() {
        let result = Simulation::new(passthrough(2), vec![Binding::new(BindingKind::Vector2, 1)]);
        assert!(matches!(result, Err(EslError::InvalidArgument(_))));
    }

    #[test]
    fn bad_inputs_publish_nothing() {
        let mut sim =
            Simulation::new(passthrough(1), vec![Binding::new(BindingKind::Float, 0)]).unwrap();
        let mut calls = 0;
        assert!(sim.tick(&[1.0, 2.0], |_, _| calls += 1).is_err());
        assert_eq!(calls, 0);
        assert_eq!(sim.ticks(), 0);
    }
}
