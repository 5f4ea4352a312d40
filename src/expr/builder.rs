//! Construction context for model expressions.
//!
//! `Builder` owns the arena, the model layout and the output slots. Every
//! operator lowers to a `Terminal` or a `Blop`; with simplification on,
//! affine operators over terminals fold into a single terminal.

use crate::error::{EslError, Result};
use crate::model::{Layout, ModelConfig};
use crate::vector::Vector;

use super::{Activation, Blop, Expr, ExprId, Graph, Terminal};

/// Tolerance used by `approximately` when none is given.
pub const DEFAULT_EPSILON: f32 = 1e-6;

/// Anything an operator accepts: an expression or a constant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operand {
    Expr(ExprId),
    Constant(f32),
}

impl From<ExprId> for Operand {
    fn from(id: ExprId) -> Self {
        Operand::Expr(id)
    }
}

impl From<f32> for Operand {
    fn from(v: f32) -> Self {
        Operand::Constant(v)
    }
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Operand::Constant(v as f32)
    }
}

impl From<bool> for Operand {
    fn from(v: bool) -> Self {
        Operand::Constant(if v { 1.0 } else { 0.0 })
    }
}

/// Explicit construction context; consumed by `finish` to produce a `Model`.
pub struct Builder {
    pub(crate) config: ModelConfig,
    pub(crate) layout: Layout,
    pub(crate) graph: Graph,
    pub(crate) outputs: Vec<Option<ExprId>>,
}

impl Builder {
    pub fn new(config: ModelConfig) -> Self {
        let layout = Layout::new(&config);
        let outputs = vec![None; layout.output_count];
        Self {
            config,
            layout,
            graph: Graph::new(),
            outputs,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Expression currently bound to absolute output `index` (`None` = 0).
    pub fn output(&self, index: usize) -> Option<ExprId> {
        self.outputs.get(index).copied().flatten()
    }

    fn simplify(&self) -> bool {
        self.config.simplify_expressions
    }

    // ─── Terminals ─────────────────────────────────────────────────

    pub fn constant(&mut self, v: f32) -> ExprId {
        let mut coefficients = Vector::zeros(self.layout.input_count);
        coefficients[Layout::BIAS_OFFSET] = v;
        self.terminal(coefficients)
    }

    /// `scale * x[input] + offset` over the combined input vector.
    pub fn value(&mut self, input: usize, scale: f32, offset: f32) -> Result<ExprId> {
        check_index("combined input", input, self.layout.input_count)?;
        let mut coefficients = Vector::zeros(self.layout.input_count);
        coefficients[input] = scale;
        coefficients[Layout::BIAS_OFFSET] = offset;
        Ok(self.terminal(coefficients))
    }

    pub fn input(&mut self, i: usize) -> Result<ExprId> {
        check_index("input", i, self.layout.input_elements)?;
        self.value(self.layout.input_offset + i, 1.0, 0.0)
    }

    pub fn state(&mut self, i: usize) -> Result<ExprId> {
        check_index("state", i, self.layout.state_count)?;
        self.value(self.layout.state_input_offset + i, 1.0, 0.0)
    }

    pub fn fetch(&mut self, i: usize) -> Result<ExprId> {
        check_index("fetch", i, self.layout.content_elements)?;
        self.value(self.layout.contents_input_offset + i, 1.0, 0.0)
    }

    /// Uniform sample in `[min, max)` from random tap `source`.
    pub fn random(&mut self, min: f32, max: f32, source: usize) -> Result<ExprId> {
        check_index("random source", source, self.layout.random_elements)?;
        self.value(Layout::RANDOM_OFFSET + source, max - min, min)
    }

    fn terminal(&mut self, coefficients: Vector) -> ExprId {
        self.graph.push(Expr::Terminal(Terminal { coefficients }))
    }

    // ─── Raw construction ──────────────────────────────────────────

    pub fn blop(&mut self, blop: Blop) -> ExprId {
        self.graph.push(Expr::Blop(blop))
    }

    fn resolve(&mut self, operand: impl Into<Operand>) -> ExprId {
        match operand.into() {
            Operand::Expr(id) => id,
            Operand::Constant(v) => self.constant(v),
        }
    }

    fn coefficients(&self, id: ExprId) -> Option<&Vector> {
        match self.graph.get(id) {
            Expr::Terminal(t) => Some(&t.coefficients),
            Expr::Blop(_) => None,
        }
    }

    fn fold1(&mut self, a: ExprId, f: impl FnOnce(&Vector) -> Vector) -> Option<ExprId> {
        if !self.simplify() {
            return None;
        }
        let folded = f(self.coefficients(a)?);
        Some(self.terminal(folded))
    }

    fn fold2(
        &mut self,
        l: ExprId,
        r: ExprId,
        f: impl FnOnce(&Vector, &Vector) -> Vector,
    ) -> Option<ExprId> {
        if !self.simplify() {
            return None;
        }
        let folded = f(self.coefficients(l)?, self.coefficients(r)?);
        Some(self.terminal(folded))
    }

    fn unary(&mut self, a: ExprId, op: [f32; 4]) -> ExprId {
        self.blop(Blop::new(Some(a), None, op))
    }

    fn binary(
        &mut self,
        l: impl Into<Operand>,
        r: impl Into<Operand>,
        op: [f32; 4],
    ) -> ExprId {
        let l = self.resolve(l);
        let r = self.resolve(r);
        self.blop(Blop::new(Some(l), Some(r), op))
    }

    // ─── Affine operators ──────────────────────────────────────────

    pub fn identity(&mut self, a: impl Into<Operand>) -> ExprId {
        let a = self.resolve(a);
        self.fold1(a, Vector::clone)
            .unwrap_or_else(|| self.unary(a, [0.0, 1.0, 0.0, 0.0]))
    }

    pub fn negate(&mut self, a: impl Into<Operand>) -> ExprId {
        let a = self.resolve(a);
        self.fold1(a, Vector::negated)
            .unwrap_or_else(|| self.unary(a, [0.0, -1.0, 0.0, 0.0]))
    }

    pub fn add(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        let (l, r) = (self.resolve(l), self.resolve(r));
        self.fold2(l, r, Vector::sum)
            .unwrap_or_else(|| self.binary(l, r, [0.0, 1.0, 1.0, 0.0]))
    }

    pub fn subtract(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        let (l, r) = (self.resolve(l), self.resolve(r));
        self.fold2(l, r, Vector::difference)
            .unwrap_or_else(|| self.binary(l, r, [0.0, 1.0, -1.0, 0.0]))
    }

    /// Multiply by a constant factor.
    pub fn scale(&mut self, a: impl Into<Operand>, s: f32) -> ExprId {
        let a = self.resolve(a);
        self.fold1(a, |c| c.scaled(s))
            .unwrap_or_else(|| self.unary(a, [0.0, s, 0.0, 0.0]))
    }

    /// `1 - a`.
    pub fn not(&mut self, a: impl Into<Operand>) -> ExprId {
        let a = self.resolve(a);
        let one = self.layout.input_count;
        self.fold1(a, |c| {
            let mut v = Vector::zeros(one);
            v[Layout::BIAS_OFFSET] = 1.0;
            v.difference(c)
        })
        .unwrap_or_else(|| self.unary(a, [0.0, -1.0, 0.0, 1.0]))
    }

    // ─── Bilinear operators ────────────────────────────────────────

    pub fn multiply(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        self.binary(l, r, [1.0, 0.0, 0.0, 0.0])
    }

    pub fn and(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        self.binary(l, r, [1.0, 0.0, 0.0, 0.0])
    }

    pub fn or(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        self.binary(l, r, [-1.0, 1.0, 1.0, 0.0])
    }

    pub fn nor(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        self.binary(l, r, [1.0, -1.0, -1.0, 1.0])
    }

    pub fn nand(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        self.binary(l, r, [-1.0, 0.0, 0.0, 1.0])
    }

    /// `!l & r`.
    pub fn not_and(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        self.binary(l, r, [-1.0, 0.0, 1.0, 0.0])
    }

    pub fn xor(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        let (l, r) = (self.resolve(l), self.resolve(r));
        let either = self.or(l, r);
        let not_both = self.nand(l, r);
        self.and(either, not_both)
    }

    // ─── Comparisons ───────────────────────────────────────────────

    /// 1 when `a > 0`, else 0. A blop operand is copied with the step
    /// activation instead of being wrapped.
    pub fn binary_step(&mut self, a: impl Into<Operand>) -> ExprId {
        let a = self.resolve(a);
        match self.graph.blop(a) {
            Some(b) => {
                let stepped = b.clone().with_activation(Activation::BinaryStep);
                self.blop(stepped)
            }
            None => self.blop(
                Blop::new(Some(a), None, [0.0, 1.0, 0.0, 0.0])
                    .with_activation(Activation::BinaryStep),
            ),
        }
    }

    pub fn greater_than(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        let diff = self.subtract(l, r);
        self.binary_step(diff)
    }

    pub fn less_than(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        let (l, r) = (self.resolve(l), self.resolve(r));
        let diff = self.subtract(r, l);
        self.binary_step(diff)
    }

    pub fn less_equal(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        let gt = self.greater_than(l, r);
        self.not(gt)
    }

    pub fn greater_equal(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        let lt = self.less_than(l, r);
        self.not(lt)
    }

    pub fn equals(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        let (l, r) = (self.resolve(l), self.resolve(r));
        let gt = self.greater_than(l, r);
        let lt = self.less_than(l, r);
        self.nor(gt, lt)
    }

    pub fn not_equals(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        let (l, r) = (self.resolve(l), self.resolve(r));
        let gt = self.greater_than(l, r);
        let lt = self.less_than(l, r);
        self.or(gt, lt)
    }

    /// `|a - b| < epsilon`, with `DEFAULT_EPSILON` when `epsilon` is `None`.
    pub fn approximately(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
        epsilon: Option<f32>,
    ) -> ExprId {
        let diff = self.subtract(a, b);
        let magnitude = self.abs(diff);
        self.less_than(magnitude, epsilon.unwrap_or(DEFAULT_EPSILON))
    }

    // ─── Selection ─────────────────────────────────────────────────

    /// `cond ? then : otherwise` for a 0/1 condition.
    pub fn select(
        &mut self,
        cond: impl Into<Operand>,
        then: impl Into<Operand>,
        otherwise: impl Into<Operand>,
    ) -> ExprId {
        let cond = self.resolve(cond);
        let taken = self.and(cond, then);
        let skipped = self.not_and(cond, otherwise);
        self.add(taken, skipped)
    }

    pub fn min(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        let (l, r) = (self.resolve(l), self.resolve(r));
        let lt = self.less_than(l, r);
        self.select(lt, l, r)
    }

    pub fn max(&mut self, l: impl Into<Operand>, r: impl Into<Operand>) -> ExprId {
        let (l, r) = (self.resolve(l), self.resolve(r));
        let gt = self.greater_than(l, r);
        self.select(gt, l, r)
    }

    pub fn abs(&mut self, a: impl Into<Operand>) -> ExprId {
        let a = self.resolve(a);
        let negative = self.less_than(a, 0.0);
        let negated = self.negate(a);
        self.select(negative, negated, a)
    }

    pub fn clamp(
        &mut self,
        x: impl Into<Operand>,
        lo: impl Into<Operand>,
        hi: impl Into<Operand>,
    ) -> ExprId {
        let floor = self.max(x, lo);
        self.min(floor, hi)
    }

    pub fn clamp01(&mut self, x: impl Into<Operand>) -> ExprId {
        self.clamp(x, 0.0, 1.0)
    }

    pub fn lerp(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
        t: impl Into<Operand>,
    ) -> ExprId {
        let t = self.clamp01(t);
        self.lerp_unclamped(a, b, t)
    }

    /// `a + (b - a) * t`.
    pub fn lerp_unclamped(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
        t: impl Into<Operand>,
    ) -> ExprId {
        let a = self.resolve(a);
        let span = self.subtract(b, a);
        let step = self.multiply(span, t);
        self.add(a, step)
    }

    // ─── Lookup ────────────────────────────────────────────────────

    /// Select `exprs[k]` where `index` is nearest the k-th of `exprs.len()`
    /// evenly spaced values from `first` to `last`.
    pub fn index(
        &mut self,
        exprs: &[ExprId],
        first: f32,
        last: f32,
        index: impl Into<Operand>,
    ) -> Result<ExprId> {
        if exprs.is_empty() {
            return Err(EslError::InvalidArgument("index over an empty list".into()));
        }
        let index = self.resolve(index);
        Ok(self.bisect(exprs, first, last, index))
    }

    fn bisect(&mut self, exprs: &[ExprId], first: f32, last: f32, index: ExprId) -> ExprId {
        if exprs.len() == 1 {
            return exprs[0];
        }
        let left_count = exprs.len() / 2;
        let scale = (last - first) / (exprs.len() - 1) as f32;
        let (lower, upper) = exprs.split_at(left_count);
        let boundary = first + (left_count as f32 - 0.5) * scale;
        let cond = self.less_than(index, boundary);
        let l = self.bisect(lower, first, first + (left_count as f32 - 1.0) * scale, index);
        let r = self.bisect(upper, first + left_count as f32 * scale, last, index);
        self.select(cond, l, r)
    }

    /// 1 when `e` rounds to `index` among `count` slots, the end slots
    /// absorbing everything beyond them.
    pub fn is_index(&mut self, e: impl Into<Operand>, index: usize, count: usize) -> ExprId {
        let e = self.resolve(e);
        if count <= 1 {
            return self.constant(1.0);
        }
        let i = index as f32;
        if index == 0 {
            return self.less_equal(e, 0.5);
        }
        if index == count - 1 {
            return self.greater_than(e, count as f32 - 1.5);
        }
        let above = self.greater_than(e, i - 0.5);
        let below = self.less_equal(e, i + 0.5);
        self.and(above, below)
    }

    /// State `start + round(e)` for `e` in `0..count`.
    pub fn state_at(&mut self, e: impl Into<Operand>, start: usize, count: usize) -> Result<ExprId> {
        let states = (start..start + count)
            .map(|i| self.state(i))
            .collect::<Result<Vec<_>>>()?;
        let last = count.saturating_sub(1) as f32;
        self.index(&states, 0.0, last, e)
    }

    /// State `round(e)` over every state.
    pub fn state_indexed(&mut self, e: impl Into<Operand>) -> Result<ExprId> {
        self.state_at(e, 0, self.layout.state_count)
    }

    // ─── Output slots ──────────────────────────────────────────────

    pub fn set_output(&mut self, i: usize, e: impl Into<Operand>) -> Result<()> {
        check_index("output", i, self.layout.output_elements)?;
        self.set_output_at(i, e)
    }

    pub fn set_state_output(&mut self, i: usize, e: impl Into<Operand>) -> Result<()> {
        check_index("state output", i, self.layout.state_count)?;
        self.set_output_at(self.layout.state_output_offset + i, e)
    }

    pub fn set_position_output(&mut self, i: usize, e: impl Into<Operand>) -> Result<()> {
        check_index("position output", i, self.layout.position_elements)?;
        self.set_output_at(self.layout.position_output_offset + i, e)
    }

    /// Memory extent along axis `i`, as a base-2 logarithm.
    pub fn set_size_output(&mut self, i: usize, e: impl Into<Operand>) -> Result<()> {
        check_index("size output", i, self.layout.position_elements)?;
        self.set_output_at(self.layout.size_output_offset + i, e)
    }

    pub fn set_increment_output(&mut self, i: usize, e: impl Into<Operand>) -> Result<()> {
        check_index("increment output", i, self.layout.content_elements)?;
        self.set_output_at(self.layout.increment_output_offset + i, e)
    }

    pub fn set_output_at(&mut self, index: usize, e: impl Into<Operand>) -> Result<()> {
        check_index("output slot", index, self.layout.output_count)?;
        let e = self.resolve(e);
        self.outputs[index] = Some(e);
        Ok(())
    }
}

fn check_index(what: &str, index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(EslError::InvalidArgument(format!(
            "{} index {} out of range (0..{})",
            what, index, len
        )))
    }
}
