//! Compiled evaluator.
//!
//! A `Stepper` is a binary tree mirroring the positions of the optimized
//! expression forest. Each node evaluates every output at its position at
//! once: a `Leaf` is a dot product per output, an `Internal` node combines
//! its children's output vectors (optionally remapped, so one output can
//! read another output's value at the child position) through per-output
//! bilinear coefficients and an activation selector, then adds its own
//! direct term. All buffers are allocated at construction; `step` does not
//! allocate.

#[cfg(test)]
mod tests;

use crate::codec::{check_nesting, Reader, Writer};
use crate::error::{EslError, Result};
use crate::expr::{binary_step, Activation, Blop, Expr, ExprId, Graph};
use crate::vector::Vector;

/// Input and output vector lengths shared by every node of one stepper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shape {
    pub inputs: usize,
    pub outputs: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stepper {
    Leaf(LeafStepper),
    Internal(Box<InternalStepper>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeafStepper {
    shape: Shape,
    /// Input coefficients, one row per output.
    rows: Vec<Vector>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InternalStepper {
    shape: Shape,
    rows: Vec<Vector>,
    left: Option<Stepper>,
    right: Option<Stepper>,
    /// `lr`, `l`, `r`, `c`, each indexed by output.
    op: [Vector; 4],
    left_remaps: Vec<Vector>,
    right_remaps: Vec<Vector>,
    activations: Vec<Vector>,
    left_out: Vector,
    right_out: Vector,
}

impl Stepper {
    /// A leaf producing zero for every output.
    pub fn new(shape: Shape) -> Self {
        Stepper::Leaf(LeafStepper {
            shape,
            rows: zero_rows(shape),
        })
    }

    /// Fold every output root of an optimized forest, in output order.
    pub fn from_forest(shape: Shape, graph: &Graph, roots: &[Option<ExprId>]) -> Self {
        let mut stepper = Stepper::new(shape);
        for (output, root) in roots.iter().enumerate() {
            stepper.set_output(output, graph, *root);
        }
        stepper
    }

    pub fn shape(&self) -> Shape {
        match self {
            Stepper::Leaf(leaf) => leaf.shape,
            Stepper::Internal(node) => node.shape,
        }
    }

    fn rows_mut(&mut self) -> &mut [Vector] {
        match self {
            Stepper::Leaf(leaf) => &mut leaf.rows,
            Stepper::Internal(node) => &mut node.rows,
        }
    }

    /// Fold the expression computing `output` at this position.
    pub fn set_output(&mut self, output: usize, graph: &Graph, expr: Option<ExprId>) {
        let Some(id) = expr else { return };
        match graph.get(id) {
            Expr::Terminal(t) => self.rows_mut()[output].copy_from(&t.coefficients),
            Expr::Blop(b) => {
                self.promote();
                if let Stepper::Internal(node) = self {
                    node.set_blop(output, graph, b);
                }
            }
        }
    }

    fn promote(&mut self) {
        if let Stepper::Leaf(leaf) = self {
            let shape = leaf.shape;
            let rows = std::mem::take(&mut leaf.rows);
            *self = Stepper::Internal(Box::new(InternalStepper::new(shape, rows)));
        }
    }

    /// Evaluate every output for a combined input vector.
    pub fn step(&mut self, input: &[f32], result: &mut [f32]) -> Result<()> {
        let shape = self.shape();
        EslError::check_len("stepper input", shape.inputs, input.len())?;
        EslError::check_len("stepper result", shape.outputs, result.len())?;
        self.step_into(input, result);
        Ok(())
    }

    fn step_into(&mut self, input: &[f32], result: &mut [f32]) {
        match self {
            Stepper::Leaf(leaf) => {
                for (out, row) in result.iter_mut().zip(&leaf.rows) {
                    *out = row.dot(input);
                }
            }
            Stepper::Internal(node) => node.step_into(input, result),
        }
    }

    /// Evaluation cost estimate.
    pub fn operation_count(&self) -> usize {
        match self {
            Stepper::Leaf(leaf) => leaf.shape.outputs,
            Stepper::Internal(node) => {
                let outputs = node.shape.outputs;
                let side = |child: &Option<Stepper>| {
                    child.as_ref().map_or(0, |c| c.operation_count() + outputs)
                };
                side(&node.left) + side(&node.right) + 2 * outputs + 5
            }
        }
    }

    /// Longest path to a leaf (leaf = 0).
    pub fn depth(&self) -> usize {
        match self {
            Stepper::Leaf(_) => 0,
            Stepper::Internal(node) => {
                let d = |child: &Option<Stepper>| child.as_ref().map_or(0, Stepper::depth);
                1 + d(&node.left).max(d(&node.right))
            }
        }
    }

    pub fn node_count(&self) -> usize {
        match self {
            Stepper::Leaf(_) => 1,
            Stepper::Internal(node) => {
                let n = |child: &Option<Stepper>| child.as_ref().map_or(0, Stepper::node_count);
                1 + n(&node.left) + n(&node.right)
            }
        }
    }

    // ─── Binary form ───────────────────────────────────────────────

    pub fn write(&self, w: &mut Writer) {
        match self {
            Stepper::Leaf(leaf) => {
                write_rows(w, &leaf.rows);
                w.write_bool(false);
            }
            Stepper::Internal(node) => {
                write_rows(w, &node.rows);
                w.write_bool(true);
                for child in [&node.left, &node.right] {
                    match child {
                        Some(c) => {
                            w.write_bool(true);
                            c.write(w);
                        }
                        None => w.write_bool(false),
                    }
                }
                write_rows(w, &node.op);
                write_rows(w, &node.left_remaps);
                write_rows(w, &node.right_remaps);
                write_rows(w, &node.activations);
            }
        }
    }

    pub fn read(r: &mut Reader<'_>, shape: Shape) -> Result<Self> {
        Stepper::read_nested(r, shape, 1)
    }

    fn read_nested(r: &mut Reader<'_>, shape: Shape, depth: usize) -> Result<Self> {
        check_nesting(depth, "stepper")?;
        let rows = read_rows(r, shape.outputs, shape.inputs)?;
        if !r.read_bool()? {
            return Ok(Stepper::Leaf(LeafStepper { shape, rows }));
        }
        let left = read_child(r, shape, depth + 1)?;
        let right = read_child(r, shape, depth + 1)?;
        let mut op_rows = read_rows(r, 4, shape.outputs)?.into_iter();
        let op: [Vector; 4] = std::array::from_fn(|_| op_rows.next().unwrap_or_default());
        Ok(Stepper::Internal(Box::new(InternalStepper {
            shape,
            rows,
            left,
            right,
            op,
            left_remaps: read_rows(r, shape.outputs, shape.outputs)?,
            right_remaps: read_rows(r, shape.outputs, shape.outputs)?,
            activations: read_rows(r, shape.outputs, Activation::COUNT)?,
            left_out: Vector::zeros(shape.outputs),
            right_out: Vector::zeros(shape.outputs),
        })))
    }
}

impl InternalStepper {
    fn new(shape: Shape, rows: Vec<Vector>) -> Self {
        let remaps = || -> Vec<Vector> {
            (0..shape.outputs)
                .map(|o| Vector::one_hot(shape.outputs, o))
                .collect()
        };
        Self {
            shape,
            rows,
            left: None,
            right: None,
            op: std::array::from_fn(|_| Vector::zeros(shape.outputs)),
            left_remaps: remaps(),
            right_remaps: remaps(),
            activations: vec![Activation::Identity.selector(); shape.outputs],
            left_out: Vector::zeros(shape.outputs),
            right_out: Vector::zeros(shape.outputs),
        }
    }

    fn set_blop(&mut self, output: usize, graph: &Graph, blop: &Blop) {
        let shape = self.shape;
        if let Some(l) = blop.left {
            self.left
                .get_or_insert_with(|| Stepper::new(shape))
                .set_output(output, graph, Some(l));
        }
        if let Some(r) = blop.right {
            self.right
                .get_or_insert_with(|| Stepper::new(shape))
                .set_output(output, graph, Some(r));
        }
        for (row, &c) in self.op.iter_mut().zip(&blop.op) {
            row[output] = c;
        }
        if let Some(remap) = &blop.left_coefficients {
            self.left_remaps[output].copy_from(remap);
        }
        if let Some(remap) = &blop.right_coefficients {
            self.right_remaps[output].copy_from(remap);
        }
        self.activations[output] = blop.activation.selector();
    }

    fn step_into(&mut self, input: &[f32], result: &mut [f32]) {
        if let Some(left) = &mut self.left {
            left.step_into(input, &mut self.left_out);
        }
        if let Some(right) = &mut self.right {
            right.step_into(input, &mut self.right_out);
        }
        let has_left = self.left.is_some();
        let has_right = self.right.is_some();
        for (o, out) in result.iter_mut().enumerate() {
            let l = if has_left {
                self.left_remaps[o].dot(&self.left_out)
            } else {
                0.0
            };
            let r = if has_right {
                self.right_remaps[o].dot(&self.right_out)
            } else {
                0.0
            };
            let identity = ((self.op[0][o] * (l * r) + self.op[1][o] * l) + self.op[2][o] * r)
                + self.op[3][o];
            let activated = self.activations[o].dot(&[identity, binary_step(identity)]);
            *out = activated + self.rows[o].dot(input);
        }
    }
}

fn zero_rows(shape: Shape) -> Vec<Vector> {
    vec![Vector::zeros(shape.inputs); shape.outputs]
}

fn write_rows(w: &mut Writer, rows: &[Vector]) {
    for row in rows {
        row.write(w);
    }
}

fn read_rows(r: &mut Reader<'_>, count: usize, len: usize) -> Result<Vec<Vector>> {
    (0..count).map(|_| Vector::read(r, len)).collect()
}

fn read_child(r: &mut Reader<'_>, shape: Shape, depth: usize) -> Result<Option<Stepper>> {
    if r.read_bool()? {
        Ok(Some(Stepper::read_nested(r, shape, depth)?))
    } else {
        Ok(None)
    }
}
