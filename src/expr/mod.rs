//! Expression graph: the two node shapes every operator lowers to.
//!
//! A `Terminal` is an affine function of the combined input vector. A `Blop`
//! (binary linear operation) combines up to two child results `L`, `R` as
//! `activation(lr·L·R + l·L + r·R + c)`. Arithmetic, boolean, comparison and
//! lookup operators are all built from these two shapes by `Builder`.
//!
//! Nodes live in an arena (`Graph`) and are addressed by `ExprId`. During
//! building the graph is a DAG (operators reuse their operands); before
//! optimization it is materialized into a forest of trees so every tree
//! position owns a distinct node.

pub mod builder;
pub mod compact;
pub mod dedup;
#[cfg(test)]
mod tests;

use std::fmt;

use crate::error::{EslError, Result};
use crate::vector::Vector;

pub use builder::{Builder, Operand};

// ─── Identifiers ───────────────────────────────────────────────────

/// Index of a node in a `Graph`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub(crate) u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

// ─── Activation ────────────────────────────────────────────────────

/// Nonlinearity applied to a blop's raw bilinear value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Activation {
    Identity,
    /// `max(sign(x), 0)`: 1 for positive input, 0 otherwise.
    BinaryStep,
}

impl Activation {
    /// Number of activation kinds; the length of stepper selector vectors.
    pub const COUNT: usize = 2;

    pub fn index(self) -> usize {
        match self {
            Activation::Identity => 0,
            Activation::BinaryStep => 1,
        }
    }

    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Identity => x,
            Activation::BinaryStep => binary_step(x),
        }
    }

    /// One-hot selector row used by the stepper.
    pub fn selector(self) -> Vector {
        Vector::one_hot(Self::COUNT, self.index())
    }
}

/// `max(sign(x), 0)`.
#[inline]
pub fn binary_step(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

// ─── Node shapes ───────────────────────────────────────────────────

/// Affine function of the combined input vector; index 0 is the bias term.
#[derive(Clone, Debug, PartialEq)]
pub struct Terminal {
    pub coefficients: Vector,
}

/// Binary linear operation.
#[derive(Clone, Debug, PartialEq)]
pub struct Blop {
    pub left: Option<ExprId>,
    pub right: Option<ExprId>,
    /// `(lr, l, r, c)`.
    pub op: [f32; 4],
    /// Remap selecting a component of the left child's output vector.
    /// Only fetch chains created by collapsing carry one.
    pub left_coefficients: Option<Vector>,
    pub right_coefficients: Option<Vector>,
    pub activation: Activation,
}

impl Blop {
    pub fn new(left: Option<ExprId>, right: Option<ExprId>, op: [f32; 4]) -> Self {
        Self {
            left,
            right,
            op,
            left_coefficients: None,
            right_coefficients: None,
            activation: Activation::Identity,
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Symmetric operator: identity activation, `l == r`, `c == 0`, no remaps.
    pub fn is_commutable(&self) -> bool {
        self.activation == Activation::Identity
            && self.op[1] == self.op[2]
            && self.op[3] == 0.0
            && !self.has_remap()
    }

    /// Commutable and associative: `f(f(a,b),c) == f(a,f(b,c))` holds for
    /// `lr·x·y + k·(x+y)` exactly when `k` is 0 or 1.
    pub fn is_associative(&self) -> bool {
        self.is_commutable() && (self.op[1] == 0.0 || self.op[1] == 1.0)
    }

    pub fn has_remap(&self) -> bool {
        self.left_coefficients.is_some() || self.right_coefficients.is_some()
    }

    /// Exchange the two sides without changing the result.
    pub fn swap_sides(&mut self) {
        std::mem::swap(&mut self.left, &mut self.right);
        std::mem::swap(&mut self.left_coefficients, &mut self.right_coefficients);
        self.op.swap(1, 2);
    }

    /// Raw bilinear value before activation.
    #[inline]
    pub fn raw(&self, l: f32, r: f32) -> f32 {
        self.op[0] * (l * r) + self.op[1] * l + self.op[2] * r + self.op[3]
    }
}

/// A node in the expression graph.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Terminal(Terminal),
    Blop(Blop),
}

// ─── Graph ─────────────────────────────────────────────────────────

/// Arena of expression nodes.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Vec<Expr>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(expr);
        id
    }

    pub fn get(&self, id: ExprId) -> &Expr {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.nodes[id.index()]
    }

    pub fn blop(&self, id: ExprId) -> Option<&Blop> {
        match self.get(id) {
            Expr::Blop(b) => Some(b),
            Expr::Terminal(_) => None,
        }
    }

    pub fn blop_mut(&mut self, id: ExprId) -> Option<&mut Blop> {
        match self.get_mut(id) {
            Expr::Blop(b) => Some(b),
            Expr::Terminal(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Longest path to a terminal (terminal = 0, absent = 0).
    ///
    /// Computed from the current graph on every call: compaction mutates
    /// children after depths have been read, so no depth is cached.
    pub fn depth(&self, id: Option<ExprId>) -> u32 {
        match id.map(|id| self.get(id)) {
            None | Some(Expr::Terminal(_)) => 0,
            Some(Expr::Blop(b)) => 1 + self.depth(b.left).max(self.depth(b.right)),
        }
    }

    /// Number of nodes reachable from `id` counting every occurrence.
    pub fn tree_size(&self, id: Option<ExprId>) -> usize {
        match id.map(|id| self.get(id)) {
            None => 0,
            Some(Expr::Terminal(_)) => 1,
            Some(Expr::Blop(b)) => 1 + self.tree_size(b.left) + self.tree_size(b.right),
        }
    }

    /// Evaluate an expression directly against a combined input vector.
    ///
    /// Fetch chains read other outputs at fixed tree positions and have no
    /// meaning outside a stepper, so nodes with remap vectors are rejected.
    pub fn evaluate(&self, id: Option<ExprId>, input: &[f32]) -> Result<f32> {
        let Some(id) = id else { return Ok(0.0) };
        match self.get(id) {
            Expr::Terminal(t) => {
                EslError::check_len("terminal input", t.coefficients.len(), input.len())?;
                Ok(t.coefficients.dot(input))
            }
            Expr::Blop(b) => {
                if b.has_remap() {
                    return Err(EslError::InvalidArgument(format!(
                        "{} reads another output and cannot be evaluated in isolation",
                        id
                    )));
                }
                let l = self.evaluate(b.left, input)?;
                let r = self.evaluate(b.right, input)?;
                Ok(b.activation.apply(b.raw(l, r)))
            }
        }
    }

    /// Copy the expressions reachable from `roots` into a fresh graph in which
    /// every occurrence is a distinct node.
    pub fn materialize(&self, roots: &[Option<ExprId>]) -> (Graph, Vec<Option<ExprId>>) {
        let mut out = Graph::new();
        let roots = roots
            .iter()
            .map(|root| root.map(|id| self.copy_into(id, &mut out)))
            .collect();
        (out, roots)
    }

    fn copy_into(&self, id: ExprId, out: &mut Graph) -> ExprId {
        match self.get(id) {
            Expr::Terminal(t) => out.push(Expr::Terminal(t.clone())),
            Expr::Blop(b) => {
                let mut copy = b.clone();
                copy.left = b.left.map(|l| self.copy_into(l, out));
                copy.right = b.right.map(|r| self.copy_into(r, out));
                out.push(Expr::Blop(copy))
            }
        }
    }

    pub fn display(&self, id: Option<ExprId>) -> ExprDisplay<'_> {
        ExprDisplay { graph: self, id }
    }
}

// ─── Display ───────────────────────────────────────────────────────

/// Renders an expression tree: terminals as affine forms over `x<i>`,
/// blops as `blop(lr, l, r, c; L, R)`, absent children as `_`, remaps as
/// `#<output>`, and binary-step activations as `step(..)`.
pub struct ExprDisplay<'a> {
    graph: &'a Graph,
    id: Option<ExprId>,
}

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(id) = self.id else { return write!(f, "_") };
        match self.graph.get(id) {
            Expr::Terminal(t) => write_affine(f, &t.coefficients),
            Expr::Blop(b) => {
                if b.activation == Activation::BinaryStep {
                    write!(f, "step(")?;
                }
                write!(
                    f,
                    "blop({}, {}, {}, {}; {}",
                    b.op[0],
                    b.op[1],
                    b.op[2],
                    b.op[3],
                    self.graph.display(b.left)
                )?;
                write_remap(f, &b.left_coefficients)?;
                write!(f, ", {}", self.graph.display(b.right))?;
                write_remap(f, &b.right_coefficients)?;
                write!(f, ")")?;
                if b.activation == Activation::BinaryStep {
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}

fn write_affine(f: &mut fmt::Formatter<'_>, coefficients: &Vector) -> fmt::Result {
    let mut first = true;
    for (i, &c) in coefficients.iter().enumerate().skip(1) {
        if c == 0.0 {
            continue;
        }
        if !first {
            write!(f, " + ")?;
        }
        first = false;
        if c == 1.0 {
            write!(f, "x{}", i)?;
        } else {
            write!(f, "{}*x{}", c, i)?;
        }
    }
    let bias = coefficients.first().copied().unwrap_or(0.0);
    if first {
        write!(f, "{}", bias)
    } else if bias != 0.0 {
        write!(f, " + {}", bias)
    } else {
        Ok(())
    }
}

fn write_remap(f: &mut fmt::Formatter<'_>, remap: &Option<Vector>) -> fmt::Result {
    match remap {
        None => Ok(()),
        Some(v) => {
            let hot: Vec<_> = v.iter().enumerate().filter(|(_, &c)| c != 0.0).collect();
            match hot.as_slice() {
                [(i, &c)] if c == 1.0 => write!(f, "#{}", i),
                _ => write!(f, "#{:?}", v.as_slice()),
            }
        }
    }
}
