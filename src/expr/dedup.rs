//! Hash-consing and subexpression collapsing.
//!
//! Each round walks the materialized forest depth-first and groups nodes by
//! a BLAKE3 structural digest. The first occurrence of a class is canonical
//! and is descended; repeats are recorded as references and skipped. A class
//! whose occurrences nest positionally (a shallow occurrence's subtree covers
//! the tree position of a deeper one, in any output) can be collapsed: the
//! shallow occurrence is replaced by a chain of pass-through blops that walks
//! down to the deep position and reads the deep occurrence's output
//! component there. The stepper evaluates every output at a position
//! together, so that component is already computed.
//!
//! References are recomputed from the rewritten forest after every
//! collapse. Deep positions read by a chain are pinned so later rounds never
//! replace a subtree strictly containing them.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::vector::Vector;

use super::{Blop, Expr, ExprId, Graph};

/// Occurrences at this depth or deeper are not tracked by path.
pub const MAX_TRACKED_DEPTH: u32 = 64;

/// The cell holding an occurrence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Output(usize),
    Left(ExprId),
    Right(ExprId),
}

/// One occurrence of a class in the forest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reference {
    pub output: usize,
    pub depth: u32,
    /// Bit `k` set when the route from the root went right at depth `k`.
    pub path: u64,
    pub slot: Slot,
}

impl Reference {
    /// Whether the subtree rooted here covers the position of `other`.
    pub fn subtree_contains(&self, other: &Reference) -> bool {
        self.depth < other.depth && self.path == other.path & ((1u64 << self.depth) - 1)
    }

    fn child(&self, parent: ExprId, right: bool) -> Reference {
        Reference {
            output: self.output,
            depth: self.depth + 1,
            path: if right {
                self.path | (1u64 << self.depth)
            } else {
                self.path
            },
            slot: if right {
                Slot::Right(parent)
            } else {
                Slot::Left(parent)
            },
        }
    }
}

/// Outcome of the deduplication pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollapseStats {
    /// Distinct structural classes in the forest before collapsing.
    pub unique_expressions: usize,
    /// Occurrences replaced by fetch chains.
    pub collapsed: usize,
    pub rounds: usize,
}

// ─── Analysis ──────────────────────────────────────────────────────

struct Class {
    canonical: ExprId,
    operation_count: usize,
    references: Vec<Reference>,
}

impl Class {
    /// `(deep, shallow)` occurrence pairs a collapse would rewrite.
    fn pairs(&self, pins: &[Reference]) -> Vec<(Reference, Reference)> {
        if self.operation_count <= 1 {
            return Vec::new();
        }
        let mut refs = self.references.clone();
        refs.sort_by_key(|r| Reverse(r.depth));
        let mut pairs = Vec::new();
        let mut ii = 0;
        while ii < refs.len() {
            let deep = refs[ii];
            let mut jj = ii + 1;
            while jj < refs.len() {
                let shallow = refs[jj];
                if shallow.subtree_contains(&deep) && !is_pinned(&shallow, pins) {
                    pairs.push((deep, refs.remove(jj)));
                } else {
                    jj += 1;
                }
            }
            ii += 1;
        }
        pairs
    }

    fn savings(&self, pins: &[Reference]) -> usize {
        self.pairs(pins).len() * self.operation_count.saturating_sub(1)
    }
}

fn is_pinned(shallow: &Reference, pins: &[Reference]) -> bool {
    pins.iter()
        .any(|pin| pin.output == shallow.output && shallow.subtree_contains(pin))
}

struct Analysis {
    classes: Vec<Class>,
    untracked: usize,
}

impl Analysis {
    fn new(graph: &Graph, roots: &[Option<ExprId>]) -> Self {
        let mut digests = vec![None; graph.len()];
        for root in roots.iter().flatten() {
            digest(graph, *root, &mut digests);
        }
        let mut walker = Walker {
            graph,
            digests: &digests,
            index: HashMap::new(),
            classes: Vec::new(),
            untracked: 0,
        };
        for (output, root) in roots.iter().enumerate() {
            if let Some(id) = root {
                walker.visit(
                    *id,
                    Reference {
                        output,
                        depth: 0,
                        path: 0,
                        slot: Slot::Output(output),
                    },
                );
            }
        }
        Analysis {
            classes: walker.classes,
            untracked: walker.untracked,
        }
    }

    /// Highest-savings class; ties go to the class seen first.
    fn best_candidate(&self, pins: &[Reference]) -> Option<(usize, usize)> {
        let mut heap: BinaryHeap<(usize, Reverse<usize>)> = self
            .classes
            .iter()
            .enumerate()
            .map(|(i, class)| (class.savings(pins), Reverse(i)))
            .filter(|&(savings, _)| savings > 0)
            .collect();
        heap.pop().map(|(savings, Reverse(i))| (i, savings))
    }
}

struct Walker<'a> {
    graph: &'a Graph,
    digests: &'a [Option<(blake3::Hash, usize)>],
    index: HashMap<blake3::Hash, usize>,
    classes: Vec<Class>,
    untracked: usize,
}

impl Walker<'_> {
    fn visit(&mut self, id: ExprId, reference: Reference) {
        if reference.depth >= MAX_TRACKED_DEPTH {
            self.untracked += 1;
            return;
        }
        let Some((digest, operation_count)) = self.digests[id.index()] else {
            return;
        };
        if let Some(&class) = self.index.get(&digest) {
            self.classes[class].references.push(reference);
            return;
        }
        self.index.insert(digest, self.classes.len());
        self.classes.push(Class {
            canonical: id,
            operation_count,
            references: vec![reference],
        });
        if let Expr::Blop(b) = self.graph.get(id) {
            let (left, right) = (b.left, b.right);
            if let Some(l) = left {
                self.visit(l, reference.child(id, false));
            }
            if let Some(r) = right {
                self.visit(r, reference.child(id, true));
            }
        }
    }
}

/// Structural digest and operation count of the subtree at `id`.
///
/// Blops carrying remap vectors read a fixed tree position, so their digest
/// is salted with the node id and never matches another node.
fn digest(
    graph: &Graph,
    id: ExprId,
    memo: &mut [Option<(blake3::Hash, usize)>],
) -> (blake3::Hash, usize) {
    if let Some(d) = memo[id.index()] {
        return d;
    }
    let mut hasher = blake3::Hasher::new();
    let result = match graph.get(id) {
        Expr::Terminal(t) => {
            hasher.update(b"terminal");
            for c in t.coefficients.iter() {
                hasher.update(&c.to_bits().to_le_bytes());
            }
            (hasher.finalize(), 1)
        }
        Expr::Blop(b) => {
            hasher.update(b"blop");
            for c in b.op {
                hasher.update(&c.to_bits().to_le_bytes());
            }
            hasher.update(&[b.activation.index() as u8]);
            if b.has_remap() {
                hasher.update(b"remap");
                hasher.update(&u64::from(id.0).to_le_bytes());
            }
            let mut count = 5;
            for child in [b.left, b.right] {
                match child {
                    Some(c) => {
                        let (child_digest, child_count) = digest(graph, c, memo);
                        hasher.update(&[1]);
                        hasher.update(child_digest.as_bytes());
                        count += child_count;
                    }
                    None => {
                        hasher.update(&[0]);
                    }
                }
            }
            (hasher.finalize(), count)
        }
    };
    memo[id.index()] = Some(result);
    result
}

// ─── Collapsing ────────────────────────────────────────────────────

/// Number of structural classes in the forest.
pub fn unique_expressions(graph: &Graph, roots: &[Option<ExprId>]) -> usize {
    Analysis::new(graph, roots).classes.len()
}

/// Collapse duplicated subexpressions until no candidate saves work.
pub fn collapse(graph: &mut Graph, roots: &mut [Option<ExprId>]) -> CollapseStats {
    let mut stats = CollapseStats::default();
    let mut pins: Vec<Reference> = Vec::new();
    loop {
        let analysis = Analysis::new(graph, roots);
        if stats.rounds == 0 {
            stats.unique_expressions = analysis.classes.len();
            if analysis.untracked > 0 {
                log::warn!(
                    "{} occurrences deeper than {} levels are not considered for collapsing",
                    analysis.untracked,
                    MAX_TRACKED_DEPTH
                );
            }
        }
        let Some((best, savings)) = analysis.best_candidate(&pins) else {
            break;
        };
        let class = &analysis.classes[best];
        let pairs = class.pairs(&pins);
        log::debug!(
            "collapsing subexpression {} (savings {}, operations {}, references {})",
            graph.display(Some(class.canonical)),
            savings,
            class.operation_count,
            class.references.len()
        );
        for (deep, shallow) in &pairs {
            let chain = fetch_chain(
                graph,
                deep.depth - shallow.depth,
                deep.path >> shallow.depth,
                deep.output,
                roots.len(),
            );
            write_slot(graph, roots, shallow.slot, chain);
            pins.push(*deep);
        }
        stats.collapsed += pairs.len();
        stats.rounds += 1;
    }
    stats
}

/// Pass-through blops following `path` for `levels` levels; the last one
/// reads component `output` of the node below it.
fn fetch_chain(
    graph: &mut Graph,
    levels: u32,
    path: u64,
    output: usize,
    output_count: usize,
) -> ExprId {
    let right = path & 1 == 1;
    let blop = if levels <= 1 {
        let remap = Some(Vector::one_hot(output_count, output));
        if right {
            Blop {
                right_coefficients: remap,
                ..Blop::new(None, None, [0.0, 0.0, 1.0, 0.0])
            }
        } else {
            Blop {
                left_coefficients: remap,
                ..Blop::new(None, None, [0.0, 1.0, 0.0, 0.0])
            }
        }
    } else {
        let child = fetch_chain(graph, levels - 1, path >> 1, output, output_count);
        if right {
            Blop::new(None, Some(child), [0.0, 0.0, 1.0, 0.0])
        } else {
            Blop::new(Some(child), None, [0.0, 1.0, 0.0, 0.0])
        }
    };
    graph.push(Expr::Blop(blop))
}

fn write_slot(graph: &mut Graph, roots: &mut [Option<ExprId>], slot: Slot, value: ExprId) {
    match slot {
        Slot::Output(o) => roots[o] = Some(value),
        Slot::Left(parent) => {
            if let Some(b) = graph.blop_mut(parent) {
                b.left = Some(value);
            }
        }
        Slot::Right(parent) => {
            if let Some(b) = graph.blop_mut(parent) {
                b.right = Some(value);
            }
        }
    }
}
