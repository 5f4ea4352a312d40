//! Depth-lowering rewrite.
//!
//! Post-order over a materialized tree: zero terminals disappear, the deeper
//! child moves left, and chains of one associative commutable operator are
//! rotated so the tree gets shallower. Rotation regroups operands, so results
//! can differ from the original tree by `f32` rounding.

use super::{Expr, ExprId, Graph};

/// Compact the tree rooted at `root`, returning the new root.
pub fn compact(graph: &mut Graph, root: Option<ExprId>) -> Option<ExprId> {
    let id = root?;
    let (left, right) = match graph.get(id) {
        Expr::Terminal(t) => return if t.coefficients.is_zero() { None } else { Some(id) },
        Expr::Blop(b) => (b.left, b.right),
    };
    let left = compact(graph, left);
    let right = compact(graph, right);
    let mut left_depth = graph.depth(left);
    let mut right_depth = graph.depth(right);

    let Some(node) = graph.blop_mut(id) else {
        return Some(id);
    };
    node.left = left;
    node.right = right;
    if left_depth < right_depth {
        node.swap_sides();
        std::mem::swap(&mut left_depth, &mut right_depth);
    }
    if left_depth - right_depth < 2 || !node.is_associative() {
        return Some(id);
    }
    let op = node.op;
    let (Some(child), right) = (node.left, node.right) else {
        return Some(id);
    };

    let (grand_left, grand_right) = match graph.blop(child) {
        Some(c) if c.is_commutable() && c.op == op => (c.left, c.right),
        _ => return Some(id),
    };
    let new_left_depth = graph.depth(grand_left);
    let new_right_depth = 1 + graph.depth(grand_right).max(right_depth);
    if new_left_depth < new_right_depth {
        return Some(id);
    }

    // f(f(a, b), c) -> f(a, f(b, c)), reusing the child node for f(b, c).
    if let Some(c) = graph.blop_mut(child) {
        c.left = grand_right;
        c.right = right;
    }
    if let Some(node) = graph.blop_mut(id) {
        node.left = grand_left;
        node.right = Some(child);
    }
    Some(id)
}

/// Compact every root in place.
pub fn compact_all(graph: &mut Graph, roots: &mut [Option<ExprId>]) {
    for root in roots.iter_mut() {
        *root = compact(graph, *root);
    }
}
