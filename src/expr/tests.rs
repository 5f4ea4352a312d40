use super::*;
use crate::model::ModelConfig;

fn builder(simplify: bool) -> Builder {
    Builder::new(
        ModelConfig::new(2, 1)
            .with_memory(0, 0)
            .with_simplify(simplify),
    )
}

fn eval(b: &Builder, e: ExprId, x: f32, y: f32) -> f32 {
    b.graph().evaluate(Some(e), &[1.0, x, y]).unwrap()
}

/// Check `op(x, y)` against `expected` for every sample, with and without
/// terminal folding.
fn check_binary(
    op: impl Fn(&mut Builder, ExprId, ExprId) -> ExprId,
    samples: &[(f32, f32, f32)],
) {
    for simplify in [true, false] {
        let mut b = builder(simplify);
        let x = b.input(0).unwrap();
        let y = b.input(1).unwrap();
        let e = op(&mut b, x, y);
        for &(xv, yv, expected) in samples {
            assert_eq!(
                eval(&b, e, xv, yv),
                expected,
                "x={} y={} simplify={}",
                xv,
                yv,
                simplify
            );
        }
    }
}

// ─── Rendering ─────────────────────────────────────────────────────

#[test]
fn renders_blops_and_affine_terminals() {
    let mut b = builder(false);
    let x = b.input(0).unwrap();
    let y = b.input(1).unwrap();
    let sum = b.add(x, y);
    insta::assert_snapshot!(b.graph().display(Some(sum)).to_string(), @"blop(0, 1, 1, 0; x1, x2)");

    let mut b = builder(true);
    let x = b.input(0).unwrap();
    let gt = b.greater_than(x, 2.0);
    insta::assert_snapshot!(b.graph().display(Some(gt)).to_string(), @"step(blop(0, 1, 0, 0; x1 + -2, _))");
}

// ─── Affine operators ──────────────────────────────────────────────

#[test]
fn affine_operators_fold_terminals_when_simplifying() {
    let mut b = builder(true);
    let x = b.input(0).unwrap();
    let y = b.input(1).unwrap();
    let d = b.subtract(x, y);
    let n = b.negate(d);
    let s = b.scale(n, 2.0);
    let i = b.identity(s);
    let a = b.add(i, 1.0);
    let not = b.not(a);
    assert!(matches!(b.graph().get(not), Expr::Terminal(_)));
    // 1 - (2(y - x) + 1) = 2(x - y)
    assert_eq!(eval(&b, not, 3.0, 1.0), 4.0);
}

#[test]
fn affine_operators_build_blops_without_simplifying() {
    let mut b = builder(false);
    let x = b.input(0).unwrap();
    let y = b.input(1).unwrap();
    let d = b.subtract(x, y);
    let n = b.negate(d);
    let s = b.scale(n, 2.0);
    let a = b.add(s, 1.0);
    let not = b.not(a);
    assert!(matches!(b.graph().get(not), Expr::Blop(_)));
    assert_eq!(eval(&b, not, 3.0, 1.0), 4.0);
}

// ─── Boolean operators ─────────────────────────────────────────────

const BOOL_PAIRS: [(f32, f32); 4] = [(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)];

fn truth_table(f: impl Fn(bool, bool) -> bool) -> Vec<(f32, f32, f32)> {
    BOOL_PAIRS
        .iter()
        .map(|&(x, y)| (x, y, if f(x > 0.5, y > 0.5) { 1.0 } else { 0.0 }))
        .collect()
}

#[test]
fn boolean_operators_follow_truth_tables() {
    check_binary(|b, x, y| b.and(x, y), &truth_table(|x, y| x && y));
    check_binary(|b, x, y| b.or(x, y), &truth_table(|x, y| x || y));
    check_binary(|b, x, y| b.nor(x, y), &truth_table(|x, y| !(x || y)));
    check_binary(|b, x, y| b.nand(x, y), &truth_table(|x, y| !(x && y)));
    check_binary(|b, x, y| b.not_and(x, y), &truth_table(|x, y| !x && y));
    check_binary(|b, x, y| b.xor(x, y), &truth_table(|x, y| x != y));
    check_binary(|b, x, _| b.not(x), &truth_table(|x, _| !x));
    check_binary(|b, x, _| b.and(x, true), &truth_table(|x, _| x));
}

// ─── Comparisons ───────────────────────────────────────────────────

const ORDER_PAIRS: [(f32, f32); 3] = [(1.0, 2.0), (2.0, 2.0), (3.0, -2.0)];

fn compared(f: impl Fn(f32, f32) -> bool) -> Vec<(f32, f32, f32)> {
    ORDER_PAIRS
        .iter()
        .map(|&(x, y)| (x, y, if f(x, y) { 1.0 } else { 0.0 }))
        .collect()
}

#[test]
fn comparisons_yield_zero_or_one() {
    check_binary(|b, x, y| b.greater_than(x, y), &compared(|x, y| x > y));
    check_binary(|b, x, y| b.less_than(x, y), &compared(|x, y| x < y));
    check_binary(|b, x, y| b.less_equal(x, y), &compared(|x, y| x <= y));
    check_binary(|b, x, y| b.greater_equal(x, y), &compared(|x, y| x >= y));
    check_binary(|b, x, y| b.equals(x, y), &compared(|x, y| x == y));
    check_binary(|b, x, y| b.not_equals(x, y), &compared(|x, y| x != y));
}

#[test]
fn approximately_uses_tolerance() {
    check_binary(
        |b, x, y| b.approximately(x, y, None),
        &[(1.0, 1.0, 1.0), (1.0, 1.1, 0.0)],
    );
    check_binary(
        |b, x, y| b.approximately(x, y, Some(0.5)),
        &[(1.0, 1.25, 1.0), (1.0, 2.0, 0.0), (-1.0, -1.25, 1.0)],
    );
}

#[test]
fn binary_step_over_a_blop_reuses_its_shape() {
    let mut b = builder(false);
    let x = b.input(0).unwrap();
    let y = b.input(1).unwrap();
    let sum = b.add(x, y);
    let stepped = b.binary_step(sum);
    let blop = b.graph().blop(stepped).unwrap();
    assert_eq!(blop.activation, Activation::BinaryStep);
    assert_eq!(blop.left, Some(x));
    assert_eq!(b.graph().depth(Some(stepped)), 1);
    assert_eq!(eval(&b, stepped, 0.5, -0.5), 0.0);
    assert_eq!(eval(&b, stepped, 0.5, -0.25), 1.0);
}

// ─── Selection ─────────────────────────────────────────────────────

#[test]
fn selection_operators() {
    check_binary(
        |b, x, y| b.min(x, y),
        &[(1.0, 2.0, 1.0), (2.0, 2.0, 2.0), (3.0, -2.0, -2.0)],
    );
    check_binary(
        |b, x, y| b.max(x, y),
        &[(1.0, 2.0, 2.0), (2.0, 2.0, 2.0), (3.0, -2.0, 3.0)],
    );
    check_binary(|b, x, _| b.abs(x), &[(-3.0, 0.0, 3.0), (2.5, 0.0, 2.5), (0.0, 0.0, 0.0)]);
    check_binary(
        |b, x, y| b.clamp(x, y, 4.0),
        &[(5.0, 1.0, 4.0), (-1.0, 1.0, 1.0), (2.0, 1.0, 2.0)],
    );
    check_binary(|b, x, _| b.clamp01(x), &[(-3.0, 0.0, 0.0), (0.5, 0.0, 0.5), (7.0, 0.0, 1.0)]);
    check_binary(
        |b, x, y| b.select(x, y, 9.0),
        &[(1.0, 4.0, 4.0), (0.0, 4.0, 9.0)],
    );
}

#[test]
fn lerp_clamps_its_parameter() {
    check_binary(
        |b, x, _| b.lerp(0.0, 10.0, x),
        &[(0.25, 0.0, 2.5), (2.0, 0.0, 10.0), (-1.0, 0.0, 0.0)],
    );
    check_binary(
        |b, x, _| b.lerp_unclamped(0.0, 10.0, x),
        &[(0.25, 0.0, 2.5), (2.0, 0.0, 20.0), (-1.0, 0.0, -10.0)],
    );
}

// ─── Lookup ────────────────────────────────────────────────────────

#[test]
fn index_picks_the_nearest_entry() {
    for simplify in [true, false] {
        let mut b = builder(simplify);
        let i = b.input(0).unwrap();
        let entries: Vec<ExprId> = [10.0, 20.0, 30.0, 40.0]
            .iter()
            .map(|&v| b.constant(v))
            .collect();
        let e = b.index(&entries, 0.0, 3.0, i).unwrap();
        for (iv, want) in [
            (-1.0, 10.0),
            (0.0, 10.0),
            (1.4, 20.0),
            (1.6, 30.0),
            (3.0, 40.0),
            (5.0, 40.0),
        ] {
            assert_eq!(eval(&b, e, iv, 0.0), want, "index {}", iv);
        }
    }
}

#[test]
fn index_over_nothing_is_an_error() {
    let mut b = builder(true);
    assert!(matches!(
        b.index(&[], 0.0, 1.0, 0.0),
        Err(EslError::InvalidArgument(_))
    ));
}

#[test]
fn is_index_partitions_the_line() {
    let mut b = builder(true);
    let e = b.input(0).unwrap();
    let slots: Vec<ExprId> = (0..4).map(|i| b.is_index(e, i, 4)).collect();
    for (value, hot) in [(-7.0, 0), (0.5, 0), (1.0, 1), (1.5, 1), (2.2, 2), (2.6, 3), (9.0, 3)] {
        for (i, slot) in slots.iter().enumerate() {
            let want = if i == hot { 1.0 } else { 0.0 };
            assert_eq!(eval(&b, *slot, value, 0.0), want, "value {} slot {}", value, i);
        }
    }
    let single = b.is_index(e, 0, 1);
    assert_eq!(eval(&b, single, 123.0, 0.0), 1.0);
}

#[test]
fn state_lookup_reads_the_indexed_state() {
    let mut b = Builder::new(
        ModelConfig::new(1, 1)
            .with_states(vec![0.0; 3])
            .with_memory(0, 0),
    );
    let i = b.input(0).unwrap();
    let at = b.state_at(i, 1, 2).unwrap();
    let all = b.state_indexed(i).unwrap();
    let combined = |index: f32| [1.0, index, 5.0, 6.0, 7.0];
    let g = b.graph();
    assert_eq!(g.evaluate(Some(all), &combined(0.0)).unwrap(), 5.0);
    assert_eq!(g.evaluate(Some(all), &combined(1.0)).unwrap(), 6.0);
    assert_eq!(g.evaluate(Some(all), &combined(2.0)).unwrap(), 7.0);
    assert_eq!(g.evaluate(Some(at), &combined(0.0)).unwrap(), 6.0);
    assert_eq!(g.evaluate(Some(at), &combined(1.0)).unwrap(), 7.0);
}

// ─── Terminals and slots ───────────────────────────────────────────

#[test]
fn terminal_indexes_are_checked() {
    let mut b = builder(true);
    assert!(b.input(2).is_err());
    assert!(b.state(0).is_err());
    assert!(b.fetch(0).is_err());
    assert!(b.random(0.0, 1.0, 0).is_err());
    assert!(b.value(3, 1.0, 0.0).is_err());
    assert!(b.set_position_output(0, 1.0).is_err());
    assert!(b.set_output_at(0, 1.0).is_ok());
    assert!(b.set_output_at(1, 1.0).is_err());
}

#[test]
fn materialize_gives_every_occurrence_its_own_node() {
    let mut b = builder(false);
    let x = b.input(0).unwrap();
    let y = b.input(1).unwrap();
    let s = b.add(x, y);
    let m = b.multiply(s, s);
    assert_eq!(b.graph().len(), 4);
    let (tree, roots) = b.graph().materialize(&[Some(m), None]);
    assert_eq!(tree.len(), 7);
    assert_eq!(tree.tree_size(roots[0]), 7);
    assert_eq!(roots[1], None);
    assert_eq!(
        tree.evaluate(roots[0], &[1.0, 2.0, 3.0]).unwrap(),
        eval(&b, m, 2.0, 3.0)
    );
}

#[test]
fn fetch_chains_cannot_be_evaluated_in_isolation() {
    let mut g = Graph::new();
    let chain = g.push(Expr::Blop(Blop {
        left_coefficients: Some(Vector::one_hot(2, 1)),
        ..Blop::new(None, None, [0.0, 1.0, 0.0, 0.0])
    }));
    assert!(matches!(
        g.evaluate(Some(chain), &[1.0]),
        Err(EslError::InvalidArgument(_))
    ));
    assert_eq!(g.display(Some(chain)).to_string(), "blop(0, 1, 0, 0; _#1, _)");
}
