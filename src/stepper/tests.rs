use super::*;
use crate::codec::MAX_NESTING;
use crate::expr::Terminal;

const SHAPE: Shape = Shape {
    inputs: 3,
    outputs: 2,
};

fn terminal(g: &mut Graph, coefficients: &[f32]) -> ExprId {
    g.push(Expr::Terminal(Terminal {
        coefficients: Vector::from_slice(coefficients),
    }))
}

fn run(stepper: &mut Stepper, input: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0; stepper.shape().outputs];
    stepper.step(input, &mut out).unwrap();
    out
}

#[test]
fn leaf_is_a_dot_product_per_output() {
    let mut g = Graph::new();
    let a = terminal(&mut g, &[1.0, 2.0, 0.0]);
    let b = terminal(&mut g, &[0.0, 0.0, -1.0]);
    let mut s = Stepper::from_forest(SHAPE, &g, &[Some(a), Some(b)]);
    assert!(matches!(s, Stepper::Leaf(_)));
    assert_eq!(run(&mut s, &[1.0, 3.0, 4.0]), vec![7.0, -4.0]);
    assert_eq!(s.operation_count(), 2);
}

#[test]
fn internal_node_matches_reference_evaluation() {
    let mut g = Graph::new();
    let x = terminal(&mut g, &[0.0, 1.0, 0.0]);
    let y = terminal(&mut g, &[0.0, 0.0, 1.0]);
    let c = terminal(&mut g, &[0.5, 0.0, 0.0]);
    // x*y + 2x - y + 1
    let mixed = g.push(Expr::Blop(Blop::new(Some(x), Some(y), [1.0, 2.0, -1.0, 1.0])));
    // step(mixed - 0.5)
    let stepped = g.push(Expr::Blop(
        Blop::new(Some(mixed), Some(c), [0.0, 1.0, -1.0, 0.0]).with_activation(Activation::BinaryStep),
    ));
    let roots = [Some(mixed), Some(stepped)];
    let mut s = Stepper::from_forest(SHAPE, &g, &roots);
    for input in [[1.0, 3.0, 4.0], [1.0, -2.0, 0.5], [1.0, 0.0, 1.0]] {
        let expected: Vec<f32> = roots
            .iter()
            .map(|r| g.evaluate(*r, &input).unwrap())
            .collect();
        assert_eq!(run(&mut s, &input), expected);
    }
}

#[test]
fn remap_reads_another_output_at_child_position() {
    let mut g = Graph::new();
    let x = terminal(&mut g, &[0.0, 1.0, 0.0]);
    let y = terminal(&mut g, &[0.0, 0.0, 1.0]);
    let product = g.push(Expr::Blop(Blop::new(Some(x), Some(y), [1.0, 0.0, 0.0, 0.0])));
    let out0 = g.push(Expr::Blop(Blop::new(Some(product), None, [0.0, 3.0, 0.0, 0.0])));
    // output 1 reads output 0's value at the left child position, without
    // folding anything there itself
    let fetch = g.push(Expr::Blop(Blop {
        left_coefficients: Some(Vector::one_hot(2, 0)),
        ..Blop::new(None, None, [0.0, 1.0, 0.0, 1.0])
    }));
    let mut s = Stepper::from_forest(SHAPE, &g, &[Some(out0), Some(fetch)]);
    assert_eq!(run(&mut s, &[1.0, 2.0, 5.0]), vec![30.0, 11.0]);
}

#[test]
fn operation_count_and_depth() {
    let mut g = Graph::new();
    let x = terminal(&mut g, &[0.0, 1.0, 0.0]);
    let neg = g.push(Expr::Blop(Blop::new(Some(x), None, [0.0, -1.0, 0.0, 0.0])));
    let s = Stepper::from_forest(SHAPE, &g, &[Some(neg), None]);
    // (leaf 2 + 2 outputs) + 2*2 + 5
    assert_eq!(s.operation_count(), 13);
    assert_eq!(s.depth(), 1);
    assert_eq!(s.node_count(), 2);
}

#[test]
fn binary_form_round_trips() {
    let mut g = Graph::new();
    let x = terminal(&mut g, &[0.0, 1.0, 0.0]);
    let y = terminal(&mut g, &[0.25, 0.0, 1.0]);
    let sum = g.push(Expr::Blop(Blop::new(Some(x), Some(y), [0.0, 1.0, 1.0, 0.0])));
    let gt = g.push(Expr::Blop(
        Blop::new(Some(sum), None, [0.0, 1.0, 0.0, -2.0]).with_activation(Activation::BinaryStep),
    ));
    let mut original = Stepper::from_forest(SHAPE, &g, &[Some(gt), Some(sum)]);

    let mut w = Writer::new();
    original.write(&mut w);
    let bytes = w.into_bytes();
    let mut r = Reader::new(&bytes);
    let mut restored = Stepper::read(&mut r, SHAPE).unwrap();
    assert!(r.is_at_end());
    assert_eq!(restored, original);
    let input = [1.0, 1.5, 0.75];
    assert_eq!(run(&mut restored, &input), run(&mut original, &input));
}

#[test]
fn truncated_stepper_is_corrupt() {
    let mut w = Writer::new();
    Stepper::new(SHAPE).write(&mut w);
    let bytes = w.into_bytes();
    let mut r = Reader::new(&bytes[..bytes.len() - 1]);
    assert!(matches!(
        Stepper::read(&mut r, SHAPE),
        Err(EslError::CorruptData(_))
    ));
}

#[test]
fn runaway_nesting_is_corrupt() {
    let mut w = Writer::new();
    for _ in 0..MAX_NESTING + 8 {
        for _ in 0..SHAPE.outputs * SHAPE.inputs {
            w.write_f32(0.0);
        }
        w.write_bool(true); // internal
        w.write_bool(true); // has left
    }
    let bytes = w.into_bytes();
    assert!(matches!(
        Stepper::read(&mut Reader::new(&bytes), SHAPE),
        Err(EslError::CorruptData(_))
    ));
}

#[test]
fn wrong_input_length_is_rejected() {
    let mut s = Stepper::new(SHAPE);
    let mut out = vec![0.0; 2];
    assert!(matches!(
        s.step(&[1.0, 2.0], &mut out),
        Err(EslError::DimensionMismatch { expected: 3, actual: 2, .. })
    ));
}
