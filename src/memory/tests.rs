use super::*;
use crate::codec::MAX_NESTING;

fn fetch(memory: &mut Memory, position: f32, size: f32, increment: f32) -> f32 {
    memory
        .increment_and_fetch(&[position], &[size], &[increment])
        .unwrap()[0]
}

fn scalars(values: &[f32]) -> Vec<Vector> {
    values.iter().map(|&v| Vector::from_slice(&[v])).collect()
}

#[test]
fn point_queries_accumulate_like_a_scalar() {
    let mut m = Memory::new(1, 1);
    assert_eq!(fetch(&mut m, 0.0, 0.0, 0.0), 0.0);
    assert_eq!(fetch(&mut m, 0.0, 0.0, 1.0), 1.0);
    assert_eq!(fetch(&mut m, 0.0, 0.0, 0.0), 1.0);
    assert_eq!(fetch(&mut m, 0.0, 0.0, 1.0), 2.0);
    assert_eq!(fetch(&mut m, 0.0, 0.0, -2.0), 0.0);
    assert_eq!(m.depth(), 1);
}

#[test_log::test]
fn subdivision_bleeds_into_parent_and_sibling() {
    let mut m = Memory::new(1, 1);
    assert_eq!(m.depth(), 1);

    // a half-extent query on the left splits the root
    assert_eq!(fetch(&mut m, -0.25, -1.0, 1.0), 1.0);
    assert_eq!(m.depth(), 2);
    assert_eq!(fetch(&mut m, -0.25, -1.0, 0.0), 1.0);

    assert_eq!(fetch(&mut m, 0.0, 0.0, 0.0), 0.5);
    assert_eq!(fetch(&mut m, 0.25, -1.0, 0.0), 0.25);

    // raising the parent raises both halves
    assert_eq!(fetch(&mut m, 0.0, 0.0, 0.5), 1.0);
    assert_eq!(fetch(&mut m, -0.25, -1.0, 0.0), 1.25);
    assert_eq!(fetch(&mut m, 0.25, -1.0, 0.0), 0.5);

    // a quarter-extent query outside the root doubles it
    assert_eq!(fetch(&mut m, -1.0 + 0.125, -2.0, 1.0), 1.21875);
    assert_eq!(m.depth(), 4);
    assert_eq!(m.root_size(), &[2.0]);

    assert_eq!(fetch(&mut m, -1.0 + 0.125, -2.0, -1.21875), 0.0);
    assert_eq!(fetch(&mut m, -1.0 + 0.125, -2.0, 0.0), 0.0);
}

#[test]
fn single_value_set_covers_the_root() {
    let mut m = Memory::new(1, 1);
    m.set(&[0.0], &[0.0], 0, &scalars(&[5.0])).unwrap();
    assert_eq!(fetch(&mut m, 0.0, 0.0, 0.0), 5.0);
}

#[test]
fn set_spreads_values_along_the_axis() {
    let mut m = Memory::new(1, 1);
    m.set(&[0.0], &[0.0], 0, &scalars(&[2.0, 6.0])).unwrap();
    assert_eq!(m.depth(), 2);
    assert!((fetch(&mut m, -0.25, -1.0, 0.0) - 2.0).abs() < 1e-5);
    assert!((fetch(&mut m, 0.25, -1.0, 0.0) - 6.0).abs() < 1e-5);
}

#[test_log::test]
fn expansion_follows_the_overflowing_axis() {
    let mut m = Memory::new(2, 1);
    let first = m.increment_and_fetch(&[3.0, 0.0], &[0.0, 0.0], &[1.0]).unwrap();
    assert_eq!(m.root_size(), &[8.0, 1.0]);
    assert!(first[0] > 0.0);
    let again = m.increment_and_fetch(&[3.0, 0.0], &[0.0, 0.0], &[0.0]).unwrap();
    assert_eq!(again, first);
}

#[test]
fn binary_form_round_trips() {
    let mut m = Memory::new(1, 1);
    fetch(&mut m, -0.25, -1.0, 1.0);
    fetch(&mut m, -1.0 + 0.125, -2.0, 1.0);
    let bytes = m.to_bytes().unwrap();
    let mut restored = Memory::from_bytes(&bytes).unwrap();
    assert_eq!(restored, m);
    assert_eq!(
        fetch(&mut restored, 0.3, -1.0, 0.5),
        fetch(&mut m, 0.3, -1.0, 0.5)
    );
}

#[test]
fn empty_bytes_give_a_fresh_memory() {
    let m = Memory::from_bytes(&[]).unwrap();
    assert_eq!(m, Memory::new(1, 1));
    assert_eq!(m.root_size(), &[1.0]);
}

#[test]
fn corrupt_memory_bytes_are_rejected() {
    let mut w = Writer::new();
    w.write_i32(1);
    w.write_i32(1);
    w.write_f32(1.0);
    w.write_f32(0.0);
    w.write_i32(5); // split axis 4 of a 1-D memory
    assert!(matches!(
        Memory::from_bytes(&w.into_bytes()),
        Err(EslError::CorruptData(_))
    ));

    let mut w = Writer::new();
    w.write_i32(-1);
    assert!(matches!(
        Memory::from_bytes(&w.into_bytes()),
        Err(EslError::CorruptData(_))
    ));

    let bytes = Memory::new(2, 3).to_bytes().unwrap();
    assert!(matches!(
        Memory::from_bytes(&bytes[..bytes.len() - 2]),
        Err(EslError::CorruptData(_))
    ));
}

#[test]
fn endless_splits_are_corrupt() {
    // halving a unit extent eventually leaves the normal range
    let mut w = Writer::new();
    w.write_i32(1);
    w.write_i32(1);
    w.write_f32(1.0);
    for _ in 0..200_000 {
        w.write_f32(0.0);
        w.write_i32(1);
    }
    assert!(matches!(
        Memory::from_bytes(&w.into_bytes()),
        Err(EslError::CorruptData(_))
    ));

    // cycling through many axes stays normal but runs out of nesting
    let axes = 8;
    let mut w = Writer::new();
    w.write_len(axes).unwrap();
    w.write_i32(1);
    for _ in 0..axes {
        w.write_f32(1.0);
    }
    for level in 0..MAX_NESTING + 8 {
        w.write_f32(0.0);
        w.write_len(level % axes + 1).unwrap();
    }
    assert!(matches!(
        Memory::from_bytes(&w.into_bytes()),
        Err(EslError::CorruptData(_))
    ));
}

#[test]
fn root_wide_set_overwrites_a_subdivided_tree() {
    let mut m = Memory::new(1, 1);
    assert_eq!(fetch(&mut m, -0.25, -1.0, 1.0), 1.0);
    assert_eq!(m.depth(), 2);

    m.set(&[0.0], &[0.0], 0, &scalars(&[3.0])).unwrap();
    assert_eq!(m.root().value(), &[3.0]);
    match m.root().kind() {
        NodeKind::Internal { left, right, .. } => {
            assert_eq!(left.value(), &[0.0]);
            assert_eq!(right.value(), &[0.0]);
        }
        NodeKind::Leaf => panic!("children were dropped"),
    }

    assert_eq!(fetch(&mut m, 0.0, 0.0, 0.0), 3.0);
    assert_eq!(fetch(&mut m, -0.25, -1.0, 0.0), 1.5);
    assert_eq!(fetch(&mut m, 0.25, -1.0, 0.0), 1.5);
}

#[test]
fn invalid_queries_are_rejected() {
    let mut m = Memory::new(1, 1);
    assert!(matches!(
        m.increment_and_fetch(&[f32::NAN], &[0.0], &[0.0]),
        Err(EslError::InvalidArgument(_))
    ));
    assert!(matches!(
        m.increment_and_fetch(&[0.0], &[-500.0], &[0.0]),
        Err(EslError::InvalidArgument(_))
    ));
    assert!(matches!(
        m.increment_and_fetch(&[0.0, 0.0], &[0.0], &[0.0]),
        Err(EslError::DimensionMismatch { .. })
    ));
    assert!(matches!(
        m.set(&[0.0], &[0.0], 1, &scalars(&[1.0])),
        Err(EslError::InvalidArgument(_))
    ));
    assert!(matches!(
        m.set(&[0.0], &[0.0], 0, &[]),
        Err(EslError::InvalidArgument(_))
    ));
    // nothing was applied
    assert_eq!(m, Memory::new(1, 1));
}
