//! Fixed-length `f32` vectors.
//!
//! Every vector in the system (terminal coefficients, stepper rows, memory
//! positions and contents) has a length fixed by context, so the binary form
//! is the bare element sequence with no length prefix.

use std::ops::{Deref, DerefMut};

use crate::codec::{Reader, Writer};
use crate::error::Result;

/// A dense vector of `f32` elements.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Vector(Vec<f32>);

impl Vector {
    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    pub fn filled(len: usize, value: f32) -> Self {
        Self(vec![value; len])
    }

    /// A vector with a single `1.0` at `index`.
    pub fn one_hot(len: usize, index: usize) -> Self {
        let mut v = Self::zeros(len);
        v.0[index] = 1.0;
        v
    }

    pub fn from_slice(values: &[f32]) -> Self {
        Self(values.to_vec())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// Dot product, accumulated left to right from zero.
    #[inline]
    pub fn dot(&self, other: &[f32]) -> f32 {
        self.0
            .iter()
            .zip(other)
            .fold(0.0, |sum, (a, b)| sum + a * b)
    }

    /// True when every element is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&v| v == 0.0)
    }

    pub fn clear(&mut self) {
        self.0.fill(0.0);
    }

    pub fn copy_from(&mut self, other: &[f32]) {
        self.0.copy_from_slice(other);
    }

    #[inline]
    pub fn add_assign(&mut self, other: &[f32]) {
        for (a, b) in self.0.iter_mut().zip(other) {
            *a += b;
        }
    }

    #[inline]
    pub fn sub_assign(&mut self, other: &[f32]) {
        for (a, b) in self.0.iter_mut().zip(other) {
            *a -= b;
        }
    }

    #[inline]
    pub fn scale_assign(&mut self, s: f32) {
        for a in self.0.iter_mut() {
            *a *= s;
        }
    }

    pub fn scaled(&self, s: f32) -> Self {
        Self(self.0.iter().map(|a| a * s).collect())
    }

    pub fn sum(&self, other: &Vector) -> Self {
        Self(self.0.iter().zip(&other.0).map(|(a, b)| a + b).collect())
    }

    pub fn difference(&self, other: &Vector) -> Self {
        Self(self.0.iter().zip(&other.0).map(|(a, b)| a - b).collect())
    }

    pub fn negated(&self) -> Self {
        Self(self.0.iter().map(|a| -a).collect())
    }

    /// Elementwise quotient `self[i] / other[i]`.
    pub fn pointwise_divide(&self, other: &Vector) -> Self {
        Self(self.0.iter().zip(&other.0).map(|(a, b)| a / b).collect())
    }

    /// Smallest element (`+inf` for an empty vector).
    pub fn minimum(&self) -> f32 {
        self.0.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Index of the first smallest element.
    pub fn minimum_index(&self) -> usize {
        let mut best = 0;
        for (i, &v) in self.0.iter().enumerate() {
            if v < self.0[best] {
                best = i;
            }
        }
        best
    }

    // ── Binary form ──

    pub fn write(&self, w: &mut Writer) {
        for &v in &self.0 {
            w.write_f32(v);
        }
    }

    pub fn read(r: &mut Reader<'_>, len: usize) -> Result<Self> {
        r.ensure(len.saturating_mul(4), "vector")?;
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(r.read_f32()?);
        }
        Ok(Self(values))
    }
}

impl Deref for Vector {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

impl DerefMut for Vector {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.0
    }
}

impl From<Vec<f32>> for Vector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}
