//! Error types shared by every stage: building, optimizing, stepping, and
//! (de)serialization.

use thiserror::Error;

/// Errors produced by the expression compiler, the stepper, and the memory tree.
#[derive(Debug, Error)]
pub enum EslError {
    /// A vector was supplied with the wrong number of elements.
    #[error("invalid argument: {what} expects {expected} elements, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Any other argument the operation cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Serialized data is truncated or internally inconsistent.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EslError {
    /// Check a vector length, producing `DimensionMismatch` on disagreement.
    pub fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(EslError::DimensionMismatch {
                what,
                expected,
                actual,
            })
        }
    }
}

pub type Result<T> = std::result::Result<T, EslError>;
