//! Step-expression compiler with sparse adaptive memory.
//!
//! Output formulas over inputs, per-step state, random taps, and fetched
//! memory contents are built with an `expr::Builder`, optimized (compaction,
//! hash-consed subexpression collapsing), and compiled into a `Stepper` that
//! evaluates every output in one allocation-free pass. A `Model` ties the
//! stepper to its state vector and to a `Memory` tree that subdivides and
//! expands on demand.
//!
//! ```no_run
//! use esl::model::{Model, ModelConfig};
//!
//! let mut model = Model::build(ModelConfig::new(1, 1), |b| {
//!     let x = b.input(0)?;
//!     let y = b.add(x, 1.0);
//!     b.set_output(0, y)
//! })?;
//! assert_eq!(model.step(&[1.0])?[0], 2.0);
//! # Ok::<(), esl::EslError>(())
//! ```

pub mod codec;
pub mod demos;
pub mod error;
pub mod expr;
pub mod memory;
pub mod model;
pub mod persist;
pub mod sim;
pub mod stepper;
pub mod vector;

pub use error::{EslError, Result};
pub use expr::{Builder, ExprId, Operand};
pub use memory::Memory;
pub use model::{BuildReport, Model, ModelConfig, OptimizeOptions};
pub use stepper::Stepper;
pub use vector::Vector;
