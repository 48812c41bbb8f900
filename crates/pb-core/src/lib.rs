//! # pb-core
//!
//! Shared vocabulary for the probayes distribution algebra: errors, support
//! values, axis assignments and the structural-operation trait.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::DistributionAlgebra;
pub use types::{Axis, Value};
