//! Core traits for the distribution algebra
//!
//! The composition layer (random variables, stochastic junctions) only needs
//! the structural operations below; it never reaches into array bookkeeping.

use crate::{Result, Value};

/// Structural operations over a realised distribution.
///
/// Every operation returns a new value and leaves `self` untouched.
pub trait DistributionAlgebra: Sized {
    /// From `P(A, keys | B)` return `P(A | B)`.
    fn marginalize(&self, keys: &[&str]) -> Result<Self>;

    /// From `P(A, keys | B)` return `P(keys | B)`.
    fn marginal(&self, keys: &[&str]) -> Result<Self>;

    /// From `P(A, keys | B)` return `P(A | B, keys)`.
    fn conditionalise(&self, keys: &[&str]) -> Result<Self>;

    /// Point-slice at the given scalar bindings.
    fn evaluate(&self, bindings: &[(&str, Value)]) -> Result<Self>;
}
