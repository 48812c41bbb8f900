//! Error types for the distribution algebra

use thiserror::Error;

/// Distribution algebra error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed distribution name
    #[error("Format error: {0}")]
    Format(String),

    /// Variable key outside a distribution's key-set
    #[error("Key error: {0}")]
    Key(String),

    /// Probability rank/shape does not match the variable axes
    #[error("Shape error: {0}")]
    Shape(String),

    /// Operation not permitted for the given keys or representation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Product/sum preconditions violated
    #[error("Incompatible distributions: {0}")]
    IncompatibleDistributions(String),

    /// Marginal variable shared between product operands
    #[error("Ambiguous marginal names: {0}")]
    AmbiguousMarginalNames(String),

    /// Shared variable carries an axis in one operand but not in another
    #[error("Shared axis unsupported: {0}")]
    SharedAxisUnsupported(String),

    /// Concatenation could not locate exactly one differing variable
    #[error("No unique concatenation axis: {0}")]
    NoUniqueAxis(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
