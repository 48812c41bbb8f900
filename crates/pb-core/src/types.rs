//! Common data types for the distribution algebra

use serde::{Deserialize, Serialize};
use std::fmt;

/// Relative tolerance used by [`Value::approx_eq`].
pub const VALUE_RTOL: f64 = 1e-5;
/// Absolute tolerance used by [`Value::approx_eq`].
pub const VALUE_ATOL: f64 = 1e-8;

/// A single support point of a random variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Nominal boolean outcome (coins, indicators)
    Bool(bool),
    /// Integer-valued outcome
    Int(i64),
    /// Real-valued outcome
    Float(f64),
    /// Categorical outcome
    Text(String),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            Value::Bool(_) | Value::Text(_) => None,
        }
    }

    /// Tolerant comparison: numbers within `atol + rtol*|other|`, everything else exact.
    pub fn approx_eq(&self, other: &Value) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() <= VALUE_ATOL + VALUE_RTOL * b.abs(),
            _ => self == other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Array axis occupied by a variable.
///
/// Scalar variables (point-evaluated or fixed) consume no axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// No axis: the variable holds a single value
    Scalar,
    /// Index into the probability array's dimensions
    Indexed(usize),
}

impl Axis {
    /// Axis index, `None` for scalars.
    pub fn index(self) -> Option<usize> {
        match self {
            Axis::Scalar => None,
            Axis::Indexed(i) => Some(i),
        }
    }

    /// Whether this variable consumes no axis.
    pub fn is_scalar(self) -> bool {
        matches!(self, Axis::Scalar)
    }
}

impl From<Option<usize>> for Axis {
    fn from(dim: Option<usize>) -> Self {
        dim.map_or(Axis::Scalar, Axis::Indexed)
    }
}
