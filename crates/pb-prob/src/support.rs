//! Per-variable support: a single bound value, or an array of points on an axis.

use pb_core::{Axis, Value};

/// Support of one variable within a distribution.
#[derive(Debug, Clone, PartialEq)]
pub enum Support {
    /// Variable fixed at a single value; consumes no probability axis.
    Scalar(Value),
    /// Variable ranging over `values` along probability axis `axis`.
    Array {
        /// Support points, in axis order
        values: Vec<Value>,
        /// Probability array axis
        axis: usize,
    },
}

/// Values of one variable without an axis assignment (paired with a separate dims map).
#[derive(Debug, Clone, PartialEq)]
pub enum VarValues {
    /// A single value
    Scalar(Value),
    /// A list of support points
    Array(Vec<Value>),
}

impl Support {
    /// Scalar support.
    pub fn scalar(value: impl Into<Value>) -> Self {
        Support::Scalar(value.into())
    }

    /// Array support on `axis`.
    pub fn array<V: Into<Value>>(values: impl IntoIterator<Item = V>, axis: usize) -> Self {
        Support::Array { values: values.into_iter().map(Into::into).collect(), axis }
    }

    /// Axis assignment.
    pub fn axis(&self) -> Axis {
        match self {
            Support::Scalar(_) => Axis::Scalar,
            Support::Array { axis, .. } => Axis::Indexed(*axis),
        }
    }

    /// Whether the variable holds a single value.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Support::Scalar(_))
    }

    /// Support points (a single element for scalars).
    pub fn values(&self) -> &[Value] {
        match self {
            Support::Scalar(v) => std::slice::from_ref(v),
            Support::Array { values, .. } => values,
        }
    }

    /// Number of support points.
    pub fn len(&self) -> usize {
        self.values().len()
    }

    /// Whether there are no support points.
    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    /// Index of the first support point exactly equal to `value`.
    pub fn position(&self, value: &Value) -> Option<usize> {
        self.values().iter().position(|v| v == value)
    }

    /// Tolerant comparison of the values, ignoring axis assignment.
    pub fn approx_eq(&self, other: &Support) -> bool {
        self.is_scalar() == other.is_scalar()
            && self.len() == other.len()
            && self.values().iter().zip(other.values()).all(|(a, b)| a.approx_eq(b))
    }

    /// Same values on a different axis; scalars are unchanged.
    pub(crate) fn with_axis(&self, axis: usize) -> Self {
        match self {
            Support::Scalar(v) => Support::Scalar(v.clone()),
            Support::Array { values, .. } => Support::Array { values: values.clone(), axis },
        }
    }

    /// Split into values and axis.
    pub fn into_parts(self) -> (VarValues, Axis) {
        match self {
            Support::Scalar(v) => (VarValues::Scalar(v), Axis::Scalar),
            Support::Array { values, axis } => (VarValues::Array(values), Axis::Indexed(axis)),
        }
    }
}
