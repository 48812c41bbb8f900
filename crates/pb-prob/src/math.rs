//! Small clamped log/exp primitives used by the representation converter.

/// Natural log with a floor.
///
/// Inputs below `floor` (zero, negatives, NaN) map to `sentinel`, so the result
/// is never `-inf` or NaN.
#[inline]
pub fn ln_floored(x: f64, floor: f64, sentinel: f64) -> f64 {
    if x >= floor { x.ln() } else { sentinel }
}

/// Exponential with a ceiling.
///
/// Inputs above `log_ceiling` (and NaN) map to `sentinel` instead of overflowing to `inf`.
#[inline]
pub fn exp_capped(x: f64, log_ceiling: f64, sentinel: f64) -> f64 {
    if x <= log_ceiling { x.exp() } else { sentinel }
}
