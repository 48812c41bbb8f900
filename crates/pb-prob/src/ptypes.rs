//! Probability representation tags (`PType`) and conversions between them.
//!
//! A probability array is stored either as linear coefficients scaled by a
//! positive multiplier, or as log values shifted by an offset. The tag records
//! which, so `true = stored * c` (linear) or `true = sign * exp(stored + offset)` (log).
//!
//! Limits follow single-precision range so that arrays survive a round trip
//! through `f32` consumers without producing `inf`/NaN.

use std::str::FromStr;

use ndarray::ArrayD;
use pb_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::math::{exp_capped, ln_floored};

/// Smallest positive value treated as non-zero (`f32::MIN_POSITIVE`).
pub const NEARLY_POSITIVE_ZERO: f64 = 1.175494e-38;
/// Stand-in for `-inf` in log space.
pub const NEARLY_NEGATIVE_INF: f64 = -3.4028236e38;
/// Stand-in for `+inf` in linear space.
pub const NEARLY_POSITIVE_INF: f64 = 3.4028236e38;

/// Floating-point safety limits for log/exp conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericLimits {
    /// Linear values below this are logged to `neg_inf`
    pub floor: f64,
    /// Log-space sentinel for zero probability
    pub neg_inf: f64,
    /// Linear-space sentinel for overflowing exponentials
    pub pos_inf: f64,
}

impl Default for NumericLimits {
    fn default() -> Self {
        Self { floor: NEARLY_POSITIVE_ZERO, neg_inf: NEARLY_NEGATIVE_INF, pos_inf: NEARLY_POSITIVE_INF }
    }
}

impl NumericLimits {
    /// Largest log value that still exponentiates below `pos_inf`.
    pub fn log_pos_inf(&self) -> f64 {
        self.pos_inf.ln()
    }
}

/// Representation tag of a probability array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PType {
    /// Linear coefficients with a positive multiplier.
    Coef(f64),
    /// Log values with an additive offset; `negative` flags a negative multiplier.
    Log {
        /// Natural-log offset added to stored values
        offset: f64,
        /// Multiplier was negative before logging
        negative: bool,
    },
}

impl Default for PType {
    fn default() -> Self {
        PType::IDENTITY
    }
}

impl PType {
    /// Plain linear probabilities.
    pub const IDENTITY: PType = PType::Coef(1.0);
    /// Plain log probabilities.
    pub const LOG: PType = PType::Log { offset: 0.0, negative: false };

    /// Linear tag from a coefficient. A coefficient of exactly zero selects [`PType::LOG`].
    pub fn coef(c: f64) -> Result<Self> {
        if c == 0.0 {
            return Ok(PType::LOG);
        }
        if !c.is_finite() || c < 0.0 {
            return Err(Error::InvalidOperation(format!(
                "probability coefficient must be finite and >= 0, got {}",
                c
            )));
        }
        Ok(PType::Coef(c))
    }

    /// Log tag with a positive multiplier `exp(offset)`.
    pub fn log(offset: f64) -> Result<Self> {
        if !offset.is_finite() {
            return Err(Error::InvalidOperation(format!("log offset must be finite, got {}", offset)));
        }
        Ok(PType::Log { offset, negative: false })
    }

    /// Log tag from its complex encoding: real part is the offset, an
    /// imaginary part of π (anything not ~0) marks a negative multiplier.
    pub fn from_complex(re: f64, im: f64) -> Result<Self> {
        if !re.is_finite() || !im.is_finite() {
            return Err(Error::InvalidOperation(format!(
                "complex ptype must be finite, got ({}, {})",
                re, im
            )));
        }
        Ok(PType::Log { offset: re, negative: im.abs() >= NEARLY_POSITIVE_ZERO })
    }

    /// Complex encoding `(offset, 0 | π)` of a log tag; `None` for linear tags.
    pub fn to_complex(self) -> Option<(f64, f64)> {
        match self {
            PType::Coef(_) => None,
            PType::Log { offset, negative } => {
                Some((offset, if negative { std::f64::consts::PI } else { 0.0 }))
            }
        }
    }

    /// Whether stored values are log probabilities.
    pub fn is_log(self) -> bool {
        matches!(self, PType::Log { .. })
    }

    /// `ln |multiplier|`.
    pub fn log_offset(self) -> f64 {
        match self {
            PType::Coef(c) => c.ln(),
            PType::Log { offset, .. } => offset,
        }
    }

    /// Sign of the multiplier.
    pub fn sign(self) -> f64 {
        match self {
            PType::Log { negative: true, .. } => -1.0,
            _ => 1.0,
        }
    }

    /// Signed multiplier in linear terms.
    pub fn coefficient(self) -> f64 {
        match self {
            PType::Coef(c) => c,
            PType::Log { offset, .. } => self.sign() * offset.exp(),
        }
    }

    /// Whether the tag leaves stored values unscaled (in its own domain).
    pub fn is_identity(self) -> bool {
        self == PType::IDENTITY || self == PType::LOG
    }
}

impl FromStr for PType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "log" | "ln" => Ok(PType::LOG),
            other => {
                let c: f64 = other.parse().map_err(|_| {
                    Error::InvalidOperation(format!("cannot evaluate ptype from '{}'", s))
                })?;
                PType::coef(c)
            }
        }
    }
}

/// Elementwise `ln` with default limits.
pub fn to_log(prob: &ArrayD<f64>) -> ArrayD<f64> {
    to_log_with(prob, &NumericLimits::default())
}

/// Elementwise `ln`; values below `limits.floor` become `limits.neg_inf`.
pub fn to_log_with(prob: &ArrayD<f64>, limits: &NumericLimits) -> ArrayD<f64> {
    prob.mapv(|p| ln_floored(p, limits.floor, limits.neg_inf))
}

/// Elementwise `exp` with default limits.
pub fn from_log(logp: &ArrayD<f64>) -> ArrayD<f64> {
    from_log_with(logp, &NumericLimits::default())
}

/// Elementwise `exp`; values above `ln(limits.pos_inf)` become `limits.pos_inf`.
pub fn from_log_with(logp: &ArrayD<f64>, limits: &NumericLimits) -> ArrayD<f64> {
    let ceiling = limits.log_pos_inf();
    logp.mapv(|x| exp_capped(x, ceiling, limits.pos_inf))
}

/// Re-express `prob` stored under `from` as stored under `to`, with default limits.
pub fn rescale(prob: &ArrayD<f64>, from: PType, to: PType) -> Result<ArrayD<f64>> {
    rescale_with(prob, from, to, &NumericLimits::default())
}

/// Re-express `prob` stored under `from` as stored under `to`.
///
/// Linear-to-linear conversions stay linear; everything else goes through log
/// space so large offsets cannot overflow.
pub fn rescale_with(
    prob: &ArrayD<f64>,
    from: PType,
    to: PType,
    limits: &NumericLimits,
) -> Result<ArrayD<f64>> {
    if from == to {
        return Ok(prob.clone());
    }

    if let (PType::Coef(c_from), PType::Coef(c_to)) = (from, to) {
        let ratio = c_from / c_to;
        if ratio == 1.0 {
            return Ok(prob.clone());
        }
        return Ok(prob * ratio);
    }

    if from.is_log() && to.is_log() && from.sign() != to.sign() {
        return Err(Error::InvalidOperation(format!(
            "cannot rescale between log representations of opposite sign ({:?} -> {:?})",
            from, to
        )));
    }

    // linear values are logged in the destination's sign convention
    let mut logp = match (from.is_log(), to.sign() < 0.0) {
        (true, _) => prob.clone(),
        (false, false) => to_log_with(prob, limits),
        (false, true) => to_log_with(&-prob, limits),
    };
    let d_offs = from.log_offset() - to.log_offset();
    if d_offs.abs() >= limits.floor {
        logp.mapv_inplace(|x| x + d_offs);
    }
    if to.is_log() {
        return Ok(logp);
    }
    let out = from_log_with(&logp, limits);
    if from.sign() < 0.0 { Ok(-out) } else { Ok(out) }
}

/// Rescale a single probability value.
pub fn rescale_value(p: f64, from: PType, to: PType) -> Result<f64> {
    let out = rescale(&ndarray::arr0(p).into_dyn(), from, to)?;
    Ok(out.first().copied().unwrap_or(p))
}

/// Tag of the pointwise product of arrays carrying `tags`.
///
/// `use_log` defaults to "any input is log". An empty slice yields the
/// identity (the empty product).
pub fn combine_tags(tags: &[PType], use_log: Option<bool>) -> Result<PType> {
    let use_log = use_log.unwrap_or_else(|| tags.iter().any(|t| t.is_log()));
    if use_log {
        let offset: f64 = tags.iter().map(|t| t.log_offset()).sum();
        let negative = tags.iter().filter(|t| t.sign() < 0.0).count() % 2 == 1;
        return Ok(PType::Log { offset, negative });
    }

    if let Some(t) = tags.iter().find(|t| t.sign() < 0.0) {
        return Err(Error::InvalidOperation(format!(
            "negative multiplier {:?} cannot be combined in linear space",
            t
        )));
    }
    let coef: f64 = tags.iter().map(|t| t.coefficient()).product();
    if coef.is_finite() && coef > 0.0 {
        Ok(PType::Coef(coef))
    } else {
        // Out of finite range: carry the same multiplier as a log offset.
        let offset: f64 = tags.iter().map(|t| t.log_offset()).sum();
        Ok(PType::Log { offset, negative: false })
    }
}

/// Shape two arrays broadcast to, or `None` if incompatible.
pub(crate) fn broadcast_shape(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let n = a.len().max(b.len());
    let mut out = vec![1; n];
    for i in 0..n {
        let da = if i + a.len() >= n { a[i + a.len() - n] } else { 1 };
        let db = if i + b.len() >= n { b[i + b.len() - n] } else { 1 };
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return None,
        };
    }
    Some(out)
}

/// Pointwise product of probability arrays (broadcasting), returning the
/// combined array and its tag.
///
/// Operands are converted into the chosen domain first: in log space the
/// arrays are added, in linear space multiplied.
pub fn prod_prob(
    probs: &[ArrayD<f64>],
    tags: &[PType],
    use_log: Option<bool>,
) -> Result<(ArrayD<f64>, PType)> {
    if probs.is_empty() {
        return Err(Error::InvalidOperation("product of zero probability arrays".into()));
    }
    if probs.len() != tags.len() {
        return Err(Error::InvalidOperation(format!(
            "{} probability arrays but {} ptypes",
            probs.len(),
            tags.len()
        )));
    }
    let use_log = use_log.unwrap_or_else(|| tags.iter().any(|t| t.is_log()));
    let ptype = combine_tags(tags, Some(use_log))?;

    let mut acc: Option<ArrayD<f64>> = None;
    for (prob, tag) in probs.iter().zip(tags) {
        let p = match (use_log, tag.is_log()) {
            (true, false) => to_log(prob),
            (false, true) => from_log(prob),
            _ => prob.clone(),
        };
        acc = Some(match acc {
            None => p,
            Some(a) => {
                if broadcast_shape(a.shape(), p.shape()).is_none() {
                    return Err(Error::Shape(format!(
                        "cannot broadcast shapes {:?} and {:?}",
                        a.shape(),
                        p.shape()
                    )));
                }
                if use_log { &a + &p } else { &a * &p }
            }
        });
    }
    let prob = acc.ok_or_else(|| Error::InvalidOperation("empty product".into()))?;
    // combine_tags moved an out-of-range linear multiplier into log space
    if ptype.is_log() && !use_log {
        return Ok((to_log(&prob), ptype));
    }
    Ok((prob, ptype))
}
