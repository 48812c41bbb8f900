//! Realised probability distributions: a partition of named variables, their
//! supports, a probability array, and its representation tag.
//!
//! Every structural operation returns a new [`Distribution`]; only
//! [`Distribution::rescale`] changes an instance in place.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use ndarray::{ArrayD, Axis as ArrayAxis, arr0};
use pb_core::{Axis, DistributionAlgebra, Error, Result, Value};

use crate::partition::{BIND_DELIM, Partition, bare_key, parse_partition};
use crate::ptypes::{NEARLY_POSITIVE_ZERO, PType, rescale};
use crate::support::{Support, VarValues};

/// A joint/conditional probability distribution over named variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    partition: Partition,
    vars: IndexMap<String, Support>,
    prob: Option<ArrayD<f64>>,
    ptype: PType,
}

fn validate_ptype(ptype: PType) -> Result<PType> {
    match ptype {
        PType::Coef(c) if !c.is_finite() || c <= 0.0 => Err(Error::InvalidOperation(format!(
            "linear ptype coefficient must be finite and > 0, got {}",
            c
        ))),
        PType::Log { offset, .. } if !offset.is_finite() => {
            Err(Error::InvalidOperation(format!("log ptype offset must be finite, got {}", offset)))
        }
        t => Ok(t),
    }
}

fn unique_keys<'a>(keys: &[&'a str]) -> IndexSet<&'a str> {
    keys.iter().copied().collect()
}

impl Distribution {
    /// Build a distribution, validating the partition/support/shape invariants.
    ///
    /// Tokens are normalised: scalar variables render as `key=value`, array
    /// variables as the bare key.
    pub fn new(
        partition: Partition,
        vars: IndexMap<String, Support>,
        prob: Option<ArrayD<f64>>,
        ptype: PType,
    ) -> Result<Self> {
        let ptype = validate_ptype(ptype)?;
        let mut partition = partition;

        for key in vars.keys() {
            if !partition.contains(key) {
                return Err(Error::Key(format!(
                    "value key '{}' not found among name keys '{}'",
                    key, partition
                )));
            }
        }
        let missing: Vec<String> = partition.keys().filter(|k| !vars.contains_key(*k)).cloned().collect();
        if !missing.is_empty() {
            return Err(Error::Key(format!("no values given for name keys {:?}", missing)));
        }

        for (key, support) in &vars {
            let token = partition.token(key).unwrap_or(key.as_str()).to_string();
            let bound = bare_key(&token) != token;
            match support {
                Support::Scalar(v) => partition.set_token(key, format!("{}{}{}", key, BIND_DELIM, v)),
                Support::Array { .. } if bound => {
                    return Err(Error::Format(format!(
                        "token '{}' binds a value but '{}' is not scalar",
                        token, key
                    )));
                }
                Support::Array { .. } => partition.set_token(key, key.clone()),
            }
        }

        let mut axes: Vec<usize> = vars.values().filter_map(|s| s.axis().index()).collect();
        axes.sort_unstable();
        if axes.iter().enumerate().any(|(i, &a)| i != a) {
            return Err(Error::Shape(format!("axes must be unique and contiguous from 0, got {:?}", axes)));
        }

        if let Some(p) = &prob {
            if p.ndim() != axes.len() {
                return Err(Error::Shape(format!(
                    "mismatch in dimensionality between values {} and probabilities {}",
                    axes.len(),
                    p.ndim()
                )));
            }
            for (key, support) in &vars {
                if let Support::Array { values, axis } = support {
                    if p.shape()[*axis] != values.len() {
                        return Err(Error::Shape(format!(
                            "variable '{}' has {} values but axis {} of prob has extent {}",
                            key,
                            values.len(),
                            axis,
                            p.shape()[*axis]
                        )));
                    }
                }
            }
        }

        Ok(Self { partition, vars, prob, ptype })
    }

    /// Build from a name plus separate values and dims maps.
    ///
    /// Keys missing from `dims` default to [`Axis::Scalar`]; a variable must be
    /// scalar in `values` exactly when its dim is scalar.
    pub fn from_parts(
        name: &str,
        values: IndexMap<String, VarValues>,
        dims: IndexMap<String, Axis>,
        prob: Option<ArrayD<f64>>,
        ptype: PType,
    ) -> Result<Self> {
        let partition = parse_partition(name)?;
        if let Some(key) = dims.keys().find(|k| !values.contains_key(*k)) {
            return Err(Error::Key(format!("dims key '{}' has no values", key)));
        }
        let mut vars = IndexMap::with_capacity(values.len());
        for (key, vals) in values {
            let dim = dims.get(&key).copied().unwrap_or(Axis::Scalar);
            let support = match (vals, dim) {
                (VarValues::Scalar(v), Axis::Scalar) => Support::Scalar(v),
                (VarValues::Array(vs), Axis::Indexed(axis)) => Support::Array { values: vs, axis },
                (VarValues::Scalar(_), Axis::Indexed(axis)) => {
                    return Err(Error::Shape(format!("scalar '{}' assigned axis {}", key, axis)));
                }
                (VarValues::Array(_), Axis::Scalar) => {
                    return Err(Error::Shape(format!("array values for '{}' without an axis", key)));
                }
            };
            vars.insert(key, support);
        }
        Self::new(partition, vars, prob, ptype)
    }

    /// Point distribution: every variable scalar, probability a single value.
    pub fn scalar(name: &str, values: &[(&str, Value)], prob: f64, ptype: PType) -> Result<Self> {
        let partition = parse_partition(name)?;
        let vars = values.iter().map(|(k, v)| (k.to_string(), Support::Scalar(v.clone()))).collect();
        Self::new(partition, vars, Some(arr0(prob).into_dyn()), ptype)
    }

    /// Display name, regenerated from the partition.
    pub fn name(&self) -> String {
        self.partition.to_string()
    }

    /// Marginal/conditional partition.
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// All variable keys.
    pub fn keyset(&self) -> IndexSet<String> {
        self.partition.keys().cloned().collect()
    }

    /// Marginal keys in order.
    pub fn marg_names(&self) -> Vec<String> {
        self.partition.marg_keys()
    }

    /// Conditional keys in order.
    pub fn cond_names(&self) -> Vec<String> {
        self.partition.cond_keys()
    }

    /// Representation tag.
    pub fn ptype(&self) -> PType {
        self.ptype
    }

    /// Probability array as stored, `None` if undefined.
    pub fn prob(&self) -> Option<&ArrayD<f64>> {
        self.prob.as_ref()
    }

    /// Stored probability of a scalar distribution.
    pub fn prob_scalar(&self) -> Option<f64> {
        self.prob.as_ref().filter(|p| p.ndim() == 0).and_then(|p| p.first().copied())
    }

    /// Variable supports in order.
    pub fn vars(&self) -> &IndexMap<String, Support> {
        &self.vars
    }

    /// Support of `key`.
    pub fn values(&self, key: &str) -> Result<&Support> {
        self.vars.get(key).ok_or_else(|| Error::Key(format!("'{}' not in distribution {}", key, self.name())))
    }

    /// Axis of `key`.
    pub fn axis(&self, key: &str) -> Result<Axis> {
        Ok(self.values(key)?.axis())
    }

    /// Axis assignment of every variable.
    pub fn dims(&self) -> IndexMap<String, Axis> {
        self.vars.iter().map(|(k, s)| (k.clone(), s.axis())).collect()
    }

    /// Whether `key` is scalar.
    pub fn is_scalar_key(&self, key: &str) -> Result<bool> {
        Ok(self.values(key)?.is_scalar())
    }

    /// Whether no variable occupies an axis.
    pub fn is_scalar(&self) -> bool {
        self.vars.values().all(Support::is_scalar)
    }

    /// Number of probability axes.
    pub fn ndim(&self) -> usize {
        self.vars.values().filter(|s| !s.is_scalar()).count()
    }

    /// Extent of each probability axis, in axis order.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = vec![0; self.ndim()];
        for support in self.vars.values() {
            if let Support::Array { values, axis } = support {
                shape[*axis] = values.len();
            }
        }
        shape
    }

    /// Array variables ordered by axis.
    fn arrays_by_axis(&self) -> Vec<(&String, usize)> {
        let mut arrays: Vec<(&String, usize)> =
            self.vars.iter().filter_map(|(k, s)| s.axis().index().map(|a| (k, a))).collect();
        arrays.sort_by_key(|&(_, a)| a);
        arrays
    }

    fn check_marginal_arrays(&self, keys: &IndexSet<&str>, op: &str) -> Result<()> {
        for key in keys {
            if !self.partition.contains(key) {
                return Err(Error::Key(format!("'{}' not in distribution {}", key, self.name())));
            }
            if !self.partition.is_marginal(key) {
                return Err(Error::InvalidOperation(format!(
                    "key '{}' not marginal in distribution {}",
                    key,
                    self.name()
                )));
            }
            if self.vars[*key].is_scalar() {
                return Err(Error::InvalidOperation(format!("cannot {} along scalar key '{}'", op, key)));
            }
        }
        Ok(())
    }

    /// From `P(A, keys | B)` return `P(A | B)` by summing out `keys`.
    pub fn marginalize(&self, keys: &[&str]) -> Result<Self> {
        let keys = unique_keys(keys);
        self.check_marginal_arrays(&keys, "marginalise")?;

        let mut sum_axes: Vec<usize> = keys.iter().filter_map(|k| self.vars[*k].axis().index()).collect();
        sum_axes.sort_unstable();

        let mut partition = self.partition.clone();
        for key in &keys {
            partition.remove_marginal(key);
        }
        let vars: IndexMap<String, Support> = self
            .vars
            .iter()
            .filter(|(k, _)| !keys.contains(k.as_str()))
            .map(|(k, s)| {
                let support = match s.axis().index() {
                    Some(a) => s.with_axis(a - sum_axes.iter().filter(|&&x| x < a).count()),
                    None => s.clone(),
                };
                (k.clone(), support)
            })
            .collect();

        let prob = match &self.prob {
            Some(p) => {
                let mut summed = rescale(p, self.ptype, PType::IDENTITY)?;
                for &a in sum_axes.iter().rev() {
                    summed = summed.sum_axis(ArrayAxis(a));
                }
                Some(rescale(&summed, PType::IDENTITY, self.ptype)?)
            }
            None => None,
        };
        Self::new(partition, vars, prob, self.ptype)
    }

    /// From `P(A, keys | B)` return `P(keys | B)`: sums out every other array marginal.
    pub fn marginal(&self, keys: &[&str]) -> Result<Self> {
        let keys = unique_keys(keys);
        self.check_marginal_arrays(&keys, "marginalise")?;
        let others: Vec<&str> = self
            .vars
            .iter()
            .filter(|(k, s)| {
                self.partition.is_marginal(k) && !s.is_scalar() && !keys.contains(k.as_str())
            })
            .map(|(k, _)| k.as_str())
            .collect();
        self.marginalize(&others)
    }

    /// From `P(A, keys | B)` return `P(A | B, keys)`.
    ///
    /// Moved keys take the highest axes, in variable order. The result is
    /// normalised so that, for each fixed value of the conditioning variables,
    /// the remaining marginal axes sum to one; denominators are floored at
    /// [`NEARLY_POSITIVE_ZERO`]. Under a negative log tag the magnitudes are
    /// normalised and the sign carried through.
    pub fn conditionalise(&self, keys: &[&str]) -> Result<Self> {
        let keys = unique_keys(keys);
        self.check_marginal_arrays(&keys, "conditionalise")?;

        let retained: Vec<(&String, usize)> =
            self.arrays_by_axis().into_iter().filter(|(k, _)| !keys.contains(k.as_str())).collect();
        // moved keys join the conditionals in variable order
        let moved: Vec<(&String, usize)> = self
            .vars
            .iter()
            .filter(|(k, _)| keys.contains(k.as_str()))
            .filter_map(|(k, s)| s.axis().index().map(|a| (k, a)))
            .collect();

        // new axis i is taken from old axis perm[i]
        let perm: Vec<usize> = retained.iter().chain(moved.iter()).map(|&(_, a)| a).collect();
        let mut new_axes: IndexMap<&str, usize> = IndexMap::with_capacity(perm.len());
        for (i, (k, _)) in retained.iter().chain(moved.iter()).enumerate() {
            new_axes.insert(k.as_str(), i);
        }
        let sum_axes: Vec<usize> = retained
            .iter()
            .filter(|(k, _)| self.partition.is_marginal(k))
            .map(|(k, _)| new_axes[k.as_str()])
            .collect();

        let mut partition = self.partition.clone();
        for (k, _) in &moved {
            partition.move_to_conditional(k);
        }
        let vars: IndexMap<String, Support> = self
            .vars
            .iter()
            .map(|(k, s)| {
                let support = match new_axes.get(k.as_str()) {
                    Some(&a) => s.with_axis(a),
                    None => s.clone(),
                };
                (k.clone(), support)
            })
            .collect();

        let prob = match &self.prob {
            Some(p) => {
                // normalise magnitudes; a negative log tag keeps its sign
                let sign = self.ptype.sign();
                let lin = rescale(p, self.ptype, PType::IDENTITY)?.mapv(|x| x * sign).permuted_axes(perm);
                let mut denom = lin.clone();
                for &a in &sum_axes {
                    denom = denom.sum_axis(ArrayAxis(a)).insert_axis(ArrayAxis(a));
                }
                let clamped = denom.iter().filter(|&&x| x < NEARLY_POSITIVE_ZERO).count();
                if clamped > 0 {
                    log::warn!(
                        "conditionalise({:?}): {} normalising sum(s) below floor, clamped to {:e}",
                        keys,
                        clamped,
                        NEARLY_POSITIVE_ZERO
                    );
                }
                denom.mapv_inplace(|x| x.max(NEARLY_POSITIVE_ZERO));
                let normed = (&lin / &denom).mapv(|x| x * sign);
                Some(rescale(&normed, PType::IDENTITY, self.ptype)?)
            }
            None => None,
        };
        Self::new(partition, vars, prob, self.ptype)
    }

    /// Point-slice at scalar bindings.
    ///
    /// Bound array variables become scalar (`key=value`) and lose their axis.
    /// If a bound value is not on its variable's support (or differs from an
    /// already-scalar value) the resulting probability is undefined (`None`).
    pub fn evaluate(&self, bindings: &[(&str, Value)]) -> Result<Self> {
        let mut bound: IndexMap<&str, &Value> = IndexMap::with_capacity(bindings.len());
        for (key, value) in bindings {
            if !self.partition.contains(key) {
                return Err(Error::Key(format!("unrecognised key '{}' for distribution {}", key, self.name())));
            }
            bound.insert(key, value);
        }

        let bound_axes: Vec<usize> = self
            .vars
            .iter()
            .filter(|(k, _)| bound.contains_key(k.as_str()))
            .filter_map(|(_, s)| s.axis().index())
            .collect();

        let mut vars = IndexMap::with_capacity(self.vars.len());
        let mut slices: Vec<(usize, usize)> = Vec::with_capacity(bound_axes.len());
        let mut defined = true;
        for (key, support) in &self.vars {
            match (bound.get(key.as_str()), support) {
                (Some(&v), Support::Scalar(current)) => {
                    defined &= current == v;
                    vars.insert(key.clone(), Support::Scalar(v.clone()));
                }
                (Some(&v), Support::Array { axis, .. }) => {
                    match support.position(v) {
                        Some(index) => slices.push((*axis, index)),
                        None => defined = false,
                    }
                    vars.insert(key.clone(), Support::Scalar(v.clone()));
                }
                (None, Support::Array { axis, .. }) => {
                    let shift = bound_axes.iter().filter(|&&b| b < *axis).count();
                    vars.insert(key.clone(), support.with_axis(axis - shift));
                }
                (None, Support::Scalar(_)) => {
                    vars.insert(key.clone(), support.clone());
                }
            }
        }

        let prob = match (&self.prob, defined) {
            (Some(p), true) => {
                slices.sort_unstable_by(|a, b| b.0.cmp(&a.0));
                let mut sliced = p.clone();
                for (axis, index) in slices {
                    sliced = sliced.index_axis_move(ArrayAxis(axis), index);
                }
                Some(sliced)
            }
            (_, false) => {
                log::debug!("evaluate: bindings {:?} not on support of {}", bound, self.name());
                None
            }
            (None, true) => None,
        };
        Self::new(self.partition.clone(), vars, prob, self.ptype)
    }

    /// Linear probability at a point binding every array variable.
    pub fn prob_at(&self, bindings: &[(&str, Value)]) -> Result<Option<f64>> {
        let point = self.evaluate(bindings)?;
        if !point.is_scalar() {
            return Err(Error::InvalidOperation(format!(
                "bindings leave {} array variable(s) unbound in {}",
                point.ndim(),
                self.name()
            )));
        }
        Ok(point.rescaled(PType::IDENTITY)?.prob_scalar())
    }

    /// Same distribution with array variables on axes in the order of `order`.
    pub fn redim(&self, order: &[&str]) -> Result<Self> {
        let order = unique_keys(order);
        if order.len() != self.ndim() {
            return Err(Error::Shape(format!(
                "redim order lists {} keys but distribution has {} axes",
                order.len(),
                self.ndim()
            )));
        }
        let mut perm = Vec::with_capacity(order.len());
        for key in &order {
            match self.values(key)?.axis() {
                Axis::Indexed(a) => perm.push(a),
                Axis::Scalar => return Err(Error::Shape(format!("cannot assign an axis to scalar '{}'", key))),
            }
        }
        let vars = self
            .vars
            .iter()
            .map(|(k, s)| match order.get_index_of(k.as_str()) {
                Some(a) => (k.clone(), s.with_axis(a)),
                None => (k.clone(), s.clone()),
            })
            .collect();
        let prob = self.prob.as_ref().map(|p| p.clone().permuted_axes(perm));
        Self::new(self.partition.clone(), vars, prob, self.ptype)
    }

    /// Copy re-expressed under another representation tag.
    pub fn rescaled(&self, ptype: PType) -> Result<Self> {
        let ptype = validate_ptype(ptype)?;
        let prob = match &self.prob {
            Some(p) => Some(rescale(p, self.ptype, ptype)?),
            None => None,
        };
        Ok(Self { partition: self.partition.clone(), vars: self.vars.clone(), prob, ptype })
    }

    /// Re-express in place under another representation tag.
    ///
    /// The only mutating operation on a distribution; contents are unchanged,
    /// only their encoding.
    pub fn rescale(&mut self, ptype: PType) -> Result<()> {
        let ptype = validate_ptype(ptype)?;
        if let Some(p) = &self.prob {
            self.prob = Some(rescale(p, self.ptype, ptype)?);
        }
        self.ptype = ptype;
        Ok(())
    }
}

impl DistributionAlgebra for Distribution {
    fn marginalize(&self, keys: &[&str]) -> Result<Self> {
        Distribution::marginalize(self, keys)
    }

    fn marginal(&self, keys: &[&str]) -> Result<Self> {
        Distribution::marginal(self, keys)
    }

    fn conditionalise(&self, keys: &[&str]) -> Result<Self> {
        Distribution::conditionalise(self, keys)
    }

    fn evaluate(&self, bindings: &[(&str, Value)]) -> Result<Self> {
        Distribution::evaluate(self, bindings)
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.ptype.is_log() { "logp" } else { "p" };
        write!(f, "{}({})", prefix, self.name())?;
        if self.is_scalar() {
            if let Some(p) = self.prob_scalar() {
                write!(f, "={}", p)?;
            }
        }
        Ok(())
    }
}
