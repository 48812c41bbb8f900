//! Combining distributions: products of independent factors and concatenation.
//!
//! A product `P(A | B) * P(B | C)` must not double-count marginals, and every
//! operand must share the same residual conditionals once keys supplied as
//! marginals by another operand are removed.

use std::ops::{Add, Mul};

use indexmap::{IndexMap, IndexSet};
use ndarray::{ArrayD, ArrayViewD, Axis as ArrayAxis, arr0, concatenate};
use pb_core::{Error, Result};

use crate::dist::Distribution;
use crate::partition::Partition;
use crate::ptypes::{PType, combine_tags, prod_prob};
use crate::support::Support;

/// Product of two or more distributions.
pub fn product(dists: &[&Distribution]) -> Result<Distribution> {
    product_with(dists, None)
}

/// Product of two or more distributions, optionally re-expressed under `ptype`.
///
/// Marginal keys must be unique across operands. A conditional key that is
/// marginal in another operand is resolved by it; the remaining conditionals
/// must match across all operands. Variables shared between operands must
/// carry consistent values.
///
/// Fails with [`Error::SharedAxisUnsupported`] when a shared variable is
/// scalar in one operand and array-valued in another.
pub fn product_with(dists: &[&Distribution], ptype: Option<PType>) -> Result<Distribution> {
    let (first, rest) = dists
        .split_first()
        .ok_or_else(|| Error::InvalidOperation("product of zero distributions".into()))?;
    if rest.is_empty() {
        return match ptype {
            Some(t) => first.rescaled(t),
            None => Ok((*first).clone()),
        };
    }

    let mut prod_marg: IndexMap<String, String> = IndexMap::new();
    for d in dists {
        for (key, token) in d.partition().marg() {
            if prod_marg.contains_key(key) {
                return Err(Error::AmbiguousMarginalNames(format!(
                    "marginal variable '{}' not unique across distributions",
                    key
                )));
            }
            prod_marg.insert(key.clone(), token.clone());
        }
    }

    let mut resolved: IndexSet<&str> = IndexSet::new();
    let mut prod_cond: IndexMap<String, String> = IndexMap::new();
    for d in dists {
        for (key, token) in d.partition().cond() {
            if prod_marg.contains_key(key) {
                resolved.insert(key.as_str());
            } else {
                prod_cond.entry(key.clone()).or_insert_with(|| token.clone());
            }
        }
    }
    let prod_cond_set: IndexSet<&str> = prod_cond.keys().map(String::as_str).collect();
    for d in dists {
        let residual: IndexSet<&str> =
            d.partition().cond().keys().map(String::as_str).filter(|k| !resolved.contains(k)).collect();
        if residual != prod_cond_set {
            return Err(Error::IncompatibleDistributions(format!(
                "incompatible conditionals {:?} vs {:?}",
                prod_cond_set, residual
            )));
        }
    }

    // Supports: marginal owner first, else first operand holding the key.
    let mut vars: IndexMap<String, Support> = IndexMap::new();
    for key in prod_marg.keys().chain(prod_cond.keys()) {
        let mut holders = dists.iter().filter_map(|d| d.vars().get(key));
        let owner = dists
            .iter()
            .find(|d| d.partition().is_marginal(key))
            .and_then(|d| d.vars().get(key))
            .or_else(|| holders.next())
            .ok_or_else(|| Error::Key(format!("values for key '{}' not found", key)))?;
        for other in dists.iter().filter_map(|d| d.vars().get(key)) {
            if other.is_scalar() != owner.is_scalar() {
                return Err(Error::SharedAxisUnsupported(format!(
                    "'{}' is scalar in one operand and array-valued in another",
                    key
                )));
            }
            if !other.approx_eq(owner) {
                return Err(Error::IncompatibleDistributions(format!(
                    "mismatch in values for shared variable '{}'",
                    key
                )));
            }
        }
        vars.insert(key.clone(), owner.clone());
    }

    // One axis per array variable, marginals first.
    let mut global: IndexMap<String, usize> = IndexMap::new();
    for (key, support) in vars.iter_mut() {
        if !support.is_scalar() {
            let axis = global.len();
            *support = support.with_axis(axis);
            global.insert(key.clone(), axis);
        }
    }

    let marg_tokens: Vec<&String> = prod_marg.values().collect();
    let cond_tokens: Vec<&String> = prod_cond.values().collect();
    let partition = Partition::new(&marg_tokens, &cond_tokens)?;
    let tags: Vec<PType> = dists.iter().map(|d| d.ptype()).collect();

    let probs: Option<Vec<&ArrayD<f64>>> = dists.iter().map(|d| d.prob()).collect();
    let Some(probs) = probs else {
        let tag = combine_tags(&tags, None)?;
        return Distribution::new(partition, vars, None, tag);
    };

    let fast_track = dists.iter().all(|d| d.is_scalar()) && tags.iter().all(|t| *t == tags[0] && t.is_identity());
    let (prob, tag) = if fast_track {
        log::debug!("product: scalar fast track over {} operands", dists.len());
        let values = probs.iter().filter_map(|p| p.first().copied());
        let p = if tags[0].is_log() { values.sum::<f64>() } else { values.product::<f64>() };
        (arr0(p).into_dyn(), tags[0])
    } else {
        let aligned: Vec<ArrayD<f64>> =
            dists.iter().zip(probs).map(|(d, p)| align_to_global(d, p, &global)).collect();
        prod_prob(&aligned, &tags, None)?
    };

    let dist = Distribution::new(partition, vars, Some(prob), tag)?;
    match ptype {
        Some(t) => dist.rescaled(t),
        None => Ok(dist),
    }
}

/// Permute `prob` into ascending global-axis order and insert singleton axes
/// for variables the operand does not hold, ready for broadcasting.
fn align_to_global(d: &Distribution, prob: &ArrayD<f64>, global: &IndexMap<String, usize>) -> ArrayD<f64> {
    let mut local: Vec<(usize, usize)> = d
        .vars()
        .iter()
        .filter_map(|(k, s)| s.axis().index().map(|a| (global[k.as_str()], a)))
        .collect();
    local.sort_unstable();
    let perm: Vec<usize> = local.iter().map(|&(_, a)| a).collect();
    let mut out = prob.clone().permuted_axes(perm);
    for g in 0..global.len() {
        if !local.iter().any(|&(lg, _)| lg == g) {
            out = out.insert_axis(ArrayAxis(g));
        }
    }
    out
}

/// Concatenate distributions that differ along exactly one variable.
///
/// All operands must share marginal and conditional keys; each is rescaled to
/// the first operand's representation and aligned to its axis order.
pub fn sum_dist(dists: &[&Distribution]) -> Result<Distribution> {
    let (first, rest) = dists
        .split_first()
        .ok_or_else(|| Error::InvalidOperation("concatenation of zero distributions".into()))?;
    if rest.is_empty() {
        return Ok((*first).clone());
    }

    let marg: IndexSet<String> = first.marg_names().into_iter().collect();
    let cond: IndexSet<String> = first.cond_names().into_iter().collect();
    let mut order: Vec<(&str, usize)> =
        first.vars().iter().filter_map(|(k, s)| s.axis().index().map(|a| (k.as_str(), a))).collect();
    order.sort_by_key(|&(_, a)| a);
    let order: Vec<&str> = order.into_iter().map(|(k, _)| k).collect();

    let mut aligned: Vec<Distribution> = Vec::with_capacity(rest.len());
    let mut differing: IndexSet<String> = IndexSet::new();
    for d in rest {
        let d_marg: IndexSet<String> = d.marg_names().into_iter().collect();
        let d_cond: IndexSet<String> = d.cond_names().into_iter().collect();
        if d_marg != marg || d_cond != cond {
            return Err(Error::IncompatibleDistributions(format!(
                "variable names not identical across distributions: {} vs {}",
                first.name(),
                d.name()
            )));
        }
        for (key, support) in first.vars() {
            let other = d.values(key)?;
            if support.is_scalar() != other.is_scalar() {
                return Err(Error::IncompatibleDistributions(format!(
                    "'{}' is scalar in one operand only",
                    key
                )));
            }
            if !support.approx_eq(other) {
                if support.is_scalar() {
                    return Err(Error::IncompatibleDistributions(format!(
                        "scalar '{}' differs: {} vs {}",
                        key,
                        support.values()[0],
                        other.values()[0]
                    )));
                }
                differing.insert(key.clone());
            }
        }
        aligned.push(d.redim(&order)?.rescaled(first.ptype())?);
    }

    if differing.len() != 1 {
        return Err(Error::NoUniqueAxis(format!(
            "{} variables differ across operands: {:?}",
            differing.len(),
            differing
        )));
    }
    let key = &differing[0];
    let axis = first.values(key)?.axis().index().ok_or_else(|| {
        Error::NoUniqueAxis(format!("'{}' has no axis to concatenate along", key))
    })?;

    let mut values = first.values(key)?.values().to_vec();
    for d in &aligned {
        values.extend_from_slice(d.values(key)?.values());
    }
    let mut vars = first.vars().clone();
    vars.insert(key.clone(), Support::Array { values, axis });

    let prob = match first.prob() {
        Some(p0) => {
            let mut views: Vec<ArrayViewD<'_, f64>> = vec![p0.view()];
            for d in &aligned {
                match d.prob() {
                    Some(p) => views.push(p.view()),
                    None => break,
                }
            }
            if views.len() == dists.len() {
                Some(concatenate(ArrayAxis(axis), &views).map_err(|e| Error::Shape(e.to_string()))?)
            } else {
                None
            }
        }
        None => None,
    };

    Distribution::new(first.partition().clone(), vars, prob, first.ptype())
}

impl Mul for &Distribution {
    type Output = Result<Distribution>;

    fn mul(self, rhs: Self) -> Self::Output {
        product(&[self, rhs])
    }
}

impl Add for &Distribution {
    type Output = Result<Distribution>;

    fn add(self, rhs: Self) -> Self::Output {
        sum_dist(&[self, rhs])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::parse_partition;
    use approx::assert_relative_eq;
    use ndarray::array;
    use pb_core::{Axis, Value};

    fn coin(key: &str, p: f64) -> Distribution {
        let mut vars = IndexMap::new();
        vars.insert(key.to_string(), Support::array([false, true], 0));
        Distribution::new(parse_partition(key).unwrap(), vars, Some(array![1.0 - p, p].into_dyn()), PType::IDENTITY)
            .unwrap()
    }

    /// `P(y | x)` with x on axis 0.
    fn y_given_x() -> Distribution {
        let mut vars = IndexMap::new();
        vars.insert("x".to_string(), Support::array([0, 1], 0));
        vars.insert("y".to_string(), Support::array([0, 1], 1));
        let prob = array![[0.9, 0.1], [0.3, 0.7]].into_dyn();
        Distribution::new(parse_partition("y|x").unwrap(), vars, Some(prob), PType::IDENTITY).unwrap()
    }

    fn x_marginal() -> Distribution {
        let mut vars = IndexMap::new();
        vars.insert("x".to_string(), Support::array([0, 1], 0));
        Distribution::new(parse_partition("x").unwrap(), vars, Some(array![0.6, 0.4].into_dyn()), PType::IDENTITY)
            .unwrap()
    }

    #[test]
    fn test_scalar_product_identity() {
        let a = Distribution::scalar("c0", &[("c0", Value::Bool(true))], 0.7, PType::IDENTITY).unwrap();
        let b = Distribution::scalar("c1", &[("c1", Value::Bool(true))], 0.4, PType::IDENTITY).unwrap();
        let ab = product(&[&a, &b]).unwrap();
        assert!(ab.is_scalar());
        assert_eq!(ab.name(), "c0=True,c1=True");
        assert_relative_eq!(ab.prob_scalar().unwrap(), 0.28, epsilon = 1e-12);
        assert_eq!(ab, (&a * &b).unwrap());
    }

    #[test]
    fn test_scalar_product_in_log_space() {
        let a = Distribution::scalar("a", &[("a", Value::Int(1))], 0.5f64.ln(), PType::LOG).unwrap();
        let b = Distribution::scalar("b", &[("b", Value::Int(2))], 0.25f64.ln(), PType::LOG).unwrap();
        let ab = product(&[&a, &b]).unwrap();
        assert_eq!(ab.ptype(), PType::LOG);
        assert_relative_eq!(ab.prob_scalar().unwrap(), 0.125f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_independent_coins_joint() {
        let c0 = coin("c0", 0.7);
        let c1 = coin("c1", 0.4);
        let joint = product(&[&c0, &c1]).unwrap();
        assert_eq!(joint.name(), "c0,c1");
        assert_eq!(joint.shape(), vec![2, 2]);
        assert_relative_eq!(joint.prob().unwrap().sum(), 1.0, epsilon = 1e-12);
        let p = joint.prob_at(&[("c0", Value::Bool(true)), ("c1", Value::Bool(true))]).unwrap().unwrap();
        assert_relative_eq!(p, 0.28, epsilon = 1e-12);
    }

    #[test]
    fn test_conditional_resolved_by_marginal() {
        let joint = product(&[&y_given_x(), &x_marginal()]).unwrap();
        assert_eq!(joint.name(), "y,x");
        assert!(joint.cond_names().is_empty());
        assert_eq!(joint.axis("y").unwrap(), Axis::Indexed(0));
        assert_eq!(joint.axis("x").unwrap(), Axis::Indexed(1));
        assert_relative_eq!(joint.prob().unwrap().sum(), 1.0, epsilon = 1e-12);
        let p = joint.prob_at(&[("x", Value::Int(1)), ("y", Value::Int(1))]).unwrap().unwrap();
        assert_relative_eq!(p, 0.28, epsilon = 1e-12);
        let p = joint.prob_at(&[("x", Value::Int(0)), ("y", Value::Int(1))]).unwrap().unwrap();
        assert_relative_eq!(p, 0.06, epsilon = 1e-12);

        // and back again
        let cond = joint.conditionalise(&["x"]).unwrap();
        let back = cond.prob_at(&[("x", Value::Int(1)), ("y", Value::Int(0))]).unwrap().unwrap();
        assert_relative_eq!(back, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_mixed_representation_product() {
        let lx = x_marginal().rescaled(PType::LOG).unwrap();
        let joint = product(&[&y_given_x(), &lx]).unwrap();
        assert!(joint.ptype().is_log());
        let p = joint.prob_at(&[("x", Value::Int(1)), ("y", Value::Int(1))]).unwrap().unwrap();
        assert_relative_eq!(p, 0.28, epsilon = 1e-9);

        let lin = product_with(&[&y_given_x(), &lx], Some(PType::IDENTITY)).unwrap();
        assert_eq!(lin.ptype(), PType::IDENTITY);
        assert_relative_eq!(lin.prob().unwrap().sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_product_preconditions() {
        let c0 = coin("c0", 0.7);
        assert!(matches!(product(&[&c0, &c0]), Err(Error::AmbiguousMarginalNames(_))));
        assert!(matches!(product(&[]), Err(Error::InvalidOperation(_))));
        assert_eq!(product(&[&c0]).unwrap(), c0);

        // y|x alone next to an unrelated marginal leaves x unresolved in one operand only
        assert!(matches!(product(&[&y_given_x(), &c0]), Err(Error::IncompatibleDistributions(_))));

        // x values disagree
        let mut vars = IndexMap::new();
        vars.insert("x".to_string(), Support::array([5, 6], 0));
        let bad_x =
            Distribution::new(parse_partition("x").unwrap(), vars, Some(array![0.5, 0.5].into_dyn()), PType::IDENTITY)
                .unwrap();
        assert!(matches!(product(&[&y_given_x(), &bad_x]), Err(Error::IncompatibleDistributions(_))));

        // x evaluated in the marginal operand but still an axis in the conditional one
        let x_point = x_marginal().evaluate(&[("x", Value::Int(1))]).unwrap();
        assert!(matches!(product(&[&y_given_x(), &x_point]), Err(Error::SharedAxisUnsupported(_))));
    }

    #[test]
    fn test_product_shared_residual_conditional() {
        // P(a|z) * P(b|z) -> P(a,b|z)
        let make = |key: &str, p: [[f64; 2]; 2]| {
            let mut vars = IndexMap::new();
            vars.insert("z".to_string(), Support::array([0, 1], 0));
            vars.insert(key.to_string(), Support::array([false, true], 1));
            let prob = array![[p[0][0], p[0][1]], [p[1][0], p[1][1]]].into_dyn();
            Distribution::new(parse_partition(&format!("{}|z", key)).unwrap(), vars, Some(prob), PType::IDENTITY)
                .unwrap()
        };
        let a = make("a", [[0.2, 0.8], [0.6, 0.4]]);
        let b = make("b", [[0.5, 0.5], [0.1, 0.9]]);
        let ab = product(&[&a, &b]).unwrap();
        assert_eq!(ab.name(), "a,b|z");
        assert_eq!(ab.shape(), vec![2, 2, 2]);
        let p = ab
            .prob_at(&[("a", Value::Bool(true)), ("b", Value::Bool(true)), ("z", Value::Int(1))])
            .unwrap()
            .unwrap();
        assert_relative_eq!(p, 0.4 * 0.9, epsilon = 1e-12);
        let total: f64 = ab.evaluate(&[("z", Value::Int(0))]).unwrap().prob().unwrap().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_undefined_operand_gives_undefined_product() {
        let c0 = coin("c0", 0.7).evaluate(&[("c0", Value::Int(3))]).unwrap();
        let c1 = coin("c1", 0.4);
        let prod = product(&[&c0, &c1]).unwrap();
        assert!(prod.prob().is_none());
    }

    fn grid(lo: i64, n: usize, probs: Vec<f64>) -> Distribution {
        let mut vars = IndexMap::new();
        vars.insert("t".to_string(), Support::array((0..n as i64).map(|i| lo + i), 0));
        vars.insert("s".to_string(), Support::array([false, true], 1));
        let prob = ArrayD::from_shape_vec(ndarray::IxDyn(&[n, 2]), probs).unwrap();
        Distribution::new(parse_partition("t,s").unwrap(), vars, Some(prob), PType::IDENTITY).unwrap()
    }

    #[test]
    fn test_sum_dist_concatenates() {
        let a = grid(0, 2, vec![0.1, 0.1, 0.2, 0.1]);
        let b = grid(2, 1, vec![0.3, 0.2]);
        let ab = sum_dist(&[&a, &b]).unwrap();
        assert_eq!(ab.shape(), vec![3, 2]);
        assert_eq!(ab.values("t").unwrap().len(), 3);
        assert_relative_eq!(ab.prob().unwrap().sum(), 1.0, epsilon = 1e-12);
        assert_eq!(ab.prob_at(&[("t", Value::Int(2)), ("s", Value::Bool(false))]).unwrap(), Some(0.3));
        assert_eq!(ab, (&a + &b).unwrap());
    }

    #[test]
    fn test_sum_dist_aligns_axes_and_ptypes() {
        let a = grid(0, 2, vec![0.1, 0.1, 0.2, 0.1]);
        let b = grid(2, 1, vec![0.3, 0.2]).redim(&["s", "t"]).unwrap().rescaled(PType::LOG).unwrap();
        let ab = sum_dist(&[&a, &b]).unwrap();
        assert_eq!(ab.ptype(), PType::IDENTITY);
        let p = ab.prob_at(&[("t", Value::Int(2)), ("s", Value::Bool(true))]).unwrap().unwrap();
        assert_relative_eq!(p, 0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_sum_dist_requires_unique_axis() {
        let a = grid(0, 2, vec![0.1, 0.1, 0.2, 0.1]);
        assert!(matches!(sum_dist(&[&a, &a]), Err(Error::NoUniqueAxis(_))));
        assert!(matches!(sum_dist(&[&a, &coin("c0", 0.5)]), Err(Error::IncompatibleDistributions(_))));
    }
}
