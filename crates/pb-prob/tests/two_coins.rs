//! End-to-end algebra over two independent biased coins.

use approx::assert_relative_eq;
use indexmap::IndexMap;
use ndarray::{Axis as ArrayAxis, array};
use pb_prob::{Distribution, PType, Support, Value, parse_partition, product};
use proptest::prelude::*;

fn coin(key: &str, p_true: f64) -> Distribution {
    let mut vars = IndexMap::new();
    vars.insert(key.to_string(), Support::array([false, true], 0));
    let prob = array![1.0 - p_true, p_true].into_dyn();
    Distribution::new(parse_partition(key).unwrap(), vars, Some(prob), PType::IDENTITY).unwrap()
}

fn coins() -> Distribution {
    product(&[&coin("c0", 0.7), &coin("c1", 0.4)]).unwrap()
}

fn heads(key: &str) -> (&str, Value) {
    (key, Value::Bool(true))
}

#[test]
fn test_joint_point_probability() {
    let joint = coins();
    assert_eq!(joint.name(), "c0,c1");
    assert_eq!(joint.shape(), vec![2, 2]);
    let p = joint.prob_at(&[heads("c0"), heads("c1")]).unwrap().unwrap();
    assert_relative_eq!(p, 0.28, epsilon = 1e-12);

    let point = joint.evaluate(&[heads("c0"), heads("c1")]).unwrap();
    assert!(point.is_scalar());
    assert!(point.to_string().starts_with("p(c0=True,c1=True)="));
}

#[test]
fn test_marginal_recovers_single_coin() {
    let m = coins().marginal(&["c0"]).unwrap();
    assert_eq!(m.name(), "c0");
    assert_relative_eq!(m.prob_at(&[heads("c0")]).unwrap().unwrap(), 0.7, epsilon = 1e-12);

    let total = coins().marginalize(&["c0", "c1"]).unwrap();
    assert!(total.is_scalar());
    assert_relative_eq!(total.prob_scalar().unwrap(), 1.0, epsilon = 1e-12);
}

#[test]
fn test_conditional_slice_sums_to_one() {
    let cond = coins().conditionalise(&["c0"]).unwrap();
    assert_eq!(cond.name(), "c1|c0");
    let slice = cond.evaluate(&[heads("c0")]).unwrap();
    assert_eq!(slice.name(), "c1|c0=True");
    assert_relative_eq!(slice.prob().unwrap().sum(), 1.0, epsilon = 1e-12);
    assert_relative_eq!(slice.prob_at(&[heads("c1")]).unwrap().unwrap(), 0.4, epsilon = 1e-12);
}

#[test]
fn test_chain_rule_roundtrip() {
    let joint = coins();
    let cond = joint.conditionalise(&["c0"]).unwrap();
    let prior = joint.marginal(&["c0"]).unwrap();
    let rebuilt = product(&[&cond, &prior]).unwrap();
    for c0 in [false, true] {
        for c1 in [false, true] {
            let at = [("c0", Value::Bool(c0)), ("c1", Value::Bool(c1))];
            assert_relative_eq!(
                rebuilt.prob_at(&at).unwrap().unwrap(),
                joint.prob_at(&at).unwrap().unwrap(),
                epsilon = 1e-12
            );
        }
    }
}

#[test]
fn test_log_representation_agrees() {
    let c0 = coin("c0", 0.7).rescaled(PType::LOG).unwrap();
    let c1 = coin("c1", 0.4).rescaled(PType::LOG).unwrap();
    let joint = product(&[&c0, &c1]).unwrap();
    assert!(joint.ptype().is_log());
    assert_eq!(joint.to_string(), "logp(c0,c1)");
    let p = joint.prob_at(&[heads("c0"), heads("c1")]).unwrap().unwrap();
    assert_relative_eq!(p, 0.28, epsilon = 1e-12);
}

#[test]
fn test_off_support_evaluation_is_undefined() {
    let point = coins().evaluate(&[("c0", Value::Int(7))]).unwrap();
    assert!(point.prob().is_none());
    assert_eq!(point.name(), "c0=7,c1");
}

proptest! {
    #[test]
    fn prop_conditionalise_normalises(
        weights in proptest::collection::vec(1e-3f64..10.0, 6)
    ) {
        let mut vars = IndexMap::new();
        vars.insert("x".to_string(), Support::array([0, 1], 0));
        vars.insert("y".to_string(), Support::array([0, 1, 2], 1));
        let prob = ndarray::Array::from_shape_vec((2, 3), weights).unwrap().into_dyn();
        let joint = Distribution::new(parse_partition("x,y").unwrap(), vars, Some(prob), PType::IDENTITY).unwrap();

        let cond = joint.conditionalise(&["x"]).unwrap();
        let y_axis = cond.axis("y").unwrap().index().unwrap();
        let sums = cond.prob().unwrap().sum_axis(ArrayAxis(y_axis));
        for s in sums.iter() {
            prop_assert!((s - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn prop_conditionalise_past_conditional_axis_normalises(
        weights in proptest::collection::vec(1e-3f64..10.0, 12)
    ) {
        let mut vars = IndexMap::new();
        vars.insert("z".to_string(), Support::array([false, true], 0));
        vars.insert("a".to_string(), Support::array([0, 1], 1));
        vars.insert("b".to_string(), Support::array([0, 1, 2], 2));
        let raw = ndarray::Array::from_shape_vec((2, 2, 3), weights).unwrap();
        let prob = raw.clone().into_dyn();
        let joint = Distribution::new(parse_partition("a,b|z").unwrap(), vars, Some(prob), PType::IDENTITY).unwrap();

        let cond = joint.conditionalise(&["a"]).unwrap();
        prop_assert_eq!(cond.name(), "b|z,a");
        for z in [false, true] {
            for a in 0..2i64 {
                let slice = cond.evaluate(&[("z", Value::Bool(z)), ("a", Value::Int(a))]).unwrap();
                let total: f64 = slice.prob().unwrap().sum();
                prop_assert!((total - 1.0).abs() < 1e-9);

                let zi = usize::from(z);
                let ai = a as usize;
                let denom: f64 = (0..3).map(|b| raw[[zi, ai, b]]).sum();
                let p = slice.prob_at(&[("b", Value::Int(2))]).unwrap().unwrap();
                prop_assert!((p - raw[[zi, ai, 2]] / denom).abs() < 1e-9);
            }
        }
    }
}
