//! Probability-distribution algebra for probayes.
//!
//! This crate hosts the realised-distribution layer used by random variables
//! and stochastic junctions:
//! - representation tags and linear/log conversion (`ptypes`)
//! - the marginal/conditional name algebra (`partition`)
//! - distributions and their structural operations (`dist`)
//! - products and concatenation of distributions (`dist_ops`)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dist;
pub mod dist_ops;
pub mod math;
pub mod partition;
pub mod ptypes;
pub mod support;

pub use dist::Distribution;
pub use dist_ops::{product, product_with, sum_dist};
pub use partition::{Partition, bare_key, bare_keys, format_name, parse_partition};
pub use pb_core::{Axis, DistributionAlgebra, Error, Result, Value};
pub use ptypes::{NumericLimits, PType, combine_tags, from_log, prod_prob, rescale, to_log};
pub use support::{Support, VarValues};
