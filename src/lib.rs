//! Gradient boosted trees whose leaves are linear models.
//!
//! The records have two kinds of features. The interpolating features only decide in which leaf a
//! record falls. The bridge features, usually functions of time, are the basis of the linear model
//! stored in every leaf, so a model can continue a trend outside of the training range.

#[macro_use]
extern crate serde_derive;

mod basis;
mod booster;
mod data;
mod dispatch;
mod error;
mod handles;
mod losses;
mod math;
mod matrix;
mod scan;
mod split;
mod stats;
mod tree;

pub use crate::basis::*;
pub use crate::booster::*;
pub use crate::data::*;
pub use crate::error::*;
pub use crate::handles::*;
pub use crate::losses::*;
pub use crate::math::*;
pub use crate::matrix::*;
pub use crate::tree::*;

pub(crate) static DEFAULT_LAMBDA: f64 = 1e-4;
pub(crate) static DEFAULT_LEARNING_RATE: f64 = 0.3;
pub(crate) static DEFAULT_MAX_DEPTH: usize = 3;
pub(crate) static DEFAULT_MIN_ROWS: usize = 5;
pub(crate) static DEFAULT_N_STAGES: usize = 10;
pub(crate) static DEFAULT_N_THREADS: usize = 1;
pub(crate) static DEFAULT_UNBALANCE_PENALTY: f64 = 0.;
