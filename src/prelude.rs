//! A prelude of the traits needed to drive imports and inspect results.

pub use crate::io::ImportMethod;
pub use crate::params::{ParamDescribed, ParamLike};
