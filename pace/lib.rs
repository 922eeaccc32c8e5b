#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Self-paced curriculum learning: regressors that pick which training rows to fit on, round
//! by round, plus the group-aware SPLD selection rule.

pub mod config;
pub mod data;
pub mod estimate;
pub mod linear;
pub mod logistic;
pub mod numeric;
pub mod spld;
pub mod split;
