//! Learning discrete Bayesian networks with latent variables.
//!
//! `strata` fits the parameters of discrete Bayesian networks with MLE, EM and variational
//! Bayes, and learns their structure by hill climbing, structural EM and incremental
//! introduction of latent variables.

pub mod util;
pub mod variable;
pub mod graph;
pub mod factor;
pub mod init;
pub mod data;
pub mod model;
pub mod inference;
pub mod samplers;
pub mod score;
pub mod learning;
pub mod information;
pub mod estimators;
pub mod search;

pub use util::{Result, StrataError};
