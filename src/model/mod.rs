//! Defines the discrete Bayesian network, a directed graphical model representing the
//! factorization of a probability distribution P over manifest and latent variables.

mod directed;

pub use self::directed::{BeliefNode, DiscreteBayesNet, DiscreteBayesNetBuilder};
