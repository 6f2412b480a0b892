//! Parameter learning
//!
//! An `Estimator` computes parameters in closed form from complete data. A `ParameterLearner`
//! fits the parameters of a fixed structure, possibly with latent variables, and scores the
//! result; it is the unit the structure search drivers are parameterized with.

use crate::data::DiscreteData;
use crate::factor::Assignment;
use crate::graph::NodeId;
use crate::learning::LearningResult;
use crate::model::DiscreteBayesNet;
use crate::score::ScoreType;
use crate::util::{Result, StrataError};

mod em;
mod mle;
mod vbem;

pub use self::em::{Em, EmConfig, EmInitialization, LocalEm};
pub use self::mle::{initialize_empty, LocalMLEstimator, MleLearner, ModelMLEstimator};
pub use self::vbem::{Vbem, VbemConfig};


/// A trait that represents the ability to estimate the parameters of some model (be it a whole
/// network or just a local CPD) from a dataset
pub trait Estimator<T> {

    /// Estimate the value of the parameters from the given dataset
    fn estimate(&mut self, data: &DiscreteData) -> Result<T>;

}


/// Fits the parameters of a network whose structure is kept fixed
pub trait ParameterLearner: Send + Sync {

    /// Learn parameters for a copy of `net`. The input network provides the structure and the
    /// starting point.
    fn learn_model(&self, net: &DiscreteBayesNet, data: &DiscreteData) -> Result<LearningResult>;

    /// The score the learner reports
    fn score_type(&self) -> ScoreType;

    /// Smallest score improvement the learner treats as progress
    fn threshold(&self) -> f64;

}


/// Restrict `data` to the manifest variables of `net` and map its columns to nodes
///
/// # Errors
/// * `StrataError::UnknownVariable` if a manifest variable is not a column of `data`
/// * `StrataError::InvalidData` if a column disagrees with the network on a cardinality
pub(crate) fn manifest_view(net: &DiscreteBayesNet, data: &DiscreteData) -> Result<(DiscreteData, Vec<NodeId>)> {
    let names: Vec<&str> = net.manifest_nodes().into_iter().filter_map(|id| net.name(id)).collect();
    let projected = data.project(&names)?;

    let columns = projected.variables()
                           .iter()
                           .map(|v| {
                               let id = net.lookup(v.name()).ok_or_else(|| StrataError::UnknownVariable(String::from(v.name())))?;
                               if net.cardinality(id)? != v.cardinality() {
                                   return Err(StrataError::InvalidData(
                                       format!("{} has {} states in the data", v.name(), v.cardinality())
                                   ));
                               }
                               Ok(id)
                           })
                           .collect::<Result<Vec<NodeId>>>()?;

    Ok((projected, columns))
}


/// The observed values of a row as evidence
pub(crate) fn row_evidence(columns: &[NodeId], row: &[Option<usize>]) -> Assignment {
    let mut evidence = Assignment::new();
    for (&id, value) in columns.iter().zip(row.iter()) {
        if let Some(state) = *value {
            evidence.set(id, state);
        }
    }
    evidence
}
