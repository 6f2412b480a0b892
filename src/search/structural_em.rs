//! Structural EM for networks whose latent variables play the role of class variables.
//!
//! Each iteration completes the data with the most likely latent states under the current
//! model, searches the structure on the completed data with closed-form local scores and then
//! refits the parameters of the new structure with EM on the original data.

use crate::data::DiscreteData;
use crate::estimators::{Em, ParameterLearner};
use crate::learning::LearningResult;
use crate::model::DiscreteBayesNet;
use crate::score::ScoreType;
use crate::util::{invalid_config, Result};
use super::{complete_data, LatentCompletion, LocalHillClimbing, SearchConstraints, StructureType};

use log::{debug, info};

/// Structural EM driver. Manifest variables never become parents of latent ones; on top of
/// that the user constraints apply to every iteration.
#[derive(Clone, Debug)]
pub struct StructuralEm {
    em: Em,
    structure_type: StructureType,
    max_iterations: usize,
    max_parents: usize,
    constraints: SearchConstraints
}


impl StructuralEm {

    /// # Errors
    /// * `StrataError::InvalidConfiguration` for zero iterations or a zero parent cap
    pub fn new(
        em: Em,
        structure_type: StructureType,
        max_iterations: usize,
        max_parents: usize,
        constraints: SearchConstraints
    ) -> Result<Self> {
        if max_iterations == 0 {
            return invalid_config("structural EM needs at least one iteration");
        }
        if max_parents == 0 {
            return invalid_config("the parent cap must be positive");
        }

        Ok(StructuralEm { em, structure_type, max_iterations, max_parents, constraints })
    }

    pub fn em(&self) -> &Em {
        &self.em
    }

    pub fn score_type(&self) -> ScoreType {
        self.em.score_type()
    }

    /// Fit `seed` with EM, then refine its structure
    pub fn learn_model(&self, seed: &DiscreteBayesNet, data: &DiscreteData) -> Result<LearningResult> {
        let start = self.em.learn_model(seed, data)?;
        self.refine(start, data)
    }

    /// The constraints of a search around `net`
    fn constraints_for(&self, net: &DiscreteBayesNet) -> Result<SearchConstraints> {
        let names = |ids: Vec<_>| -> Vec<String> {
            ids.into_iter().filter_map(|id| net.name(id).map(String::from)).collect()
        };
        let manifest = names(net.manifest_nodes());
        let latent = names(net.latent_nodes());

        Ok(SearchConstraints::new()
            .with_forbidden_edges(&manifest, &latent)
            .with_max_parents(self.max_parents)?
            .merged(&self.constraints))
    }

    /// Refine an EM result whose model is already fitted to `data`. Degenerate inputs are
    /// returned unchanged.
    pub fn refine(&self, start: LearningResult, data: &DiscreteData) -> Result<LearningResult> {
        let mut current = start;
        let mut history = vec![current.score()];

        for iteration in 0..self.max_iterations {
            let net = match current.model() {
                Some(net) => net,
                None => return Ok(current)
            };

            let completed = complete_data(net, data, LatentCompletion::MostLikely)?;
            let hc = LocalHillClimbing::with_constraints(
                self.constraints_for(net)?,
                self.max_iterations,
                self.em.threshold(),
                self.em.score_type(),
                self.structure_type
            )?;

            let structure = hc.learn_model(net, &completed)?;
            let candidate = match structure.model() {
                Some(s) => self.em.learn_model(s, data)?,
                None => break
            };

            if candidate.score() - current.score() <= self.em.threshold() {
                debug!("Structural EM converged after {} iterations ({:.4})", iteration, candidate.score());
                break;
            }

            info!("Structural EM iteration {}: {:.4} -> {:.4}", iteration + 1, current.score(), candidate.score());
            history.push(candidate.score());
            current = candidate;
        }

        Ok(current.with_name("StructuralEM").with_history(history))
    }

}
