//! Hill climbing where every candidate structure is refitted by a `ParameterLearner`.
//!
//! Slower than the local search but works with latent variables and missing values, since the
//! learner scores the whole network.

use crate::data::DiscreteData;
use crate::estimators::ParameterLearner;
use crate::graph::NodeId;
use crate::learning::LearningResult;
use crate::model::DiscreteBayesNet;
use crate::util::{invalid_config, Result};
use super::{best_of, SearchConstraints};

use itertools::Itertools;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// A structural change refitted by a parameter learner
pub trait GlobalOperator: Send + Sync {

    fn name(&self) -> &str;

    /// The best refitted neighbour of `seed`, or a degenerate result when no change is
    /// admissible. `seed` is never modified.
    fn apply(&self, seed: &DiscreteBayesNet, data: &DiscreteData, learner: &dyn ParameterLearner) -> Result<LearningResult>;

}


/// Add the edge with the best refitted score
#[derive(Clone, Debug, Default)]
pub struct AddArc {
    pub constraints: SearchConstraints
}


impl GlobalOperator for AddArc {

    fn name(&self) -> &str {
        "AddArc"
    }

    fn apply(&self, seed: &DiscreteBayesNet, data: &DiscreteData, learner: &dyn ParameterLearner) -> Result<LearningResult> {
        let ids: Vec<NodeId> = seed.node_ids().collect();
        let candidates: Vec<(NodeId, NodeId)> = ids.iter()
                                                   .cartesian_product(ids.iter())
                                                   .filter(|&(h, t)| h != t && self.constraints.admits_addition(seed, *t, *h))
                                                   .map(|(&h, &t)| (h, t))
                                                   .collect();

        best_of(candidates, self.name(), learner.score_type(), |(head, tail)| {
            let mut net = seed.clone();
            net.add_edge(head, tail)?;
            learner.learn_model(&net, data)
        })
    }

}


#[derive(Clone, Debug, Default)]
pub struct DeleteArc {
    pub constraints: SearchConstraints
}


impl GlobalOperator for DeleteArc {

    fn name(&self) -> &str {
        "DeleteArc"
    }

    fn apply(&self, seed: &DiscreteBayesNet, data: &DiscreteData, learner: &dyn ParameterLearner) -> Result<LearningResult> {
        let candidates: Vec<_> = seed.edges()
                                     .into_iter()
                                     .filter(|e| self.constraints.admits_removal(seed, e.tail, e.head))
                                     .collect();

        best_of(candidates, self.name(), learner.score_type(), |e| {
            let mut net = seed.clone();
            net.remove_edge(e.head, e.tail)?;
            learner.learn_model(&net, data)
        })
    }

}


#[derive(Clone, Debug, Default)]
pub struct ReverseArc {
    pub constraints: SearchConstraints
}


impl GlobalOperator for ReverseArc {

    fn name(&self) -> &str {
        "ReverseArc"
    }

    fn apply(&self, seed: &DiscreteBayesNet, data: &DiscreteData, learner: &dyn ParameterLearner) -> Result<LearningResult> {
        let candidates: Vec<_> = seed.edges()
                                     .into_iter()
                                     .filter(|e| self.constraints.admits_reversal(seed, e.tail, e.head))
                                     .collect();

        best_of(candidates, self.name(), learner.score_type(), |e| {
            let mut net = seed.clone();
            net.reverse_edge(e.head, e.tail)?;
            learner.learn_model(&net, data)
        })
    }

}


/// Give one latent variable, below `max` states, an extra state. Candidate `i` draws its new
/// parameters from `seed + i`.
#[derive(Clone, Debug)]
pub struct IncreaseLatentCardinality {
    max: usize,
    seed: u64
}


impl IncreaseLatentCardinality {

    /// # Errors
    /// * `StrataError::InvalidConfiguration` if `max` is below 2
    pub fn new(max: usize, seed: u64) -> Result<Self> {
        if max < 2 {
            return invalid_config("latent variables have at least 2 states");
        }
        Ok(IncreaseLatentCardinality { max, seed })
    }

}


impl GlobalOperator for IncreaseLatentCardinality {

    fn name(&self) -> &str {
        "IncreaseLatentCardinality"
    }

    fn apply(&self, seed: &DiscreteBayesNet, data: &DiscreteData, learner: &dyn ParameterLearner) -> Result<LearningResult> {
        let candidates = seed.latent_nodes()
                             .into_iter()
                             .filter(|&id| seed.cardinality(id).map_or(false, |c| c < self.max))
                             .enumerate()
                             .collect::<Vec<(usize, NodeId)>>();

        best_of(candidates, self.name(), learner.score_type(), |(i, id)| {
            let mut net = seed.clone();
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(i as u64));
            net.increase_cardinality(id, 1, &mut rng)?;
            learner.learn_model(&net, data)
        })
    }

}


/// Take a state away from one latent variable above `min` states
#[derive(Clone, Debug)]
pub struct DecreaseLatentCardinality {
    min: usize,
    seed: u64
}


impl DecreaseLatentCardinality {

    /// # Errors
    /// * `StrataError::InvalidConfiguration` if `min` is below 2
    pub fn new(min: usize, seed: u64) -> Result<Self> {
        if min < 2 {
            return invalid_config("latent variables have at least 2 states");
        }
        Ok(DecreaseLatentCardinality { min, seed })
    }

}


impl GlobalOperator for DecreaseLatentCardinality {

    fn name(&self) -> &str {
        "DecreaseLatentCardinality"
    }

    fn apply(&self, seed: &DiscreteBayesNet, data: &DiscreteData, learner: &dyn ParameterLearner) -> Result<LearningResult> {
        let candidates = seed.latent_nodes()
                             .into_iter()
                             .filter(|&id| seed.cardinality(id).map_or(false, |c| c > self.min))
                             .enumerate()
                             .collect::<Vec<(usize, NodeId)>>();

        best_of(candidates, self.name(), learner.score_type(), |(i, id)| {
            let mut net = seed.clone();
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(i as u64));
            net.decrease_cardinality(id, 1, &mut rng)?;
            learner.learn_model(&net, data)
        })
    }

}


/// Greedy search where each iteration keeps the best refitted proposal of all operators
pub struct GlobalHillClimbing {
    operators: Vec<Box<dyn GlobalOperator>>,
    max_iterations: usize,
    threshold: f64
}


impl GlobalHillClimbing {

    /// # Errors
    /// * `StrataError::InvalidConfiguration` for an empty operator set, zero iterations or a
    ///   negative threshold
    pub fn new(operators: Vec<Box<dyn GlobalOperator>>, max_iterations: usize, threshold: f64) -> Result<Self> {
        if operators.is_empty() {
            return invalid_config("hill climbing needs at least one operator");
        }
        if max_iterations == 0 {
            return invalid_config("hill climbing needs at least one iteration");
        }
        if !(threshold >= 0.0) {
            return invalid_config("the hill climbing threshold must be nonnegative");
        }

        Ok(GlobalHillClimbing { operators, max_iterations, threshold })
    }

    /// Search from `seed`, first refitted by `learner`
    pub fn learn_model(&self, seed: &DiscreteBayesNet, data: &DiscreteData, learner: &dyn ParameterLearner) -> Result<LearningResult> {
        let mut current = learner.learn_model(seed, data)?;
        let mut history = vec![current.score()];
        info!("Global hill climbing starts at {}", current);

        for iteration in 0..self.max_iterations {
            let incumbent = match current.model() {
                Some(net) => net,
                None => break
            };

            let mut best: Option<LearningResult> = None;
            for op in self.operators.iter() {
                let proposal = op.apply(incumbent, data, learner)?;
                if proposal.is_degenerate() {
                    debug!("{} has nothing to propose", op.name());
                    continue;
                }

                debug!("{}", proposal);
                if best.as_ref().map_or(true, |b| proposal.score() > b.score()) {
                    best = Some(proposal);
                }
            }

            match best {
                Some(b) if b.score() - current.score() > self.threshold => {
                    history.push(b.score());
                    info!("Iteration {}: accepted {}", iteration + 1, b);
                    current = b;
                },
                _ => {
                    debug!("No improving proposal after {} iterations", iteration);
                    break;
                }
            }
        }

        Ok(current.with_name("GlobalHillClimbing").with_history(history))
    }

}
