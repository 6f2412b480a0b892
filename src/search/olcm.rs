//! Hill climbing over overlapping latent class models: latent variables are roots, manifest
//! variables are their children and a manifest variable may have several latent parents.
//!
//! The search alternates an expansion phase and a simplification phase. Each phase applies its
//! operators in turn to the best model so far, keeping any strict improvement, and repeats until
//! a full pass improves nothing. The cardinality operators of `global` complete the operator set.

use crate::data::DiscreteData;
use crate::estimators::ParameterLearner;
use crate::graph::NodeId;
use crate::learning::LearningResult;
use crate::model::DiscreteBayesNet;
use crate::util::{invalid_config, Result};
use crate::variable::Variable;
use super::latent::fresh_latent_name;
use super::{best_of, GlobalOperator};

use itertools::Itertools;
use log::{debug, info};

use std::collections::HashSet;


/// Add a latent -> manifest edge, for manifest variables outside the blacklist
#[derive(Clone, Debug, Default)]
pub struct AddOlcmArc {
    pub blacklist: HashSet<String>
}


impl GlobalOperator for AddOlcmArc {

    fn name(&self) -> &str {
        "AddOlcmArc"
    }

    fn apply(&self, seed: &DiscreteBayesNet, data: &DiscreteData, learner: &dyn ParameterLearner) -> Result<LearningResult> {
        let manifest: Vec<NodeId> = seed.manifest_nodes()
                                        .into_iter()
                                        .filter(|&m| seed.name(m).map_or(false, |n| !self.blacklist.contains(n)))
                                        .collect();

        let candidates: Vec<(NodeId, NodeId)> = seed.latent_nodes()
                                                    .into_iter()
                                                    .cartesian_product(manifest)
                                                    .filter(|&(l, m)| !seed.contains_edge(m, l) && seed.is_edge_allowed(m, l))
                                                    .collect();

        best_of(candidates, self.name(), learner.score_type(), |(latent, child)| {
            let mut net = seed.clone();
            net.add_edge(child, latent)?;
            learner.learn_model(&net, data)
        })
    }

}


/// Give two manifest variables without a common parent a new latent parent
#[derive(Clone, Debug)]
pub struct AddOlcmNode {
    cardinality: usize
}


impl AddOlcmNode {

    /// # Errors
    /// * `StrataError::InvalidConfiguration` for a cardinality below 2
    pub fn new(cardinality: usize) -> Result<Self> {
        if cardinality < 2 {
            return invalid_config("latent variables have at least 2 states");
        }
        Ok(AddOlcmNode { cardinality })
    }

}


impl Default for AddOlcmNode {
    fn default() -> Self {
        AddOlcmNode { cardinality: 2 }
    }
}


impl GlobalOperator for AddOlcmNode {

    fn name(&self) -> &str {
        "AddOlcmNode"
    }

    fn apply(&self, seed: &DiscreteBayesNet, data: &DiscreteData, learner: &dyn ParameterLearner) -> Result<LearningResult> {
        let variable = Variable::latent(&fresh_latent_name(seed), self.cardinality)?;
        let candidates: Vec<(NodeId, NodeId)> = seed.manifest_nodes()
                                                    .into_iter()
                                                    .tuple_combinations()
                                                    .filter(|&(a, b)| !seed.parents(a).iter().any(|p| seed.parents(b).contains(p)))
                                                    .collect();

        best_of(candidates, self.name(), learner.score_type(), |(a, b)| {
            let mut net = seed.clone();
            let parent = net.add_node(variable.clone())?;
            net.add_edge(a, parent)?;
            net.add_edge(b, parent)?;
            learner.learn_model(&net, data)
        })
    }

}


/// Remove one latent -> child edge
#[derive(Clone, Debug, Default)]
pub struct RemoveOlcmArc;


impl GlobalOperator for RemoveOlcmArc {

    fn name(&self) -> &str {
        "RemoveOlcmArc"
    }

    fn apply(&self, seed: &DiscreteBayesNet, data: &DiscreteData, learner: &dyn ParameterLearner) -> Result<LearningResult> {
        let candidates: Vec<_> = seed.edges()
                                     .into_iter()
                                     .filter(|e| seed.variable(e.tail).map_or(false, |v| v.is_latent()))
                                     .collect();

        best_of(candidates, self.name(), learner.score_type(), |e| {
            let mut net = seed.clone();
            net.remove_edge(e.head, e.tail)?;
            learner.learn_model(&net, data)
        })
    }

}


/// Remove one latent variable. Its former children may then be adopted by the remaining latent
/// variables through an inner search that only adds latent -> manifest edges to them.
#[derive(Clone, Debug)]
pub struct RemoveOlcmNode {
    pub max_iterations: usize,
    pub threshold: f64
}


impl Default for RemoveOlcmNode {
    fn default() -> Self {
        RemoveOlcmNode { max_iterations: 400, threshold: 0.5 }
    }
}


impl GlobalOperator for RemoveOlcmNode {

    fn name(&self) -> &str {
        "RemoveOlcmNode"
    }

    fn apply(&self, seed: &DiscreteBayesNet, data: &DiscreteData, learner: &dyn ParameterLearner) -> Result<LearningResult> {
        best_of(seed.latent_nodes(), self.name(), learner.score_type(), |id| {
            let orphans: Vec<NodeId> = seed.children(id).to_vec();
            let blacklist: HashSet<String> = seed.manifest_nodes()
                                                 .into_iter()
                                                 .filter(|m| !orphans.contains(m))
                                                 .filter_map(|m| seed.name(m).map(String::from))
                                                 .collect();

            let mut net = seed.clone();
            net.remove_node(id)?;

            let adoption = OlcmHillClimbing::new(
                vec![Box::new(AddOlcmArc { blacklist })],
                Vec::new(),
                self.max_iterations,
                self.threshold
            )?;
            adoption.learn_model(&net, data, learner)
        })
    }

}


/// Two phase hill climbing: expand while the expansion gains at least `threshold`, then
/// simplify while the simplification does.
pub struct OlcmHillClimbing {
    expansion: Vec<Box<dyn GlobalOperator>>,
    simplification: Vec<Box<dyn GlobalOperator>>,
    max_iterations: usize,
    threshold: f64
}


impl OlcmHillClimbing {

    /// The simplification operators may be empty.
    ///
    /// # Errors
    /// * `StrataError::InvalidConfiguration` for no expansion operator, zero iterations or a
    ///   negative threshold
    pub fn new(
        expansion: Vec<Box<dyn GlobalOperator>>,
        simplification: Vec<Box<dyn GlobalOperator>>,
        max_iterations: usize,
        threshold: f64
    ) -> Result<Self> {
        if expansion.is_empty() {
            return invalid_config("the expansion phase needs at least one operator");
        }
        if max_iterations == 0 {
            return invalid_config("hill climbing needs at least one iteration");
        }
        if !(threshold >= 0.0) {
            return invalid_config("the hill climbing threshold must be nonnegative");
        }

        Ok(OlcmHillClimbing { expansion, simplification, max_iterations, threshold })
    }

    /// Apply `operators` to the running best until a pass over all of them improves nothing
    fn phase(
        &self,
        operators: &[Box<dyn GlobalOperator>],
        start: LearningResult,
        data: &DiscreteData,
        learner: &dyn ParameterLearner
    ) -> Result<LearningResult> {
        let mut best = start;
        loop {
            let previous = best.score();
            for op in operators.iter() {
                let proposal = match best.model() {
                    Some(net) => op.apply(net, data, learner)?,
                    None => return Ok(best)
                };

                if proposal.score() > best.score() {
                    debug!("{}", proposal);
                    best = proposal;
                }
            }

            if !(best.score() > previous) {
                return Ok(best);
            }
        }
    }

    /// Search from `seed`, first refitted by `learner`
    pub fn learn_model(&self, seed: &DiscreteBayesNet, data: &DiscreteData, learner: &dyn ParameterLearner) -> Result<LearningResult> {
        let mut current = learner.learn_model(seed, data)?;
        let mut history = vec![current.score()];
        info!("OLCM hill climbing starts at {}", current);

        for iteration in 0..self.max_iterations {
            let expanded = self.phase(&self.expansion, current.clone(), data, learner)?;
            let gain = expanded.score() - current.score();
            if gain <= 0.0 || gain < self.threshold {
                debug!("Expansion gained {:.4} after {} iterations", gain, iteration);
                break;
            }
            history.push(expanded.score());
            info!("Iteration {}: expanded to {}", iteration + 1, expanded);

            let simplified = self.phase(&self.simplification, expanded.clone(), data, learner)?;
            let gain = simplified.score() - expanded.score();
            if gain <= 0.0 || gain < self.threshold {
                debug!("Simplification gained {:.4}", gain);
                current = expanded;
                break;
            }
            history.push(simplified.score());
            info!("Iteration {}: simplified to {}", iteration + 1, simplified);
            current = simplified;
        }

        Ok(current.with_name("OlcmHillClimbing").with_history(history))
    }

}
