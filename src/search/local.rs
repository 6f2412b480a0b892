//! Hill climbing over complete data with decomposable scores.
//!
//! Local operators score a candidate edge change by recomputing only the families it touches
//! against a cache of per-node scores, so every candidate costs one or two family counts.

use crate::data::DiscreteData;
use crate::estimators::{Estimator, LocalMLEstimator, ModelMLEstimator};
use crate::graph::NodeId;
use crate::learning::{LearningResult, LocalOperation, OperationKind};
use crate::model::DiscreteBayesNet;
use crate::score::{family_names, local_score, net_scores, ScoreType};
use crate::util::{invalid_config, Result, StrataError};
use super::{SearchConstraints, StructureType};

use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, info};
use rayon::prelude::*;

use std::cmp::Ordering;

/// An edge operator for complete data
pub trait LocalOperator: Send + Sync {

    fn name(&self) -> &str;

    /// Every admissible change of `net`, scored as the network score after the change given the
    /// cached per-node `scores`. Candidates come in a deterministic order.
    fn apply(
        &self,
        net: &DiscreteBayesNet,
        data: &DiscreteData,
        scores: &IndexMap<NodeId, f64>,
        score_type: ScoreType
    ) -> Result<Vec<LocalOperation>>;

}


/// Score of `id` with its current parents, plus `extra` and minus `without`
fn family_score(
    net: &DiscreteBayesNet,
    data: &DiscreteData,
    id: NodeId,
    extra: Option<NodeId>,
    without: Option<NodeId>,
    score_type: ScoreType
) -> Result<f64> {
    let mut family: Vec<NodeId> = net.family(id).into_iter().filter(|&v| Some(v) != without).collect();
    if let Some(e) = extra {
        family.push(e);
    }

    let names = family_names(net, &family)?;
    let name = net.name(id).ok_or(StrataError::NodeNotFound)?;
    local_score(data, name, &names, score_type)
}


fn cached(scores: &IndexMap<NodeId, f64>, id: NodeId) -> Result<f64> {
    scores.get(&id).cloned().ok_or(StrataError::NodeNotFound)
}


/// Propose every admissible new edge `tail -> head`
#[derive(Clone, Debug, Default)]
pub struct LocalAddArc {
    pub constraints: SearchConstraints
}


impl LocalAddArc {
    pub fn new(constraints: SearchConstraints) -> Self {
        LocalAddArc { constraints }
    }
}


impl LocalOperator for LocalAddArc {

    fn name(&self) -> &str {
        "LocalAddArc"
    }

    fn apply(&self, net: &DiscreteBayesNet, data: &DiscreteData, scores: &IndexMap<NodeId, f64>, score_type: ScoreType) -> Result<Vec<LocalOperation>> {
        let total: f64 = scores.values().sum();
        let ids: Vec<NodeId> = net.node_ids().collect();

        let pairs: Vec<(NodeId, NodeId)> = ids.iter()
                                              .cartesian_product(ids.iter())
                                              .filter(|&(h, t)| h != t && self.constraints.admits_addition(net, *t, *h))
                                              .map(|(&h, &t)| (h, t))
                                              .collect();

        pairs.par_iter()
             .map(|&(head, tail)| {
                 let s = family_score(net, data, head, Some(tail), None, score_type)?;
                 Ok(LocalOperation { head, tail, score: total - cached(scores, head)? + s, kind: OperationKind::Add })
             })
             .collect()
    }

}


/// Propose the deletion of every edge not protected by the constraints
#[derive(Clone, Debug, Default)]
pub struct LocalDeleteArc {
    pub constraints: SearchConstraints
}


impl LocalDeleteArc {
    pub fn new(constraints: SearchConstraints) -> Self {
        LocalDeleteArc { constraints }
    }
}


impl LocalOperator for LocalDeleteArc {

    fn name(&self) -> &str {
        "LocalDeleteArc"
    }

    fn apply(&self, net: &DiscreteBayesNet, data: &DiscreteData, scores: &IndexMap<NodeId, f64>, score_type: ScoreType) -> Result<Vec<LocalOperation>> {
        let total: f64 = scores.values().sum();

        net.edges()
           .into_iter()
           .filter(|e| self.constraints.admits_removal(net, e.tail, e.head))
           .map(|e| {
               let s = family_score(net, data, e.head, None, Some(e.tail), score_type)?;
               Ok(LocalOperation { head: e.head, tail: e.tail, score: total - cached(scores, e.head)? + s, kind: OperationKind::Delete })
           })
           .collect()
    }

}


/// Propose turning around every edge whose reversal keeps the graph acyclic. Both endpoint
/// families change.
#[derive(Clone, Debug, Default)]
pub struct LocalReverseArc {
    pub constraints: SearchConstraints
}


impl LocalReverseArc {
    pub fn new(constraints: SearchConstraints) -> Self {
        LocalReverseArc { constraints }
    }
}


impl LocalOperator for LocalReverseArc {

    fn name(&self) -> &str {
        "LocalReverseArc"
    }

    fn apply(&self, net: &DiscreteBayesNet, data: &DiscreteData, scores: &IndexMap<NodeId, f64>, score_type: ScoreType) -> Result<Vec<LocalOperation>> {
        let total: f64 = scores.values().sum();

        net.edges()
           .into_iter()
           .filter(|e| self.constraints.admits_reversal(net, e.tail, e.head))
           .map(|e| {
               let head = family_score(net, data, e.head, None, Some(e.tail), score_type)?;
               let tail = family_score(net, data, e.tail, Some(e.head), None, score_type)?;
               let before = cached(scores, e.head)? + cached(scores, e.tail)?;
               Ok(LocalOperation { head: e.head, tail: e.tail, score: total - before + head + tail, kind: OperationKind::Reverse })
           })
           .collect()
    }

}


/// Carry out a change on `net`, returning the nodes whose families changed
pub(crate) fn apply_operation(net: &mut DiscreteBayesNet, op: &LocalOperation) -> Result<Vec<NodeId>> {
    match op.kind {
        OperationKind::Add => {
            net.add_edge(op.head, op.tail)?;
            Ok(vec![op.head])
        },
        OperationKind::Delete => {
            net.remove_edge(op.head, op.tail)?;
            Ok(vec![op.head])
        },
        OperationKind::Reverse => {
            net.reverse_edge(op.head, op.tail)?;
            Ok(vec![op.head, op.tail])
        }
    }
}


/// Greedy structure search on complete data.
///
/// Every node of the network must be a column of the data. Each iteration asks every operator
/// for its candidates, keeps for each operator the best one yielding an allowed structure and
/// applies the best of those if it improves the score by more than the threshold.
pub struct LocalHillClimbing {
    operators: Vec<Box<dyn LocalOperator>>,
    max_iterations: usize,
    threshold: f64,
    score_type: ScoreType,
    structure_type: StructureType
}


impl LocalHillClimbing {

    /// # Errors
    /// * `StrataError::InvalidConfiguration` for an empty operator set, zero iterations, a
    ///   negative threshold or a score that needs latent variables
    pub fn new(
        operators: Vec<Box<dyn LocalOperator>>,
        max_iterations: usize,
        threshold: f64,
        score_type: ScoreType,
        structure_type: StructureType
    ) -> Result<Self> {
        if operators.is_empty() {
            return invalid_config("hill climbing needs at least one operator");
        }
        if max_iterations == 0 {
            return invalid_config("hill climbing needs at least one iteration");
        }
        if !(threshold >= 0.0) {
            return invalid_config("the hill climbing threshold must be nonnegative");
        }
        if score_type == ScoreType::Elbo {
            return invalid_config("local scores have no evidence lower bound");
        }

        Ok(LocalHillClimbing { operators, max_iterations, threshold, score_type, structure_type })
    }

    /// Add, delete and reverse under the same constraints
    pub fn with_constraints(
        constraints: SearchConstraints,
        max_iterations: usize,
        threshold: f64,
        score_type: ScoreType,
        structure_type: StructureType
    ) -> Result<Self> {
        let operators: Vec<Box<dyn LocalOperator>> = vec![
            Box::new(LocalAddArc::new(constraints.clone())),
            Box::new(LocalDeleteArc::new(constraints.clone())),
            Box::new(LocalReverseArc::new(constraints))
        ];
        Self::new(operators, max_iterations, threshold, score_type, structure_type)
    }

    pub fn score_type(&self) -> ScoreType {
        self.score_type
    }

    /// The best candidate of `candidates` whose structure is allowed, the earliest among equals
    fn first_allowed(&self, net: &DiscreteBayesNet, mut candidates: Vec<LocalOperation>) -> Result<Option<LocalOperation>> {
        // stable, so equal scores keep the operator's order
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        for c in candidates {
            if self.structure_type == StructureType::Dag {
                return Ok(Some(c));
            }

            let mut trial = net.clone();
            apply_operation(&mut trial, &c)?;
            if self.structure_type.allows(trial.dag()) {
                return Ok(Some(c));
            }
        }

        Ok(None)
    }

    /// Search from `seed`, whose parameters are replaced by their maximum likelihood estimates
    ///
    /// # Errors
    /// * `StrataError::UnknownVariable` if a node is not a column of `data`
    /// * `StrataError::InvalidData` if `data` has missing values
    pub fn learn_model(&self, seed: &DiscreteBayesNet, data: &DiscreteData) -> Result<LearningResult> {
        let mut net = ModelMLEstimator::new(seed)?.estimate(data)?;
        let mut scores = net_scores(&net, data, self.score_type)?;
        let mut current: f64 = scores.values().sum();
        let mut history = vec![current];
        info!("Local hill climbing starts at {:.4}", current);

        for iteration in 0..self.max_iterations {
            let mut best: Option<LocalOperation> = None;
            for op in self.operators.iter() {
                let candidates = op.apply(&net, data, &scores, self.score_type)?;
                if let Some(c) = self.first_allowed(&net, candidates)? {
                    debug!("{} proposes {:?} {} -> {} at {:.4}", op.name(), c.kind, c.tail, c.head, c.score);
                    if best.map_or(true, |b| c.score > b.score) {
                        best = Some(c);
                    }
                }
            }

            let best = match best {
                Some(b) if b.score - current > self.threshold => b,
                _ => {
                    debug!("No improving change after {} iterations", iteration);
                    break;
                }
            };

            for id in apply_operation(&mut net, &best)? {
                let cpt = LocalMLEstimator::new(&net, id)?.estimate(data)?;
                net.set_cpt(id, cpt)?;
                scores.insert(id, family_score(&net, data, id, None, None, self.score_type)?);
            }

            current = scores.values().sum();
            history.push(current);
            info!("Iteration {}: {:?} {} -> {}, score {:.4}", iteration + 1, best.kind, best.tail, best.head, current);
        }

        Ok(LearningResult::new(net, current, self.score_type, "LocalHillClimbing").with_history(history))
    }

}
