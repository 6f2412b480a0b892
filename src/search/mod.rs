//! Structure search
//!
//! Operators propose structural changes to a seed network without touching it: every candidate
//! is built on a private clone. Drivers keep an incumbent, ask their operators for proposals
//! and accept the best one only if it beats the incumbent by more than a threshold. An operator
//! that finds nothing to propose returns a degenerate `LearningResult`, which never wins.

use crate::data::DiscreteData;
use crate::factor::Assignment;
use crate::graph::{DirectedAcyclicGraph, NodeId};
use crate::inference::{ConditionalInferenceEngine, VariableEliminationEngine};
use crate::learning::LearningResult;
use crate::model::DiscreteBayesNet;
use crate::score::ScoreType;
use crate::util::{invalid_config, Result, StrataError};

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use std::collections::{HashMap, HashSet};

mod chow_liu;
mod global;
mod incremental;
mod latent;
mod local;
mod olcm;
mod structural_em;

pub use self::chow_liu::ChowLiu;
pub use self::global::{
    AddArc, DecreaseLatentCardinality, DeleteArc, GlobalHillClimbing, GlobalOperator,
    IncreaseLatentCardinality, ReverseArc
};
pub use self::incremental::{
    AddDiscreteNode, IncrementalAddArc, IncrementalLearner, IncrementalLearnerBuilder,
    IncrementalOperator, IncrementalProposal, LocalEmScope, LocalEmSettings, ProposalKind
};
pub use self::latent::{
    AddLatentNode, LatentDecreaseCardinality, LatentHillClimbing, LatentIncreaseCardinality,
    LatentOperator, RemoveLatentNode
};
pub use self::local::{LocalAddArc, LocalDeleteArc, LocalHillClimbing, LocalOperator, LocalReverseArc};
pub use self::olcm::{AddOlcmArc, AddOlcmNode, OlcmHillClimbing, RemoveOlcmArc, RemoveOlcmNode};
pub use self::structural_em::StructuralEm;


/// Domain constraints every operator honours. Built by value-returning combinators, never
/// mutated by the search.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchConstraints {

    /// Variables no edge may be added to, deleted from or reversed at
    node_blacklist: HashSet<String>,

    /// `tail -> heads` edges that must never be created, by adding or by reversing
    forbidden: HashMap<String, HashSet<String>>,

    /// `tail -> heads` edges that must never be deleted or reversed
    protected: HashMap<String, HashSet<String>>,

    max_parents: usize

}


impl Default for SearchConstraints {
    fn default() -> Self {
        SearchConstraints {
            node_blacklist: HashSet::new(),
            forbidden: HashMap::new(),
            protected: HashMap::new(),
            max_parents: usize::MAX
        }
    }
}


impl SearchConstraints {

    /// No constraints at all
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of parents any node may get
    ///
    /// # Errors
    /// * `StrataError::InvalidConfiguration` for a cap of zero
    pub fn with_max_parents(mut self, max_parents: usize) -> Result<Self> {
        if max_parents == 0 {
            return invalid_config("the parent cap must be positive");
        }
        self.max_parents = max_parents;
        Ok(self)
    }

    pub fn with_blacklisted_node(mut self, name: &str) -> Self {
        self.node_blacklist.insert(String::from(name));
        self
    }

    /// Forbid `tail -> head`
    pub fn with_forbidden_edge(mut self, tail: &str, head: &str) -> Self {
        self.forbidden.entry(String::from(tail)).or_default().insert(String::from(head));
        self
    }

    /// Forbid every `tail -> head` with `tail` in `tails` and `head` in `heads`
    pub fn with_forbidden_edges<S: AsRef<str>>(mut self, tails: &[S], heads: &[S]) -> Self {
        for t in tails {
            for h in heads {
                self = self.with_forbidden_edge(t.as_ref(), h.as_ref());
            }
        }
        self
    }

    /// Keep `tail -> head`, whenever present, out of reach of deletion and reversal
    pub fn with_protected_edge(mut self, tail: &str, head: &str) -> Self {
        self.protected.entry(String::from(tail)).or_default().insert(String::from(head));
        self
    }

    /// Both sets of constraints at once; the tighter parent cap wins
    pub fn merged(&self, other: &SearchConstraints) -> Self {
        let mut out = self.clone();
        out.node_blacklist.extend(other.node_blacklist.iter().cloned());
        for (t, hs) in other.forbidden.iter() {
            out.forbidden.entry(t.clone()).or_default().extend(hs.iter().cloned());
        }
        for (t, hs) in other.protected.iter() {
            out.protected.entry(t.clone()).or_default().extend(hs.iter().cloned());
        }
        out.max_parents = self.max_parents.min(other.max_parents);
        out
    }

    pub fn max_parents(&self) -> usize {
        self.max_parents
    }

    pub fn allows_node(&self, name: &str) -> bool {
        !self.node_blacklist.contains(name)
    }

    /// `tail -> head` may be created
    pub fn allows_edge(&self, tail: &str, head: &str) -> bool {
        self.allows_node(tail) && self.allows_node(head)
            && !self.forbidden.get(tail).map_or(false, |hs| hs.contains(head))
    }

    /// `tail -> head` may be deleted
    pub fn allows_removal(&self, tail: &str, head: &str) -> bool {
        self.allows_node(tail) && self.allows_node(head)
            && !self.protected.get(tail).map_or(false, |hs| hs.contains(head))
    }

    /// `tail -> head` may become `head -> tail`
    pub fn allows_reversal(&self, tail: &str, head: &str) -> bool {
        self.allows_removal(tail, head) && self.allows_edge(head, tail)
    }

    /// `tail -> head` may be added to `net`: the names pass the constraints, the graph stays
    /// acyclic and `head` stays under the parent cap
    pub(crate) fn admits_addition(&self, net: &DiscreteBayesNet, tail: NodeId, head: NodeId) -> bool {
        match (net.name(tail), net.name(head)) {
            (Some(t), Some(h)) => {
                self.allows_edge(t, h)
                    && net.is_edge_allowed(head, tail)
                    && net.parents(head).len() < self.max_parents
            },
            _ => false
        }
    }

    /// The existing `tail -> head` of `net` may be reversed
    pub(crate) fn admits_reversal(&self, net: &DiscreteBayesNet, tail: NodeId, head: NodeId) -> bool {
        match (net.name(tail), net.name(head)) {
            (Some(t), Some(h)) => {
                self.allows_reversal(t, h)
                    && net.is_reversal_allowed(head, tail)
                    && net.parents(tail).len() < self.max_parents
            },
            _ => false
        }
    }

    pub(crate) fn admits_removal(&self, net: &DiscreteBayesNet, tail: NodeId, head: NodeId) -> bool {
        match (net.name(tail), net.name(head)) {
            (Some(t), Some(h)) => self.allows_removal(t, h),
            _ => false
        }
    }

}


/// The shape of graph a search may produce
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StructureType {
    Dag,
    Tree,
    Forest,
    PolyTree,
    PolyForest
}


impl Default for StructureType {
    fn default() -> Self {
        StructureType::Dag
    }
}


impl StructureType {

    pub fn allows<T>(self, dag: &DirectedAcyclicGraph<T>) -> bool {
        match self {
            StructureType::Dag => true,
            StructureType::Tree => dag.is_tree(),
            StructureType::Forest => dag.is_forest(),
            StructureType::PolyTree => dag.is_polytree(),
            StructureType::PolyForest => dag.is_polyforest()
        }
    }

}


/// How values of latent variables are filled in for data completion
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LatentCompletion {
    /// The most probable joint state of the latent variables given the row
    MostLikely,

    /// A draw from the posterior of the latent variables given the row
    Sampled { seed: u64 }
}


impl Default for LatentCompletion {
    fn default() -> Self {
        LatentCompletion::MostLikely
    }
}


/// Append a column for every latent variable of `net` to `data`, filled per distinct row
/// according to `policy`. Data columns that are not part of the network are carried along.
///
/// # Errors
/// * `StrataError::DivideByZero` if a row has probability zero under `net`
pub fn complete_data(net: &DiscreteBayesNet, data: &DiscreteData, policy: LatentCompletion) -> Result<DiscreteData> {
    complete_variables(net, data, &net.latent_nodes(), policy)
}


/// Like `complete_data`, for the given variables only. The policy applies to their joint
/// posterior, so a single target is filled from its own marginal. Targets that already are data
/// columns are skipped.
///
/// # Errors
/// * `StrataError::NodeNotFound` if a target is not part of `net`
/// * `StrataError::DivideByZero` if a row has probability zero under `net`
pub fn complete_variables(net: &DiscreteBayesNet, data: &DiscreteData, targets: &[NodeId], policy: LatentCompletion) -> Result<DiscreteData> {
    let mut latent = Vec::with_capacity(targets.len());
    for &id in targets {
        let name = net.name(id).ok_or(StrataError::NodeNotFound)?;
        if data.index_of(name).is_none() && !latent.contains(&id) {
            latent.push(id);
        }
    }
    if latent.is_empty() {
        return Ok(data.clone());
    }

    // columns the network does not know about are carried along but never used as evidence
    let columns: Vec<Option<NodeId>> = data.variables().iter().map(|v| net.lookup(v.name())).collect();
    let mut rng = match policy {
        LatentCompletion::Sampled { seed } => Some(StdRng::seed_from_u64(seed)),
        LatentCompletion::MostLikely => None
    };

    let mut values = Vec::with_capacity(data.num_instances());
    for (row, _) in data.instances() {
        let mut evidence = Assignment::new();
        for (column, value) in columns.iter().zip(row.iter()) {
            if let (Some(id), Some(state)) = (*column, *value) {
                evidence.set(id, state);
            }
        }

        let mut engine = VariableEliminationEngine::new(net, &evidence)?;
        let posterior = engine.infer(&latent)?;

        let assignment = match rng.as_mut() {
            None => posterior.argmax(),
            Some(rng) => {
                let table = posterior.table().ok_or(StrataError::InvalidScope)?;
                let dist = WeightedIndex::new(table.iter()).map_err(|_| StrataError::DivideByZero)?;
                let flat = dist.sample(rng);

                let mut a = Assignment::new();
                let mut rest = flat;
                for (i, &v) in latent.iter().enumerate().rev() {
                    let card = table.shape()[i];
                    a.set(v, rest % card);
                    rest /= card;
                }
                a
            }
        };

        values.push(latent.iter()
                          .map(|&id| assignment.get(id).ok_or(StrataError::InvalidScope))
                          .collect::<Result<Vec<usize>>>()?);
    }

    let extra = latent.iter()
                      .map(|&id| net.variable(id).cloned())
                      .collect::<Result<Vec<_>>>()?;
    data.with_columns(extra, &values)
}


/// Score every candidate in parallel and keep the strictly best one, the earliest winning ties.
/// Candidates that fail to learn are reported as errors; degenerate results never win.
pub(crate) fn best_of<T, F>(candidates: Vec<T>, name: &str, score_type: ScoreType, eval: F) -> Result<LearningResult>
    where T: Send,
          F: Fn(T) -> Result<LearningResult> + Sync + Send
{
    let results = candidates.into_par_iter()
                            .map(|c| eval(c))
                            .collect::<Result<Vec<LearningResult>>>()?;

    let mut best = LearningResult::degenerate(score_type, name);
    for r in results {
        if !r.is_degenerate() && r.score() > best.score() {
            best = r.with_name(name);
        }
    }
    Ok(best)
}
