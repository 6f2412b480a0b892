//! Incremental learning of latent tree-like structures.
//!
//! The learner starts from a model where every observed variable is independent and keeps a
//! *current set* of variables that may still get a parent. Each round it ranks the pairs of the
//! current set by mutual information, lets its operators propose a new latent parent or an arc
//! for the best pairs, and keeps the best proposal if it raises the score. Proposals are fitted
//! with local EM around the change; the cardinality of the latent variables involved is then
//! tuned one state at a time.

use crate::data::DiscreteData;
use crate::estimators::{Em, EmConfig, EmInitialization, LocalEm, ParameterLearner};
use crate::graph::NodeId;
use crate::information::{column_mutual_information, MiNormalization};
use crate::learning::LearningResult;
use crate::model::DiscreteBayesNet;
use crate::score::{family_names, ScoreType};
use crate::util::{invalid_config, Result, StrataError};
use crate::variable::Variable;
use super::latent::fresh_latent_name;
use super::{complete_variables, LatentCompletion};

use itertools::Itertools;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use std::cmp::Ordering;
use std::collections::HashMap;

/// Which nodes local EM re-estimates around a change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalEmScope {
    /// The changed nodes and their children
    Simple,

    /// The changed nodes and their Markov blankets
    MarkovBlanket
}


impl Default for LocalEmScope {
    fn default() -> Self {
        LocalEmScope::Simple
    }
}


impl LocalEmScope {

    /// The nodes to update around `changed`, without repetitions
    pub fn nodes(self, net: &DiscreteBayesNet, changed: &[NodeId]) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        for &id in changed {
            nodes.push(id);
            match self {
                LocalEmScope::Simple => nodes.extend_from_slice(net.children(id)),
                LocalEmScope::MarkovBlanket => nodes.extend(net.markov_blanket(id))
            }
        }
        nodes.into_iter().unique().collect()
    }

}


/// Local EM as the incremental operators run it
#[derive(Clone, Debug, PartialEq)]
pub struct LocalEmSettings {
    pub config: EmConfig,
    pub scope: LocalEmScope
}


impl LocalEmSettings {

    /// Fit the parameters around `changed`, keeping every other CPT of `net`
    pub fn learn(&self, net: &DiscreteBayesNet, changed: &[NodeId], data: &DiscreteData) -> Result<LearningResult> {
        let names = family_names(net, &self.scope.nodes(net, changed))?;
        LocalEm::new(&names, self.config.clone())?.learn_model(net, data)
    }

}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProposalKind {
    /// A new latent variable, the given node, became the parent of both variables of the pair
    NewParent(NodeId),

    /// The arc `first -> second` was added
    Arc
}


/// A fitted change to the network concerning a pair of the current set
#[derive(Clone, Debug)]
pub struct IncrementalProposal {
    pub first: NodeId,
    pub second: NodeId,
    pub kind: ProposalKind,
    pub result: LearningResult
}


pub trait IncrementalOperator: Send + Sync {

    fn name(&self) -> &str;

    /// The best change for the candidate pairs, or `None` if no change applies to any of them
    fn apply(
        &self,
        pairs: &[(NodeId, NodeId)],
        net: &DiscreteBayesNet,
        data: &DiscreteData,
        local: &LocalEmSettings
    ) -> Result<Option<IncrementalProposal>>;

}


/// Evaluate candidates in parallel and keep the strictly best, the earliest winning ties
fn best_proposal<T, F>(candidates: Vec<T>, eval: F) -> Result<Option<IncrementalProposal>>
    where T: Send,
          F: Fn(usize, T) -> Result<IncrementalProposal> + Sync + Send
{
    let proposals = candidates.into_par_iter()
                              .enumerate()
                              .map(|(i, c)| eval(i, c))
                              .collect::<Result<Vec<IncrementalProposal>>>()?;

    let mut best: Option<IncrementalProposal> = None;
    for p in proposals {
        if !p.result.is_degenerate() && best.as_ref().map_or(true, |b| p.result.score() > b.result.score()) {
            best = Some(p);
        }
    }
    Ok(best)
}


/// Introduce a new latent parent above a pair
#[derive(Clone, Debug)]
pub struct AddDiscreteNode {
    cardinality: usize,

    /// No proposal once the network has this many latent variables
    max_latent: usize
}


impl AddDiscreteNode {

    /// # Errors
    /// * `StrataError::InvalidConfiguration` for a cardinality below 2 or a zero latent cap
    pub fn new(cardinality: usize, max_latent: usize) -> Result<Self> {
        if cardinality < 2 {
            return invalid_config("latent variables have at least 2 states");
        }
        if max_latent == 0 {
            return invalid_config("the latent variable cap must be positive");
        }
        Ok(AddDiscreteNode { cardinality, max_latent })
    }

}


impl Default for AddDiscreteNode {
    fn default() -> Self {
        AddDiscreteNode { cardinality: 2, max_latent: usize::MAX }
    }
}


impl IncrementalOperator for AddDiscreteNode {

    fn name(&self) -> &str {
        "AddDiscreteNode"
    }

    fn apply(&self, pairs: &[(NodeId, NodeId)], net: &DiscreteBayesNet, data: &DiscreteData, local: &LocalEmSettings) -> Result<Option<IncrementalProposal>> {
        if net.latent_nodes().len() >= self.max_latent {
            return Ok(None);
        }

        let variable = Variable::latent(&fresh_latent_name(net), self.cardinality)?;
        best_proposal(pairs.to_vec(), |i, (first, second)| {
            let mut candidate = net.clone();
            let new = candidate.add_node(variable.clone())?;
            candidate.add_edge(first, new)?;
            candidate.add_edge(second, new)?;

            let mut rng = StdRng::seed_from_u64(local.config.seed.wrapping_add(i as u64));
            candidate.randomly_parameterize_nodes(&[new, first, second], &mut rng)?;

            let result = local.learn(&candidate, &[new], data)?.with_name(self.name());
            Ok(IncrementalProposal { first, second, kind: ProposalKind::NewParent(new), result })
        })
    }

}


/// Add an arc between the variables of a pair, in either direction. Arcs out of latent
/// variables are always considered; arcs out of manifest variables only when enabled.
#[derive(Clone, Debug, Default)]
pub struct IncrementalAddArc {
    pub allow_manifest_to_manifest: bool,
    pub allow_manifest_to_latent: bool
}


impl IncrementalAddArc {

    fn allows(&self, net: &DiscreteBayesNet, tail: NodeId, head: NodeId) -> Result<bool> {
        let kinds = (net.variable(tail)?.is_latent(), net.variable(head)?.is_latent());
        let by_kind = match kinds {
            (true, _) => true,
            (false, false) => self.allow_manifest_to_manifest,
            (false, true) => self.allow_manifest_to_latent
        };
        Ok(by_kind && net.is_edge_allowed(head, tail))
    }

}


impl IncrementalOperator for IncrementalAddArc {

    fn name(&self) -> &str {
        "AddArc"
    }

    fn apply(&self, pairs: &[(NodeId, NodeId)], net: &DiscreteBayesNet, data: &DiscreteData, local: &LocalEmSettings) -> Result<Option<IncrementalProposal>> {
        let mut arcs = Vec::new();
        for &(a, b) in pairs {
            for (tail, head) in [(a, b), (b, a)] {
                if self.allows(net, tail, head)? {
                    arcs.push((tail, head));
                }
            }
        }

        best_proposal(arcs, |_, (tail, head)| {
            let mut candidate = net.clone();
            candidate.add_edge(head, tail)?;
            let result = local.learn(&candidate, &[tail, head], data)?.with_name(self.name());
            Ok(IncrementalProposal { first: tail, second: head, kind: ProposalKind::Arc, result })
        })
    }

}


/// `net` with one state more (or less) for `id`. Only the CPTs whose shape changes are
/// redrawn; every other node keeps its parameters.
fn with_cardinality_change(net: &DiscreteBayesNet, id: NodeId, increase: bool, seed: u64) -> Result<DiscreteBayesNet> {
    let mut changed = net.clone();
    let mut rng = StdRng::seed_from_u64(seed);
    if increase {
        changed.increase_cardinality(id, 1, &mut rng)?;
    } else {
        changed.decrease_cardinality(id, 1, &mut rng)?;
    }

    for other in net.node_ids() {
        if other != id && !net.parents(other).contains(&id) {
            changed.set_cpt(other, net.cpt(other)?.clone())?;
        }
    }
    Ok(changed)
}


/// The incremental latent structure learner. Built with `IncrementalLearnerBuilder`.
pub struct IncrementalLearner {
    operators: Vec<Box<dyn IncrementalOperator>>,
    alpha: usize,
    all_pairs: bool,
    iteration_global_em: bool,
    mi_normalization: MiNormalization,
    completion: LatentCompletion,
    max_cardinality: usize,
    initial_em: EmConfig,
    local: LocalEmSettings,
    iteration_em: EmConfig,
    final_em: EmConfig
}


pub struct IncrementalLearnerBuilder {
    operators: Vec<Box<dyn IncrementalOperator>>,
    alpha: usize,
    all_pairs: bool,
    iteration_global_em: bool,
    mi_normalization: MiNormalization,
    completion: LatentCompletion,
    scope: LocalEmScope,
    max_cardinality: usize,
    initial_em: EmConfig,
    local_em: EmConfig,
    iteration_em: EmConfig,
    final_em: EmConfig
}


impl Default for IncrementalLearnerBuilder {
    fn default() -> Self {
        let em = |initialization, max_steps| EmConfig { initialization, max_steps, ..Default::default() };

        IncrementalLearnerBuilder {
            operators: vec![Box::new(AddDiscreteNode::default()), Box::new(IncrementalAddArc::default())],
            alpha: 1,
            all_pairs: false,
            iteration_global_em: false,
            mi_normalization: MiNormalization::None,
            completion: LatentCompletion::MostLikely,
            scope: LocalEmScope::Simple,
            max_cardinality: 10,
            initial_em: em(EmInitialization::None, 100),
            local_em: em(EmInitialization::Pyramid { iterations: 2, candidates: 4 }, 500),
            iteration_em: em(EmInitialization::Pyramid { iterations: 4, candidates: 16 }, 500),
            final_em: em(EmInitialization::Pyramid { iterations: 16, candidates: 64 }, 500)
        }
    }
}


impl IncrementalLearnerBuilder {

    /// Start from `AddDiscreteNode` and `AddArc` with their default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the operator set
    pub fn with_operators(mut self, operators: Vec<Box<dyn IncrementalOperator>>) -> Self {
        self.operators = operators;
        self
    }

    /// Number of highest mutual information pairs offered to the operators every round
    pub fn with_alpha(mut self, alpha: usize) -> Self {
        self.alpha = alpha;
        self
    }

    /// Offer every pair of the current set to the operators, in scan order, instead of the
    /// `alpha` best by mutual information. No mutual information is computed.
    pub fn with_all_pairs(mut self, enabled: bool) -> Self {
        self.all_pairs = enabled;
        self
    }

    /// Refit the whole network with EM after every accepted change
    pub fn with_iteration_global_em(mut self, enabled: bool) -> Self {
        self.iteration_global_em = enabled;
        self
    }

    pub fn with_mi_normalization(mut self, norm: MiNormalization) -> Self {
        self.mi_normalization = norm;
        self
    }

    pub fn with_completion(mut self, completion: LatentCompletion) -> Self {
        self.completion = completion;
        self
    }

    pub fn with_local_em_scope(mut self, scope: LocalEmScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_max_cardinality(mut self, max: usize) -> Self {
        self.max_cardinality = max;
        self
    }

    pub fn with_initial_em(mut self, config: EmConfig) -> Self {
        self.initial_em = config;
        self
    }

    pub fn with_local_em(mut self, config: EmConfig) -> Self {
        self.local_em = config;
        self
    }

    pub fn with_iteration_em(mut self, config: EmConfig) -> Self {
        self.iteration_em = config;
        self
    }

    pub fn with_final_em(mut self, config: EmConfig) -> Self {
        self.final_em = config;
        self
    }

    /// Every EM configuration must share a score type
    ///
    /// # Errors
    /// * `StrataError::InvalidConfiguration` for no operators, a zero `alpha`, a cardinality cap
    ///   below 2 or an invalid EM configuration
    pub fn build(self) -> Result<IncrementalLearner> {
        if self.operators.is_empty() {
            return invalid_config("the incremental learner needs at least one operator");
        }
        if self.alpha == 0 {
            return invalid_config("at least one pair must be considered per round");
        }
        if self.max_cardinality < 2 {
            return invalid_config("latent variables have at least 2 states");
        }

        let configs = [&self.initial_em, &self.local_em, &self.iteration_em, &self.final_em];
        for c in configs.iter() {
            c.validate()?;
        }
        if configs.iter().any(|c| c.score_type != self.local_em.score_type) {
            return invalid_config("the EM configurations disagree on the score");
        }

        Ok(IncrementalLearner {
            operators: self.operators,
            alpha: self.alpha,
            all_pairs: self.all_pairs,
            iteration_global_em: self.iteration_global_em,
            mi_normalization: self.mi_normalization,
            completion: self.completion,
            max_cardinality: self.max_cardinality,
            initial_em: self.initial_em,
            local: LocalEmSettings { config: self.local_em, scope: self.scope },
            iteration_em: self.iteration_em,
            final_em: self.final_em
        })
    }

}


/// Unordered pair key
fn key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a.index() <= b.index() { (a, b) } else { (b, a) }
}


impl IncrementalLearner {

    pub fn score_type(&self) -> ScoreType {
        self.local.config.score_type
    }

    /// The `alpha` pairs of `current` with the highest mutual information, or all of them when
    /// every pair is searched. Pairs are scanned in the order of `current` and equal values keep
    /// that order.
    fn top_pairs(&self, current: &[NodeId], mi: &HashMap<(NodeId, NodeId), f64>) -> Vec<(NodeId, NodeId)> {
        if self.all_pairs {
            return current.iter().cloned().tuple_combinations().collect();
        }

        let mut pairs: Vec<((NodeId, NodeId), f64)> = current.iter()
                                                             .cloned()
                                                             .tuple_combinations()
                                                             .map(|(a, b)| ((a, b), mi.get(&key(a, b)).cloned().unwrap_or(f64::NEG_INFINITY)))
                                                             .collect();
        pairs.sort_by(|x, y| y.1.partial_cmp(&x.1).unwrap_or(Ordering::Equal));
        pairs.into_iter().take(self.alpha).map(|(p, _)| p).collect()
    }

    /// The best result of changing the cardinality of one of `latent` by one state
    fn best_cardinality_change(&self, net: &DiscreteBayesNet, latent: &[NodeId], increase: bool, data: &DiscreteData) -> Result<LearningResult> {
        let mut best = LearningResult::degenerate(self.score_type(), if increase { "IncreaseCard" } else { "DecreaseCard" });

        for &id in latent {
            let card = net.cardinality(id)?;
            if (increase && card >= self.max_cardinality) || (!increase && card <= 2) {
                continue;
            }

            let changed = with_cardinality_change(net, id, increase, self.local.config.seed)?;
            let result = self.local.learn(&changed, &[id], data)?;
            if result.score() > best.score() {
                best = result;
            }
        }

        Ok(best)
    }

    /// Move the cardinality of the given latent variables one state at a time while it helps
    fn refine_cardinality(&self, latent: &[NodeId], start: LearningResult, data: &DiscreteData) -> Result<LearningResult> {
        let mut best = start;
        if latent.is_empty() {
            return Ok(best);
        }

        loop {
            let net = best.model().ok_or(StrataError::InvalidConfiguration(String::from("no model to refine")))?;
            let up = self.best_cardinality_change(net, latent, true, data)?;
            let down = self.best_cardinality_change(net, latent, false, data)?;

            let next = if up.score() > down.score() { up } else if down.score() > up.score() { down } else { return Ok(best) };
            if next.score() > best.score() {
                debug!("{} -> {:.4}", next.name(), next.score());
                best = next;
            } else {
                return Ok(best);
            }
        }
    }

    /// Values of `id` for every distinct row of `data`, filled in by the completion policy
    fn predicted_column(&self, net: &DiscreteBayesNet, id: NodeId, data: &DiscreteData) -> Result<Vec<Option<usize>>> {
        let name = net.name(id).ok_or(StrataError::NodeNotFound)?;
        let completed = complete_variables(net, data, &[id], self.completion)?;
        let col = completed.index_of(name).ok_or_else(|| StrataError::UnknownVariable(String::from(name)))?;
        Ok(completed.instances().map(|(row, _)| row[col]).collect())
    }

    /// Learn a model of the columns of `data`
    ///
    /// # Errors
    /// * `StrataError::InvalidData` if `data` has fewer than two columns
    pub fn learn_model(&self, data: &DiscreteData) -> Result<LearningResult> {
        if data.variables().len() < 2 {
            return Err(StrataError::InvalidData(String::from("the incremental learner needs two variables")));
        }

        let mut net = DiscreteBayesNet::new();
        for v in data.variables() {
            net.add_node(v.clone())?;
        }

        let mut best = Em::new(self.initial_em.clone())?.learn_model(&net, data)?;
        let mut history = vec![best.score()];
        info!("Incremental learner starts at {}", best);

        // per distinct row values of the current set, and the pairwise mutual information
        let weights: Vec<f64> = data.instances().map(|(_, w)| w).collect();
        let mut columns: HashMap<NodeId, Vec<Option<usize>>> = HashMap::new();
        let mut current: Vec<NodeId> = net.node_ids().collect();
        for (i, &id) in current.iter().enumerate() {
            columns.insert(id, data.instances().map(|(row, _)| row[i]).collect());
        }

        let mut mi: HashMap<(NodeId, NodeId), f64> = HashMap::new();
        if !self.all_pairs {
            for (a, b) in current.iter().cloned().tuple_combinations() {
                mi.insert(key(a, b), column_mutual_information(&columns[&a], &columns[&b], &weights, self.mi_normalization)?);
            }
        }

        let mut iteration = 0;
        while current.len() > 1 {
            iteration += 1;
            let pairs = self.top_pairs(&current, &mi);
            let incumbent = best.model().ok_or(StrataError::InvalidConfiguration(String::from("no incumbent model")))?;

            let mut chosen: Option<IncrementalProposal> = None;
            for op in self.operators.iter() {
                match op.apply(&pairs, incumbent, data, &self.local)? {
                    Some(p) => {
                        debug!("{}({}, {}) -> {:.4}", op.name(), p.first, p.second, p.result.score());
                        if chosen.as_ref().map_or(true, |c| p.result.score() > c.result.score()) {
                            chosen = Some(p);
                        }
                    },
                    None => debug!("{} -> none", op.name())
                }
            }

            let proposal = match chosen {
                Some(p) => p,
                None => break
            };

            let model = proposal.result.model().ok_or(StrataError::InvalidConfiguration(String::from("empty proposal")))?;
            let mut latent: Vec<NodeId> = [proposal.first, proposal.second].iter()
                                                                           .cloned()
                                                                           .filter(|&id| model.variable(id).map_or(false, |v| v.is_latent()))
                                                                           .collect();

            // variables leaving the current set, and the one whose mutual information is renewed
            let (leaving, renewed) = match proposal.kind {
                ProposalKind::NewParent(new) => {
                    latent.push(new);
                    (vec![proposal.first, proposal.second], Some(new))
                },
                ProposalKind::Arc => {
                    let renewed = if latent.contains(&proposal.first) { Some(proposal.first) } else { None };
                    (vec![proposal.second], renewed)
                }
            };

            let mut result = self.refine_cardinality(&latent, proposal.result, data)?;
            if self.iteration_global_em {
                let model = result.model().ok_or(StrataError::InvalidConfiguration(String::from("empty proposal")))?;
                result = Em::new(self.iteration_em.clone())?.learn_model(model, data)?;
            }

            info!("Iteration {}: {} -> {:.4}", iteration, result.name(), result.score());
            if result.score() <= best.score() {
                debug!("No improvement over {:.4}", best.score());
                break;
            }

            best = result;
            history.push(best.score());

            current.retain(|id| !leaving.contains(id));
            for id in leaving.iter() {
                columns.remove(id);
            }
            mi.retain(|(a, b), _| !leaving.contains(a) && !leaving.contains(b));

            if let Some(id) = renewed {
                if !current.contains(&id) {
                    current.push(id);
                }
                if self.all_pairs {
                    continue;
                }

                let model = best.model().ok_or(StrataError::InvalidConfiguration(String::from("no incumbent model")))?;
                let column = self.predicted_column(model, id, data)?;
                for &other in current.iter().filter(|&&o| o != id) {
                    let value = column_mutual_information(&columns[&other], &column, &weights, self.mi_normalization)?;
                    mi.insert(key(id, other), value);
                }
                columns.insert(id, column);
            }
        }

        let model = best.model().ok_or(StrataError::InvalidConfiguration(String::from("no incumbent model")))?;
        let last = Em::new(self.final_em.clone())?.learn_model(model, data)?;
        history.push(last.score());
        info!("Incremental learner finished at {:.4}", last.score());

        Ok(last.with_name("IncrementalLearner").with_history(history))
    }

}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::estimators::tests::{assert_normalized, expected_data, latent_class};
    use crate::estimators::{initialize_empty, MleLearner};

    fn local() -> LocalEmSettings {
        LocalEmSettings {
            config: EmConfig { initialization: EmInitialization::Pyramid { iterations: 2, candidates: 4 }, ..Default::default() },
            scope: LocalEmScope::Simple
        }
    }

    #[test]
    fn scopes() {
        let net = latent_class(&[0.9, 0.8, 0.7]);
        let id = |n: &str| net.lookup(n).unwrap();

        assert_eq!(vec![id("H"), id("X1"), id("X2"), id("X3")], LocalEmScope::Simple.nodes(&net, &[id("H")]));
        assert_eq!(vec![id("X1")], LocalEmScope::Simple.nodes(&net, &[id("X1")]));
        assert_eq!(vec![id("X1"), id("H")], LocalEmScope::MarkovBlanket.nodes(&net, &[id("X1")]));
        assert_eq!(
            vec![id("X1"), id("H"), id("X2")],
            LocalEmScope::MarkovBlanket.nodes(&net, &[id("X1"), id("H"), id("X2")])[..3].to_vec()
        );
    }

    #[test]
    fn new_parent_proposals() {
        let truth = latent_class(&[0.95, 0.9, 0.6]);
        let data = expected_data(&truth, 500.0);
        let net = initialize_empty(&data).unwrap();
        let id = |n: &str| net.lookup(n).unwrap();

        let pairs = vec![(id("X1"), id("X2")), (id("X1"), id("X3"))];
        let proposal = AddDiscreteNode::default().apply(&pairs, &net, &data, &local()).unwrap().unwrap();
        assert_eq!((id("X1"), id("X2")), (proposal.first, proposal.second));
        assert_eq!("AddDiscreteNode", proposal.result.name());

        let model = proposal.result.model().unwrap();
        let new = match proposal.kind {
            ProposalKind::NewParent(new) => new,
            ProposalKind::Arc => panic!("expected a new parent")
        };
        assert_eq!(Some("LV_1"), model.name(new));
        assert_eq!(&[id("X1"), id("X2")], model.children(new));
        assert_normalized(model);
        assert_eq!(3, net.num_nodes());

        // identical inputs, identical proposals
        let again = AddDiscreteNode::default().apply(&pairs, &net, &data, &local()).unwrap().unwrap();
        assert_eq!(proposal.result.score().to_bits(), again.result.score().to_bits());

        let capped = AddDiscreteNode::new(2, 1).unwrap();
        assert!(capped.apply(&pairs, &truth, &data, &local()).unwrap().is_none());
        assert!(AddDiscreteNode::new(1, 3).is_err());
    }

    #[test]
    fn arc_directions() {
        let truth = latent_class(&[0.9, 0.85, 0.8]);
        let data = expected_data(&truth, 500.0);
        let mut net = truth.clone();
        let (h, x1, x3) = (net.lookup("H").unwrap(), net.lookup("X1").unwrap(), net.lookup("X3").unwrap());
        net.remove_edge(x3, h).unwrap();

        // only latent -> manifest by default
        let proposal = IncrementalAddArc::default().apply(&[(x3, h)], &net, &data, &local()).unwrap().unwrap();
        assert_eq!((h, x3), (proposal.first, proposal.second));
        assert_eq!(ProposalKind::Arc, proposal.kind);
        assert!(proposal.result.model().unwrap().contains_edge(x3, h));

        assert!(IncrementalAddArc::default().apply(&[(x1, x3)], &net, &data, &local()).unwrap().is_none());
        let open = IncrementalAddArc { allow_manifest_to_manifest: true, allow_manifest_to_latent: false };
        assert!(open.apply(&[(x1, x3)], &net, &data, &local()).unwrap().is_some());

        // already neighbours
        assert!(IncrementalAddArc::default().apply(&[(h, x1)], &net, &data, &local()).unwrap().is_none());
    }

    #[test]
    fn cardinality_changes_keep_other_parameters() {
        let truth = latent_class(&[0.9, 0.85, 0.8]);
        let mut net = truth.clone();
        let other = net.add_node(Variable::manifest("Y", 3).unwrap()).unwrap();
        let h = net.lookup("H").unwrap();

        let changed = with_cardinality_change(&net, h, true, 7).unwrap();
        assert_eq!(3, changed.cardinality(h).unwrap());
        assert_eq!(net.cpt(other).unwrap(), changed.cpt(other).unwrap());
        assert_eq!(net.edges(), changed.edges());
        assert!(with_cardinality_change(&truth, h, false, 7).is_err());
    }

    #[test]
    fn pairs_by_mutual_information() {
        let learner = IncrementalLearnerBuilder::new().with_alpha(2).build().unwrap();
        let ids: Vec<NodeId> = (0..3).map(NodeId::new).collect();
        let mut mi = HashMap::new();
        mi.insert(key(ids[0], ids[1]), 0.1);
        mi.insert(key(ids[0], ids[2]), 0.5);
        mi.insert(key(ids[2], ids[1]), 0.5);

        assert_eq!(vec![(ids[0], ids[2]), (ids[1], ids[2])], learner.top_pairs(&ids, &mi));

        // all pairs ignore both alpha and the ranking
        let exhaustive = IncrementalLearnerBuilder::new().with_alpha(2).with_all_pairs(true).build().unwrap();
        assert_eq!(
            vec![(ids[0], ids[1]), (ids[0], ids[2]), (ids[1], ids[2])],
            exhaustive.top_pairs(&ids, &mi)
        );
        assert_eq!(
            vec![(ids[0], ids[1]), (ids[0], ids[2]), (ids[1], ids[2])],
            exhaustive.top_pairs(&ids, &HashMap::new())
        );
    }

    #[test]
    fn builder_validation() {
        assert!(IncrementalLearnerBuilder::new().with_alpha(0).build().is_err());
        assert!(IncrementalLearnerBuilder::new().with_operators(Vec::new()).build().is_err());
        assert!(IncrementalLearnerBuilder::new().with_max_cardinality(1).build().is_err());
        assert!(IncrementalLearnerBuilder::new().with_local_em(EmConfig { max_steps: 0, ..Default::default() }).build().is_err());
        assert!(IncrementalLearnerBuilder::new()
            .with_final_em(EmConfig { score_type: ScoreType::Aic, ..Default::default() })
            .build()
            .is_err());

        let single = DiscreteData::new(vec![Variable::manifest("A", 2).unwrap()]).unwrap();
        assert!(IncrementalLearnerBuilder::new().build().unwrap().learn_model(&single).is_err());
    }

    #[test]
    /// Four indicators of a binary latent class: the learner finds one binary latent parent
    fn recovers_a_latent_class() {
        let truth = latent_class(&[0.95, 0.95, 0.85, 0.85]);
        let data = expected_data(&truth, 1000.0);

        let learner = IncrementalLearnerBuilder::new().with_alpha(1).build().unwrap();
        let result = learner.learn_model(&data).unwrap();
        let net = result.model().unwrap();

        let latent = net.latent_nodes();
        assert_eq!(1, latent.len());
        assert_eq!(2, net.cardinality(latent[0]).unwrap());
        assert_eq!(4, net.children(latent[0]).len());
        assert_normalized(net);

        let independent = MleLearner::new(ScoreType::Bic).learn_model(&initialize_empty(&data).unwrap(), &data).unwrap();
        assert!(result.score() > independent.score() + 1.0);
        assert_eq!(ScoreType::Bic, result.score_type());
    }

    #[test]
    fn all_pairs_search() {
        let truth = latent_class(&[0.95, 0.95, 0.85, 0.85]);
        let data = expected_data(&truth, 1000.0);

        let learner = IncrementalLearnerBuilder::new().with_all_pairs(true).build().unwrap();
        let result = learner.learn_model(&data).unwrap();
        let net = result.model().unwrap();

        assert!(!net.latent_nodes().is_empty());
        for x in ["X1", "X2", "X3", "X4"] {
            assert!(net.parents(net.lookup(x).unwrap()).len() <= 1);
        }
        assert!(net.num_edges() >= 3);
        assert_normalized(net);

        let independent = MleLearner::new(ScoreType::Bic).learn_model(&initialize_empty(&data).unwrap(), &data).unwrap();
        assert!(result.score() > independent.score() + 1.0);
    }
}
