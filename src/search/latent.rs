//! Search over the latent part of a network: adding and removing latent variables and changing
//! their cardinality. Every candidate is fitted with EM and then refined by structural EM.

use crate::data::DiscreteData;
use crate::estimators::ParameterLearner;
use crate::graph::NodeId;
use crate::learning::LearningResult;
use crate::model::DiscreteBayesNet;
use crate::util::{invalid_config, Result};
use crate::variable::Variable;
use super::{best_of, StructuralEm};

use itertools::Itertools;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

pub trait LatentOperator: Send + Sync {

    fn name(&self) -> &str;

    /// The best candidate around `seed` after structural EM, or a degenerate result
    fn apply(&self, seed: &DiscreteBayesNet, data: &DiscreteData, sem: &StructuralEm) -> Result<LearningResult>;

}


/// EM followed by structural EM on a candidate
fn fit(net: &DiscreteBayesNet, data: &DiscreteData, sem: &StructuralEm) -> Result<LearningResult> {
    let start = sem.em().learn_model(net, data)?;
    sem.refine(start, data)
}


/// `LV_k` for the smallest `k` not yet taken
pub(crate) fn fresh_latent_name(net: &DiscreteBayesNet) -> String {
    (1..).map(|k| format!("LV_{}", k))
         .find(|n| net.lookup(n).is_none())
         .unwrap_or_default()
}


fn latent_parents(net: &DiscreteBayesNet, id: NodeId) -> Vec<NodeId> {
    net.parents(id)
       .iter()
       .cloned()
       .filter(|&p| net.variable(p).map_or(false, |v| v.is_latent()))
       .collect()
}


/// Put a new latent variable between `first`, `second` and their latent parents: the pair
/// become the only children of the new variable, whose parents are the old latent parents of
/// the pair. `None` when a shared latent parent would be left with fewer than two children, or
/// when the rewiring would close a cycle.
pub(crate) fn with_latent_parent(
    seed: &DiscreteBayesNet,
    first: NodeId,
    second: NodeId,
    variable: Variable
) -> Result<Option<DiscreteBayesNet>> {
    let first_parents = latent_parents(seed, first);
    let second_parents = latent_parents(seed, second);

    // every shared parent loses two children and gains the new variable
    if first_parents.iter().any(|p| second_parents.contains(p) && seed.children(*p).len() < 3) {
        return Ok(None);
    }

    let mut net = seed.clone();
    let new = net.add_node(variable)?;
    for &p in first_parents.iter() {
        net.remove_edge(first, p)?;
    }
    for &p in second_parents.iter() {
        net.remove_edge(second, p)?;
    }
    net.add_edge(first, new)?;
    net.add_edge(second, new)?;

    for p in first_parents.into_iter().chain(second_parents).unique() {
        if !net.is_edge_allowed(new, p) {
            return Ok(None);
        }
        net.add_edge(new, p)?;
    }

    Ok(Some(net))
}


/// Introduce a latent parent above a pair of manifest variables
#[derive(Clone, Debug)]
pub struct AddLatentNode {
    cardinality: usize
}


impl AddLatentNode {

    /// # Errors
    /// * `StrataError::InvalidConfiguration` for a cardinality below 2
    pub fn new(cardinality: usize) -> Result<Self> {
        if cardinality < 2 {
            return invalid_config("latent variables have at least 2 states");
        }
        Ok(AddLatentNode { cardinality })
    }

}


impl LatentOperator for AddLatentNode {

    fn name(&self) -> &str {
        "AddLatentNode"
    }

    fn apply(&self, seed: &DiscreteBayesNet, data: &DiscreteData, sem: &StructuralEm) -> Result<LearningResult> {
        let variable = Variable::latent(&fresh_latent_name(seed), self.cardinality)?;

        let mut candidates = Vec::new();
        for (a, b) in seed.manifest_nodes().into_iter().tuple_combinations() {
            if let Some(net) = with_latent_parent(seed, a, b, variable.clone())? {
                candidates.push(net);
            }
        }

        best_of(candidates, self.name(), sem.score_type(), |net| fit(&net, data, sem))
    }

}


/// Remove one latent variable, as long as another one remains
#[derive(Clone, Debug, Default)]
pub struct RemoveLatentNode;


impl LatentOperator for RemoveLatentNode {

    fn name(&self) -> &str {
        "RemoveLatentNode"
    }

    fn apply(&self, seed: &DiscreteBayesNet, data: &DiscreteData, sem: &StructuralEm) -> Result<LearningResult> {
        let latent = seed.latent_nodes();
        if latent.len() < 2 {
            return Ok(LearningResult::degenerate(sem.score_type(), self.name()));
        }

        best_of(latent, self.name(), sem.score_type(), |id| {
            let mut net = seed.clone();
            net.remove_node(id)?;
            fit(&net, data, sem)
        })
    }

}


/// One more state for a latent variable below `max` states
#[derive(Clone, Debug)]
pub struct LatentIncreaseCardinality {
    max: usize,
    seed: u64
}


impl LatentIncreaseCardinality {

    /// # Errors
    /// * `StrataError::InvalidConfiguration` if `max` is below 2
    pub fn new(max: usize, seed: u64) -> Result<Self> {
        if max < 2 {
            return invalid_config("latent variables have at least 2 states");
        }
        Ok(LatentIncreaseCardinality { max, seed })
    }

}


impl LatentOperator for LatentIncreaseCardinality {

    fn name(&self) -> &str {
        "LatentIncreaseCardinality"
    }

    fn apply(&self, seed: &DiscreteBayesNet, data: &DiscreteData, sem: &StructuralEm) -> Result<LearningResult> {
        let candidates: Vec<(usize, NodeId)> = seed.latent_nodes()
                                                   .into_iter()
                                                   .filter(|&id| seed.cardinality(id).map_or(false, |c| c < self.max))
                                                   .enumerate()
                                                   .collect();

        best_of(candidates, self.name(), sem.score_type(), |(i, id)| {
            let mut net = seed.clone();
            net.increase_cardinality(id, 1, &mut StdRng::seed_from_u64(self.seed.wrapping_add(i as u64)))?;
            fit(&net, data, sem)
        })
    }

}


/// One state less for a latent variable above `min` states
#[derive(Clone, Debug)]
pub struct LatentDecreaseCardinality {
    min: usize,
    seed: u64
}


impl LatentDecreaseCardinality {

    /// # Errors
    /// * `StrataError::InvalidConfiguration` if `min` is below 2
    pub fn new(min: usize, seed: u64) -> Result<Self> {
        if min < 2 {
            return invalid_config("latent variables have at least 2 states");
        }
        Ok(LatentDecreaseCardinality { min, seed })
    }

}


impl LatentOperator for LatentDecreaseCardinality {

    fn name(&self) -> &str {
        "LatentDecreaseCardinality"
    }

    fn apply(&self, seed: &DiscreteBayesNet, data: &DiscreteData, sem: &StructuralEm) -> Result<LearningResult> {
        let candidates: Vec<(usize, NodeId)> = seed.latent_nodes()
                                                   .into_iter()
                                                   .filter(|&id| seed.cardinality(id).map_or(false, |c| c > self.min))
                                                   .enumerate()
                                                   .collect();

        best_of(candidates, self.name(), sem.score_type(), |(i, id)| {
            let mut net = seed.clone();
            net.decrease_cardinality(id, 1, &mut StdRng::seed_from_u64(self.seed.wrapping_add(i as u64)))?;
            fit(&net, data, sem)
        })
    }

}


/// Hill climbing over latent operators, each candidate refined by structural EM
pub struct LatentHillClimbing {
    operators: Vec<Box<dyn LatentOperator>>,
    max_iterations: usize,
    threshold: f64
}


impl LatentHillClimbing {

    /// # Errors
    /// * `StrataError::InvalidConfiguration` for an empty operator set, zero iterations or a
    ///   negative threshold
    pub fn new(operators: Vec<Box<dyn LatentOperator>>, max_iterations: usize, threshold: f64) -> Result<Self> {
        if operators.is_empty() {
            return invalid_config("hill climbing needs at least one operator");
        }
        if max_iterations == 0 {
            return invalid_config("hill climbing needs at least one iteration");
        }
        if !(threshold >= 0.0) {
            return invalid_config("the hill climbing threshold must be nonnegative");
        }

        Ok(LatentHillClimbing { operators, max_iterations, threshold })
    }

    pub fn learn_model(&self, seed: &DiscreteBayesNet, data: &DiscreteData, sem: &StructuralEm) -> Result<LearningResult> {
        let mut current = sem.learn_model(seed, data)?;
        let mut history = vec![current.score()];
        info!("Latent hill climbing starts at {}", current);

        for iteration in 0..self.max_iterations {
            let incumbent = match current.model() {
                Some(net) => net,
                None => break
            };

            let mut best: Option<LearningResult> = None;
            for op in self.operators.iter() {
                let proposal = op.apply(incumbent, data, sem)?;
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
                _ => break
            }
        }

        Ok(current.with_name("LatentHillClimbing").with_history(history))
    }

}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::estimators::tests::{assert_normalized, expected_data, latent_class};
    use crate::estimators::{Em, EmConfig, EmInitialization};
    use crate::search::{SearchConstraints, StructureType};

    fn sem() -> StructuralEm {
        let em = Em::new(EmConfig {
            initialization: EmInitialization::Pyramid { iterations: 4, candidates: 8 },
            max_steps: 200,
            seed: 11,
            ..Default::default()
        }).unwrap();
        StructuralEm::new(em, StructureType::Dag, 5, 3, SearchConstraints::new()).unwrap()
    }

    #[test]
    fn fresh_names() {
        let mut net = latent_class(&[0.9, 0.8]);
        assert_eq!("LV_1", fresh_latent_name(&net));
        net.add_node(Variable::latent("LV_1", 2).unwrap()).unwrap();
        net.add_node(Variable::latent("LV_3", 2).unwrap()).unwrap();
        assert_eq!("LV_2", fresh_latent_name(&net));
    }

    #[test]
    fn new_parents_absorb_latent_parents() {
        let net = latent_class(&[0.9, 0.8, 0.7, 0.6]);
        let id = |n: &str| net.lookup(n).unwrap();
        let lv = Variable::latent("LV_1", 3).unwrap();

        let rewired = with_latent_parent(&net, id("X1"), id("X2"), lv.clone()).unwrap().unwrap();
        let new = rewired.lookup("LV_1").unwrap();
        assert_eq!(3, rewired.cardinality(new).unwrap());
        assert_eq!(&[id("H")], rewired.parents(new));
        assert_eq!(&[new], rewired.parents(id("X1")));
        assert_eq!(&[new], rewired.parents(id("X2")));
        assert_eq!(3, rewired.children(id("H")).len());
        assert_eq!(6, rewired.num_nodes());
        assert_eq!(5, net.num_nodes());

        // H would be left with a single child
        let small = latent_class(&[0.9, 0.8]);
        let (x1, x2) = (small.lookup("X1").unwrap(), small.lookup("X2").unwrap());
        assert!(with_latent_parent(&small, x1, x2, lv).unwrap().is_none());
    }

    #[test]
    fn removing_the_last_latent_is_degenerate() {
        let truth = latent_class(&[0.9, 0.85, 0.8]);
        let data = expected_data(&truth, 200.0);
        let sem = sem();

        let result = RemoveLatentNode.apply(&truth, &data, &sem).unwrap();
        assert!(result.is_degenerate());
        assert_eq!(f64::NEG_INFINITY, result.score());
        assert!(result.model().is_none());

        // the driver keeps its incumbent
        let hc = LatentHillClimbing::new(vec![Box::new(RemoveLatentNode)], 3, 0.01).unwrap();
        let out = hc.learn_model(&truth, &data, &sem).unwrap();
        let start = sem.learn_model(&truth, &data).unwrap();
        assert_eq!(1, out.history().len());
        assert_eq!(start.score().to_bits(), out.score().to_bits());
        assert_eq!(start.model().unwrap().edges(), out.model().unwrap().edges());
    }

    #[test]
    fn latent_search_improves_monotonically() {
        let truth = latent_class(&[0.9, 0.85, 0.8]);
        let data = expected_data(&truth, 500.0);

        let ops: Vec<Box<dyn LatentOperator>> = vec![
            Box::new(AddLatentNode::new(2).unwrap()),
            Box::new(RemoveLatentNode),
            Box::new(LatentIncreaseCardinality::new(3, 1).unwrap()),
            Box::new(LatentDecreaseCardinality::new(2, 1).unwrap())
        ];
        let hc = LatentHillClimbing::new(ops, 2, 0.01).unwrap();
        let result = hc.learn_model(&truth, &data, &sem()).unwrap();

        for pair in result.history().windows(2) {
            assert!(pair[1] > pair[0] + 0.01);
        }
        let net = result.model().unwrap();
        assert_normalized(net);
        assert!(!net.latent_nodes().is_empty());
        assert_eq!(3, net.manifest_nodes().len());
    }

    #[test]
    fn validation() {
        assert!(AddLatentNode::new(1).is_err());
        assert!(LatentIncreaseCardinality::new(1, 0).is_err());
        assert!(LatentDecreaseCardinality::new(1, 0).is_err());
        assert!(LatentHillClimbing::new(Vec::new(), 3, 0.0).is_err());
        assert!(LatentHillClimbing::new(vec![Box::new(RemoveLatentNode)], 0, 0.0).is_err());
    }
}
