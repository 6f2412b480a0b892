//! Defines a `ConditionalInferenceEngine` that uses exact inference by variable elimination to
//! answer conditional inference queries.
//!
//! Implementation of Koller & Friedman Algorithm 9.1 - Sum-Product-VE

use crate::factor::{Assignment, Factor};
use crate::graph::NodeId;
use crate::model::DiscreteBayesNet;
use crate::util::{Result, StrataError};
use super::ConditionalInferenceEngine;

use std::collections::{HashMap, HashSet};

pub struct VariableEliminationEngine {

    /// the CPTs of the network (a 'bag of factors'), reduced by the provided evidence
    factors: Vec<Factor>,

    /// precomputed preferred elimination order based on max-cardinality heuristic
    order: Vec<NodeId>

}


impl VariableEliminationEngine {

    /// Prepare the engine for queries on `model` given `evidence`
    ///
    /// # Errors
    /// * `StrataError::InvalidScope` if the evidence assigns an out of range state
    pub fn new(model: &DiscreteBayesNet, evidence: &Assignment) -> Result<Self> {
        // reduce every CPT with the evidence - this is the bag of factors we will eliminate from
        let factors = model.node_ids()
                           .map(|id| model.cpt(id).and_then(|cpt| cpt.reduce(evidence)))
                           .collect::<Result<Vec<Factor>>>()?;

        let variables: Vec<NodeId> = model.node_ids().filter(|&id| evidence.get(id).is_none()).collect();
        let order = max_cardinality_elimination_order(&variables, &factors);

        Ok(VariableEliminationEngine { factors, order })
    }

}


/// Compute the preferred elimination order by the max-cardinality heuristic
fn max_cardinality_elimination_order(vars: &[NodeId], factors: &[Factor]) -> Vec<NodeId> {
    // two variables are neighbours if they share a factor
    let mut neighbors: HashMap<NodeId, HashSet<NodeId>> = vars.iter()
                                                              .map(|&v| (v, HashSet::new()))
                                                              .collect();

    for f in factors.iter() {
        let scope = f.scope();
        for (i, &vi) in scope.iter().enumerate() {
            for &vj in scope[i + 1..].iter() {
                if let Some(n) = neighbors.get_mut(&vi) {
                    n.insert(vj);
                }
                if let Some(n) = neighbors.get_mut(&vj) {
                    n.insert(vi);
                }
            }
        }
    }

    // set of marked variables
    let mut marked = HashSet::new();
    // the (reverse) elimination order
    let mut elimination = Vec::with_capacity(vars.len());

    for _ in 0..vars.len() {
        // the unmarked variable with the most marked neighbours, first one wins ties
        let mut best: Option<(NodeId, usize)> = None;
        for &v in vars.iter().filter(|v| !marked.contains(*v)) {
            let ct = neighbors[&v].iter().filter(|n| marked.contains(*n)).count();
            if best.map_or(true, |(_, max)| ct > max) {
                best = Some((v, ct));
            }
        }

        if let Some((v, _)) = best {
            elimination.push(v);
            marked.insert(v);
        }
    }

    // we need to reverse the elimination order before returning
    elimination.reverse();
    elimination
}


impl ConditionalInferenceEngine for VariableEliminationEngine {

    fn infer(&mut self, variables: &[NodeId]) -> Result<Factor> {
        // check input arguments
        if variables.iter().any(|v| !self.order.contains(v)) {
            // a variable requested is not found in the (reduced) model
            return Err(StrataError::InvalidScope);
        }

        let mut phis = self.factors.clone();
        for &var in self.order.iter() {
            if variables.contains(&var) {
                // we are computing P(var | e), so do not eliminate the variable
                continue;
            }

            // Otherwise, time to get rid of var
            let (phi_1prime, phi_2prime): (Vec<Factor>, Vec<Factor>) = phis
                                           .into_iter()
                                           .partition(|f| f.scope().contains(&var));

            // product step - multiply factors with var
            let psi = phi_1prime.iter()
                                .try_fold(Factor::identity(), |acc, phi| acc.product(phi))?;

            // sum step - marginalize psi over var
            let tau = psi.marginalize(var);

            phis = phi_2prime;
            phis.push(tau);
        }

        // multiply together remaining phis
        let phi_star = phis.iter()
                           .try_fold(Factor::identity(), |acc, phi| acc.product(phi))?;

        // now we have an unnormalized distribution. We need the partition function to return a
        // conditional probability.
        phi_star.marginalize_to(variables).normalize()
    }

}
