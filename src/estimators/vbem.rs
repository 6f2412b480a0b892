//! Variational Bayes EM with symmetric Dirichlet priors on every conditional distribution.
//!
//! The posterior over the parameters of a node is a product of Dirichlets, one per parent
//! configuration, stored as a table of concentrations over the node's family. The E-step runs
//! inference with the expected-log parameters `exp(E[ln theta])` as unnormalized potentials, the
//! M-step adds the expected counts to the prior. The bound optimized is
//!
//! ```text
//! ELBO = sum_rows w * ln Z~(row) - sum_nodes KL(q(theta) || p(theta))
//! ```

use crate::data::DiscreteData;
use crate::factor::{Factor, Table};
use crate::graph::NodeId;
use crate::inference::CliqueTreePropagation;
use crate::learning::LearningResult;
use crate::model::DiscreteBayesNet;
use crate::score::ScoreType;
use crate::util::{invalid_config, Result, StrataError};
use super::{manifest_view, row_evidence, ParameterLearner};

use log::{debug, trace};
use ndarray::{Axis, Zip};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use statrs::function::gamma::{digamma, ln_gamma};

use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq)]
pub struct VbemConfig {

    /// Concentration of every cell of the Dirichlet priors
    pub alpha: f64,

    /// Minimum gain of the bound to keep iterating
    pub threshold: f64,

    pub max_steps: usize,

    /// Number of starting points. The first is the input network, the others are random.
    pub restarts: usize,

    pub seed: u64

}


impl Default for VbemConfig {
    fn default() -> Self {
        VbemConfig { alpha: 1.0, threshold: 0.01, max_steps: 500, restarts: 1, seed: 0 }
    }
}


impl VbemConfig {

    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0) || !self.alpha.is_finite() {
            return invalid_config("the Dirichlet concentration must be positive");
        }

        if !(self.threshold >= 0.0) {
            return invalid_config("the VBEM threshold must be nonnegative");
        }

        if self.max_steps == 0 || self.restarts == 0 {
            return invalid_config("VBEM needs at least one step and one start");
        }

        Ok(())
    }

}


/// Variational Bayes EM. The learned network holds the posterior mean parameters and is scored
/// with `ScoreType::Elbo`.
#[derive(Clone, Debug)]
pub struct Vbem {
    config: VbemConfig
}


impl Vbem {

    /// # Errors
    /// * `StrataError::InvalidConfiguration` if the configuration does not validate
    pub fn new(config: VbemConfig) -> Result<Self> {
        config.validate()?;
        Ok(Vbem { config })
    }

    /// Run one start to convergence. Returns the posterior mean network, the final bound and
    /// the bound after every step.
    ///
    /// The last step only scores: the returned means come from the posterior its bound was
    /// computed for, not from a further M-step.
    fn run(&self, mut net: DiscreteBayesNet, data: &DiscreteData, columns: &[NodeId]) -> Result<(DiscreteBayesNet, f64, Vec<f64>)> {
        let alpha = self.config.alpha;
        let ids: Vec<NodeId> = net.node_ids().collect();

        // the starting CPTs act as a point mass of the data's size spread over the parent
        // configurations
        let mut posterior: HashMap<NodeId, Table> = HashMap::with_capacity(ids.len());
        for &id in ids.iter() {
            let cpt = net.cpt(id)?;
            let table = cpt.table().ok_or(StrataError::NotACPD)?;
            let configs = (table.len() / net.cardinality(id)?).max(1) as f64;
            posterior.insert(id, table.mapv(|p| alpha + p * data.total_weight() / configs));
        }

        let mut tree = CliqueTreePropagation::new(&net)?;
        let mut history = Vec::new();
        let mut previous = f64::NEG_INFINITY;

        for step in 0..self.config.max_steps {
            // E-step with the expected log parameters
            let potentials = ids.iter()
                                .map(|&id| Ok((id, Factor::new(net.family(id), expected_log_weights(&posterior[&id]))?)))
                                .collect::<Result<HashMap<NodeId, Factor>>>()?;
            tree.set_node_potentials(&potentials)?;

            let mut counts: HashMap<NodeId, Table> = ids.iter()
                                                        .map(|&id| (id, Table::zeros(posterior[&id].shape())))
                                                        .collect();
            let mut bound = 0.0;
            for (row, w) in data.instances() {
                tree.set_evidence(&row_evidence(columns, row))?;
                tree.propagate()?;
                let log_z = tree.log_evidence().unwrap_or(f64::NEG_INFINITY);
                if log_z == f64::NEG_INFINITY {
                    return Err(StrataError::NonPositiveProbability);
                }
                bound += w * log_z;

                for &id in ids.iter() {
                    let belief = tree.family_belief(id)?;
                    if let (Some(acc), Some(table)) = (counts.get_mut(&id), belief.table()) {
                        acc.scaled_add(w, table);
                    }
                }
            }

            for &id in ids.iter() {
                bound -= dirichlet_kl(&posterior[&id], alpha);
            }

            history.push(bound);
            trace!("VBEM step {}: {:.6}", step + 1, bound);
            if bound - previous <= self.config.threshold || step + 1 == self.config.max_steps {
                break;
            }
            previous = bound;

            // M-step
            for (id, c) in counts.into_iter() {
                posterior.insert(id, c.mapv(|n| n + alpha));
            }
        }

        for &id in ids.iter() {
            let mean = Factor::new(net.family(id), posterior[&id].clone())?.normalize_conditional(id)?;
            net.set_cpt(id, mean)?;
        }

        let bound = history.last().cloned().unwrap_or(f64::NEG_INFINITY);
        Ok((net, bound, history))
    }

}


impl ParameterLearner for Vbem {

    fn learn_model(&self, net: &DiscreteBayesNet, data: &DiscreteData) -> Result<LearningResult> {
        let (data, columns) = manifest_view(net, data)?;

        let runs = (0..self.config.restarts)
            .into_par_iter()
            .map(|r| {
                let mut start = net.clone();
                if r > 0 {
                    let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(r as u64));
                    start.randomly_parameterize(&mut rng)?;
                }
                self.run(start, &data, &columns)
            })
            .collect::<Result<Vec<(DiscreteBayesNet, f64, Vec<f64>)>>>()?;

        // strictly better only, so the earliest start wins ties
        let mut best: Option<(DiscreteBayesNet, f64, Vec<f64>)> = None;
        for run in runs {
            if best.as_ref().map_or(true, |b| run.1 > b.1) {
                best = Some(run);
            }
        }

        let (model, bound, history) = best.ok_or_else(|| StrataError::InvalidConfiguration(String::from("no VBEM starts")))?;
        debug!("VBEM finished with bound {:.6}", bound);
        Ok(LearningResult::new(model, bound, ScoreType::Elbo, "VBEM").with_history(history))
    }

    fn score_type(&self) -> ScoreType {
        ScoreType::Elbo
    }

    fn threshold(&self) -> f64 {
        self.config.threshold
    }

}


/// `exp(psi(a) - psi(sum a))` along the last axis of a table of concentrations
fn expected_log_weights(concentrations: &Table) -> Table {
    let ax = Axis(concentrations.ndim() - 1);
    let sums = concentrations.sum_axis(ax).insert_axis(ax);

    let mut out = concentrations.clone();
    Zip::from(&mut out).and_broadcast(&sums).for_each(|a, &s| {
        *a = (digamma(*a) - digamma(s)).exp();
    });
    out
}


/// KL divergence from the symmetric Dirichlet prior of concentration `alpha` to the posterior,
/// summed over the parent configurations (the rows along the last axis)
fn dirichlet_kl(posterior: &Table, alpha: f64) -> f64 {
    let ax = Axis(posterior.ndim() - 1);
    let k = posterior.len_of(ax) as f64;

    posterior.lanes(ax)
             .into_iter()
             .map(|row| {
                 let total: f64 = row.sum();
                 let psi_total = digamma(total);
                 let cells: f64 = row.iter()
                                     .map(|&a| (a - alpha) * (digamma(a) - psi_total) - ln_gamma(a) + ln_gamma(alpha))
                                     .sum();
                 ln_gamma(total) - ln_gamma(k * alpha) + cells
             })
             .sum()
}
