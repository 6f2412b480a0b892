//! Expectation-Maximization for networks with latent variables or missing values.
//!
//! The E-step propagates every distinct row through a clique tree and accumulates the weighted
//! family beliefs of the updated nodes; the M-step normalizes them into CPTs. The score of a
//! step is the penalized log-likelihood of the parameters the step started from.

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
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// How EM picks its starting point
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmInitialization {
    /// Start from the parameters of the input network
    None,

    /// Run a tournament of `candidates` starting points (the input and random ones). Every round
    /// runs each remaining candidate for up to a per-round number of steps, starting at 1 and
    /// doubling up to `iterations`, then keeps the better half.
    Pyramid { iterations: usize, candidates: usize },

    /// Chickering & Heckerman: run every candidate for `iterations` steps, then halve the field
    /// in rounds of growing length, bounded by the global step cap
    ChickeringHeckerman { iterations: usize, candidates: usize }
}


impl Default for EmInitialization {
    fn default() -> Self {
        EmInitialization::Pyramid { iterations: 16, candidates: 64 }
    }
}


/// Configuration of `Em` and `LocalEm`
#[derive(Clone, Debug, PartialEq)]
pub struct EmConfig {

    /// Seed of the random starting points
    pub seed: u64,

    /// Minimum score gain of a step to keep iterating
    pub threshold: f64,

    /// Cap on the number of EM steps, initialization included
    pub max_steps: usize,

    pub initialization: EmInitialization,

    /// With `ChickeringHeckerman`, use the input parameters as the first candidate
    pub reuse: bool,

    pub score_type: ScoreType,

    /// Names of the nodes whose CPTs are never updated nor randomized
    pub dont_update: HashSet<String>

}


impl Default for EmConfig {
    fn default() -> Self {
        EmConfig {
            seed: 0,
            threshold: 0.01,
            max_steps: 500,
            initialization: EmInitialization::default(),
            reuse: false,
            score_type: ScoreType::Bic,
            dont_update: HashSet::new()
        }
    }
}


impl EmConfig {

    /// The default configuration with a different seed
    pub fn with_seed(seed: u64) -> Self {
        EmConfig { seed, ..Default::default() }
    }

    /// # Errors
    /// * `StrataError::InvalidConfiguration` if a value cannot be run with
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold >= 0.0) {
            return invalid_config("the EM threshold must be nonnegative");
        }

        if self.max_steps == 0 {
            return invalid_config("EM needs at least one step");
        }

        if self.score_type == ScoreType::Elbo {
            return invalid_config("EM does not compute an evidence lower bound");
        }

        match self.initialization {
            EmInitialization::Pyramid { iterations, candidates }
            | EmInitialization::ChickeringHeckerman { iterations, candidates } => {
                if iterations == 0 || candidates == 0 {
                    return invalid_config("EM initialization needs iterations and candidates");
                }
            },
            EmInitialization::None => ()
        }

        Ok(())
    }

}


/// Expectation-Maximization over every node of the network but the frozen ones
#[derive(Clone, Debug)]
pub struct Em {
    config: EmConfig
}


impl Em {

    /// # Errors
    /// * `StrataError::InvalidConfiguration` if the configuration does not validate
    pub fn new(config: EmConfig) -> Result<Self> {
        config.validate()?;
        Ok(Em { config })
    }

    pub fn config(&self) -> &EmConfig {
        &self.config
    }

}


impl ParameterLearner for Em {

    fn learn_model(&self, net: &DiscreteBayesNet, data: &DiscreteData) -> Result<LearningResult> {
        let mutable: Vec<NodeId> = net.node_ids()
                                      .filter(|&id| net.name(id).map_or(false, |n| !self.config.dont_update.contains(n)))
                                      .collect();

        Runner::new(&self.config, mutable).learn(net, data, "EM")
    }

    fn score_type(&self) -> ScoreType {
        self.config.score_type
    }

    fn threshold(&self) -> f64 {
        self.config.threshold
    }

}


/// EM restricted to a set of nodes. Only their CPTs are re-estimated and only they are
/// randomized by the initialization; every other CPT is frozen. The whole network is scored.
#[derive(Clone, Debug)]
pub struct LocalEm {
    mutable: Vec<String>,
    config: EmConfig
}


impl LocalEm {

    /// # Errors
    /// * `StrataError::InvalidConfiguration` if the configuration does not validate
    pub fn new<S: AsRef<str>>(mutable: &[S], config: EmConfig) -> Result<Self> {
        config.validate()?;
        Ok(LocalEm { mutable: mutable.iter().map(|s| String::from(s.as_ref())).collect(), config })
    }

    pub fn mutable(&self) -> &[String] {
        &self.mutable
    }

}


impl ParameterLearner for LocalEm {

    /// # Errors
    /// * `StrataError::UnknownVariable` if a mutable node is not part of `net`
    fn learn_model(&self, net: &DiscreteBayesNet, data: &DiscreteData) -> Result<LearningResult> {
        let mutable = self.mutable.iter()
                                  .map(|n| net.lookup(n).ok_or_else(|| StrataError::UnknownVariable(n.clone())))
                                  .collect::<Result<Vec<NodeId>>>()?;

        Runner::new(&self.config, mutable).learn(net, data, "LocalEM")
    }

    fn score_type(&self) -> ScoreType {
        self.config.score_type
    }

    fn threshold(&self) -> f64 {
        self.config.threshold
    }

}


/// A network under optimization with its compiled tree
struct Candidate {
    net: DiscreteBayesNet,
    tree: CliqueTreePropagation,

    /// Score of the last step
    score: f64
}


impl Candidate {
    fn new(net: DiscreteBayesNet) -> Result<Self> {
        let tree = CliqueTreePropagation::new(&net)?;
        Ok(Candidate { net, tree, score: f64::NEG_INFINITY })
    }
}


/// Sort candidates by descending score, keeping the order of ties
fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}


/// The EM loop shared by `Em` and `LocalEm`
struct Runner<'c> {
    config: &'c EmConfig,

    /// Nodes whose CPTs are re-estimated, in node order
    mutable: Vec<NodeId>
}


impl<'c> Runner<'c> {

    fn new(config: &'c EmConfig, mutable: Vec<NodeId>) -> Self {
        Runner { config, mutable }
    }

    fn learn(&self, net: &DiscreteBayesNet, data: &DiscreteData, name: &str) -> Result<LearningResult> {
        let (data, columns) = manifest_view(net, data)?;
        let max_steps = self.config.max_steps;

        let (mut candidate, mut steps) = self.start(net, &data, &columns)?;

        let mut previous = self.step(&mut candidate, &data, &columns)?;
        steps += 1;
        let mut history = vec![previous];

        let mut score = previous;
        while steps < max_steps {
            score = self.step(&mut candidate, &data, &columns)?;
            steps += 1;
            history.push(score);
            trace!("{} step {}: {:.6}", name, steps, score);

            if score - previous <= self.config.threshold {
                break;
            }
            previous = score;
        }

        debug!("{} converged after {} steps with score {:.6}", name, steps, score);
        Ok(LearningResult::new(candidate.net, score, self.config.score_type, name).with_history(history))
    }

    /// One EM step on a candidate. Returns the score of the parameters it started from.
    fn step(&self, candidate: &mut Candidate, data: &DiscreteData, columns: &[NodeId]) -> Result<f64> {
        let mut stats: HashMap<NodeId, Table> = HashMap::with_capacity(self.mutable.len());
        for &id in self.mutable.iter() {
            let shape = candidate.net.family(id)
                                     .iter()
                                     .map(|&v| candidate.net.cardinality(v))
                                     .collect::<Result<Vec<usize>>>()?;
            stats.insert(id, Table::zeros(shape));
        }

        let mut ll = 0.0;
        for (row, w) in data.instances() {
            candidate.tree.set_evidence(&row_evidence(columns, row))?;
            candidate.tree.propagate()?;

            // an impossible row has no beliefs to collect
            let log_p = candidate.tree.log_evidence().unwrap_or(f64::NEG_INFINITY);
            if log_p == f64::NEG_INFINITY {
                ll = f64::NEG_INFINITY;
                continue;
            }
            ll += w * log_p;

            for &id in self.mutable.iter() {
                let belief = candidate.tree.family_belief(id)?;
                if let (Some(acc), Some(table)) = (stats.get_mut(&id), belief.table()) {
                    acc.scaled_add(w, table);
                }
            }
        }

        for &id in self.mutable.iter() {
            let counts = stats.remove(&id).ok_or(StrataError::NodeNotFound)?;
            let cpt = Factor::new(candidate.net.family(id), counts)?.normalize_conditional(id)?;
            candidate.net.set_cpt(id, cpt)?;
        }
        candidate.tree.update_potentials(&candidate.net)?;

        candidate.score = self.config.score_type.penalize(ll, candidate.net.dimension(), data.total_weight());
        Ok(candidate.score)
    }

    /// Run up to `steps` steps, stopping at the first one that does not gain more than the
    /// threshold
    fn advance(&self, candidate: &mut Candidate, data: &DiscreteData, columns: &[NodeId], steps: usize) -> Result<()> {
        for _ in 0..steps {
            let last = candidate.score;
            let score = self.step(candidate, data, columns)?;
            if score - last <= self.config.threshold {
                break;
            }
        }
        Ok(())
    }

    /// The input network followed by `n - 1` copies with random parameters on the mutable nodes.
    /// Copy `i` draws from its own generator seeded with `seed + i`.
    fn candidates(&self, net: &DiscreteBayesNet, n: usize, keep_first: bool) -> Result<Vec<Candidate>> {
        (0..n).into_par_iter()
              .map(|i| {
                  let mut copy = net.clone();
                  if i > 0 || !keep_first {
                      let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(i as u64));
                      copy.randomly_parameterize_nodes(&self.mutable, &mut rng)?;
                  }
                  Candidate::new(copy)
              })
              .collect()
    }

    /// Pick the starting point. Returns it with the number of steps spent on the choice that
    /// count against the step cap.
    fn start(&self, net: &DiscreteBayesNet, data: &DiscreteData, columns: &[NodeId]) -> Result<(Candidate, usize)> {
        match self.config.initialization {
            EmInitialization::None => Ok((Candidate::new(net.clone())?, 0)),
            EmInitialization::Pyramid { iterations, candidates } => {
                Ok((self.pyramid(net, data, columns, iterations, candidates)?, 0))
            },
            EmInitialization::ChickeringHeckerman { iterations, candidates } => {
                self.chickering_heckerman(net, data, columns, iterations, candidates)
            }
        }
    }

    fn pyramid(
        &self,
        net: &DiscreteBayesNet,
        data: &DiscreteData,
        columns: &[NodeId],
        iterations: usize,
        n: usize
    ) -> Result<Candidate> {
        let mut candidates = self.candidates(net, n, true)?;

        let mut alive = n;
        let mut steps_per_round = 1;
        while alive > 1 {
            candidates[..alive].par_iter_mut()
                               .try_for_each(|c| self.advance(c, data, columns, steps_per_round))?;

            rank(&mut candidates[..alive]);
            alive /= 2;
            steps_per_round = (steps_per_round * 2).min(iterations);
        }

        debug!("pyramid initialization picked a start with score {:.6}", candidates[0].score);
        candidates.into_iter().next().ok_or_else(|| StrataError::InvalidConfiguration(String::from("no EM candidates")))
    }

    fn chickering_heckerman(
        &self,
        net: &DiscreteBayesNet,
        data: &DiscreteData,
        columns: &[NodeId],
        iterations: usize,
        n: usize
    ) -> Result<(Candidate, usize)> {
        let max_steps = self.config.max_steps;
        let mut candidates = self.candidates(net, n, self.config.reuse)?;

        candidates.par_iter_mut()
                  .try_for_each(|c| -> Result<()> {
                      for _ in 0..iterations {
                          self.step(c, data, columns)?;
                      }
                      Ok(())
                  })?;
        let mut steps = iterations;

        let mut alive = n;
        let mut steps_per_round = 1;
        'rounds: while alive > 1 && steps < max_steps {
            for _ in 0..steps_per_round {
                let improved = candidates[..alive].par_iter_mut()
                    .map(|c| -> Result<bool> {
                        let last = c.score;
                        let score = self.step(c, data, columns)?;
                        Ok(score - last > self.config.threshold || last == f64::NEG_INFINITY)
                    })
                    .collect::<Result<Vec<bool>>>()?;
                steps += 1;

                if !improved.into_iter().any(|b| b) {
                    rank(&mut candidates[..alive]);
                    break 'rounds;
                }
            }

            rank(&mut candidates[..alive]);
            alive /= 2;
            steps_per_round = (steps_per_round * 2).min(max_steps.saturating_sub(steps));
        }

        let best = candidates.into_iter().next().ok_or_else(|| StrataError::InvalidConfiguration(String::from("no EM candidates")))?;
        Ok((best, steps))
    }

}
