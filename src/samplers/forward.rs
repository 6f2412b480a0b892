//! Defines a simple forward sampler for `DiscreteBayesNet`s
//!
//! Implementation of Koller & Friedman Algorithm 12.1 (pp 489)

use crate::factor::Assignment;
use crate::graph::NodeId;
use crate::model::DiscreteBayesNet;
use crate::util::{Result, StrataError};
use super::Sampler;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Ancestral sampler with its own seeded generator
pub struct ForwardSampler<'a> {

    /// The network to sample
    model: &'a DiscreteBayesNet,

    /// Nodes in topological order
    order: Vec<NodeId>,

    rng: StdRng

}


impl<'a> ForwardSampler<'a> {

    pub fn new(model: &'a DiscreteBayesNet, seed: u64) -> Self {
        ForwardSampler { model, order: model.topological_sort(), rng: StdRng::seed_from_u64(seed) }
    }

}


impl<'a> Sampler for ForwardSampler<'a> {

    fn sample(&mut self) -> Result<Assignment> {
        let mut a = Assignment::new();

        for &id in self.order.iter() {
            // every parent is already assigned, so the reduced CPT is the distribution of id
            let cpd = self.model.cpt(id)?.reduce(&a)?;
            let weights = cpd.table().ok_or(StrataError::InvalidScope)?;

            let dist = WeightedIndex::new(weights.iter()).map_err(|_| StrataError::NonPositiveProbability)?;
            a.set(id, dist.sample(&mut self.rng));
        }

        Ok(a)
    }

}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::data::DiscreteData;
    use crate::factor::Factor;
    use crate::init::Initialization;
    use crate::model::DiscreteBayesNetBuilder;
    use crate::variable::Variable;
    use ndarray::array;

    fn intelligence() -> DiscreteBayesNet {
        let mut model = DiscreteBayesNetBuilder::new()
            .with_variable(Variable::manifest("I", 2).unwrap(), &[], Initialization::Multinomial(&[0.7, 0.3]))
            .with_variable(Variable::latent("S", 2).unwrap(), &["I"], Initialization::Uniform)
            .build()
            .unwrap();

        let (i, s) = (model.lookup("I").unwrap(), model.lookup("S").unwrap());
        let sfactor = Factor::cpd(s, &[i], array![[0.95, 0.05], [0.2, 0.8]].into_dyn()).unwrap();
        model.set_cpt(s, sfactor).unwrap();
        model
    }

    #[test]
    fn sample() {
        let model = intelligence();
        let (i, s) = (model.lookup("I").unwrap(), model.lookup("S").unwrap());
        let mut sampler = ForwardSampler::new(&model, 42);

        let mut ones = 0;
        for _ in 0..2000 {
            let a = sampler.sample().unwrap();
            assert!(a.get(i).unwrap() <= 1);
            assert!(a.get(s).unwrap() <= 1);
            ones += a.get(i).unwrap();
        }

        // P(I = 1) = 0.3
        let freq = ones as f64 / 2000.0;
        assert!((freq - 0.3).abs() < 0.05, "{}", freq);
    }

    #[test]
    fn seeded_datasets() {
        let model = intelligence();
        let a = DiscreteData::sample_from(&model, 100, 3).unwrap();
        let b = DiscreteData::sample_from(&model, 100, 3).unwrap();

        // latent variables are not part of the data
        assert_eq!(1, a.variables().len());
        assert_eq!(100.0, a.total_weight());
        assert_eq!(
            a.instances().map(|(r, w)| (r.clone(), w)).collect::<Vec<_>>(),
            b.instances().map(|(r, w)| (r.clone(), w)).collect::<Vec<_>>()
        );

        assert!(DiscreteData::sample_from(&model, 0, 3).is_err());
    }
}
