//! Defines the `Sampler` trait - an object that can randomly sample from a `DiscreteBayesNet`.

use crate::data::DiscreteData;
use crate::factor::Assignment;
use crate::model::DiscreteBayesNet;
use crate::util::{Result, StrataError};

mod forward;

pub use self::forward::ForwardSampler;

pub trait Sampler {

    /// Draw a full assignment to the variables of the associated model
    fn sample(&mut self) -> Result<Assignment>;

}


impl DiscreteData {

    /// Draw `n` rows over the manifest variables of `net` by forward sampling, each with unit
    /// weight (identical draws are merged)
    ///
    /// # Errors
    /// * `StrataError::NotEnoughData` if `n` is zero
    pub fn sample_from(net: &DiscreteBayesNet, n: usize, seed: u64) -> Result<Self> {
        if n == 0 {
            return Err(StrataError::NotEnoughData);
        }

        let manifest = net.manifest_nodes();
        let variables = manifest.iter()
                                .map(|&id| net.variable(id).cloned())
                                .collect::<Result<Vec<_>>>()?;

        let mut data = DiscreteData::new(variables)?;
        let mut sampler = ForwardSampler::new(net, seed);
        for _ in 0..n {
            let a = sampler.sample()?;
            let row = manifest.iter().map(|&id| a.get(id)).collect();
            data.add(row, 1.0)?;
        }

        Ok(data)
    }

}
