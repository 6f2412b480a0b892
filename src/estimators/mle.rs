//! Defines `Estimator`s that use Maximum Likelihood Estimation to estimate the value of parameters
//! given a complete, weighted dataset.

use crate::data::DiscreteData;
use crate::factor::{Factor, Table};
use crate::graph::NodeId;
use crate::learning::LearningResult;
use crate::model::DiscreteBayesNet;
use crate::score::{node_score, ScoreType};
use crate::util::{Result, StrataError};
use super::{Estimator, ParameterLearner};

use ndarray::IxDyn;

/// Defines the `LocalMLEstimator`, a Maximum Likelihood `Estimator` for the Conditional
/// Probability Distribution of a single node of a network.
///
/// Implementation of the MLE Parameter Estimation scheme for conditional probability distributions
/// described in Koller & Friedman Section 17.2
pub struct LocalMLEstimator {

    /// The estimated node
    var: NodeId,

    /// The family of the node, parents first
    family: Vec<NodeId>,

    /// Names of the family, used to find the dataset columns
    names: Vec<String>,

    /// Accumulator for the weighted counts
    table: Table

}


impl LocalMLEstimator {

    /// Construct an ML estimator for the CPT of node `id` of `net`
    pub fn new(net: &DiscreteBayesNet, id: NodeId) -> Result<Self> {
        let family = net.family(id);
        let names = family.iter()
                          .map(|&v| net.name(v).map(String::from).ok_or(StrataError::NodeNotFound))
                          .collect::<Result<Vec<String>>>()?;
        let shape = family.iter().map(|&v| net.cardinality(v)).collect::<Result<Vec<usize>>>()?;

        Ok(LocalMLEstimator { var: id, family, names, table: Table::zeros(shape) })
    }

}


impl Estimator<Factor> for LocalMLEstimator {

    /// # Errors
    /// * `StrataError::UnknownVariable` if a family member is not a column of `data`
    /// * `StrataError::InvalidData` if a row misses a value of the family
    fn estimate(&mut self, data: &DiscreteData) -> Result<Factor> {
        // each call to estimate must be independent, so first let's zero the table.
        self.table.fill(0.0);

        let columns = self.names.iter()
                                .map(|n| data.index_of(n).ok_or_else(|| StrataError::UnknownVariable(n.clone())))
                                .collect::<Result<Vec<usize>>>()?;

        // weighted count of every configuration, using self.table as an accumulator
        let mut idx = vec![0; columns.len()];
        for (row, w) in data.instances() {
            for (i, &c) in columns.iter().enumerate() {
                idx[i] = row[c].ok_or_else(|| StrataError::InvalidData(format!("missing value of {}", self.names[i])))?;
            }

            let cell = self.table.get_mut(IxDyn(&idx))
                                 .ok_or_else(|| StrataError::InvalidData(String::from("state out of range")))?;
            *cell += w;
        }

        // theta x|u = M[u, x] / M[u], parent configurations without data become uniform
        Factor::new(self.family.clone(), self.table.clone())?.normalize_conditional(self.var)
    }
}


/// A Maximum likelihood estimator for a `DiscreteBayesNet`
///
/// Based on the decomposability of the likelihood function, each CPD can be estimated separately
/// and therefore the `ModelMLEstimator` is really just a 'bag-o-`LocalMLEstimator`s'
pub struct ModelMLEstimator<'a> {

    /// The model for which to estimate the parameters
    model: &'a DiscreteBayesNet,

    /// The `Estimator` for each local CPD, in node order
    estimators: Vec<LocalMLEstimator>

}


impl<'a> ModelMLEstimator<'a> {

    pub fn new(model: &'a DiscreteBayesNet) -> Result<Self> {
        let estimators = model.node_ids()
                              .map(|id| LocalMLEstimator::new(model, id))
                              .collect::<Result<Vec<LocalMLEstimator>>>()?;

        Ok(ModelMLEstimator { model, estimators })
    }

}


impl<'a> Estimator<DiscreteBayesNet> for ModelMLEstimator<'a> {

    fn estimate(&mut self, data: &DiscreteData) -> Result<DiscreteBayesNet> {
        let mut net = self.model.clone();
        for e in self.estimators.iter_mut() {
            let cpt = e.estimate(data)?;
            net.set_cpt(e.var, cpt)?;
        }

        Ok(net)
    }

}


/// A `ParameterLearner` for complete data: closed form estimates, scored by decomposition
#[derive(Clone, Debug)]
pub struct MleLearner {
    score_type: ScoreType,
    threshold: f64
}


impl MleLearner {

    pub fn new(score_type: ScoreType) -> Self {
        MleLearner { score_type, threshold: 0.0 }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

}


impl Default for MleLearner {
    fn default() -> Self {
        MleLearner::new(ScoreType::Bic)
    }
}


impl ParameterLearner for MleLearner {

    fn learn_model(&self, net: &DiscreteBayesNet, data: &DiscreteData) -> Result<LearningResult> {
        let learned = ModelMLEstimator::new(net)?.estimate(data)?;

        let score = learned.node_ids()
                           .map(|id| node_score(&learned, id, data, self.score_type))
                           .sum::<Result<f64>>()?;

        Ok(LearningResult::new(learned, score, self.score_type, "MLE"))
    }

    fn score_type(&self) -> ScoreType {
        self.score_type
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }

}


/// An edge-less network over the columns of `data`, each node holding its maximum likelihood
/// marginal
pub fn initialize_empty(data: &DiscreteData) -> Result<DiscreteBayesNet> {
    let mut net = DiscreteBayesNet::new();
    for v in data.variables() {
        net.add_node(v.clone())?;
    }

    let ids: Vec<NodeId> = net.node_ids().collect();
    for id in ids {
        let cpt = LocalMLEstimator::new(&net, id)?.estimate(data)?;
        net.set_cpt(id, cpt)?;
    }

    Ok(net)
}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::factor::Assignment;
    use crate::init::Initialization;
    use crate::model::DiscreteBayesNetBuilder;
    use crate::variable::Variable;
    use approx::assert_relative_eq;
    use itertools::iproduct;

    fn manifest(name: &str, card: usize) -> Variable {
        Variable::manifest(name, card).unwrap()
    }

    fn chain(x: usize, y: usize) -> DiscreteBayesNet {
        DiscreteBayesNetBuilder::new()
            .with_variable(manifest("X", x), &[], Initialization::Uniform)
            .with_variable(manifest("Y", y), &["X"], Initialization::Uniform)
            .build()
            .unwrap()
    }

    /// Weighted rows of X and Y
    fn data(x: usize, y: usize, rows: &[(usize, usize, f64)]) -> DiscreteData {
        let mut data = DiscreteData::new(vec![manifest("X", x), manifest("Y", y)]).unwrap();
        for &(a, b, w) in rows {
            data.add_complete(&[a, b], w).unwrap();
        }
        data
    }

    fn values(net: &DiscreteBayesNet, node: &str) -> Vec<f64> {
        let (x, y) = (net.lookup("X").unwrap(), net.lookup("Y").unwrap());
        let id = net.lookup(node).unwrap();
        let cpt = net.cpt(id).unwrap();

        iproduct!(0..net.cardinality(x).unwrap(), 0..net.cardinality(y).unwrap())
            .map(|(a, b)| {
                let mut assn = Assignment::new();
                assn.set(x, a);
                assn.set(y, b);
                cpt.value(&assn).unwrap()
            })
            .collect()
    }

    #[test]
    /// Test MLE of a single, binary variable (a weighted coin)
    fn coin_toss() {
        let net = DiscreteBayesNetBuilder::new()
            .with_variable(manifest("C", 2), &[], Initialization::Multinomial(&[0.5, 0.5]))
            .build()
            .unwrap();
        let c = net.lookup("C").unwrap();

        let mut data = DiscreteData::new(vec![manifest("C", 2)]).unwrap();
        data.add_complete(&[0], 30.0).unwrap();
        data.add_complete(&[1], 70.0).unwrap();

        let mut estimator = LocalMLEstimator::new(&net, c).unwrap();
        let factor = estimator.estimate(&data).unwrap();

        let mut a = Assignment::new();
        a.set(c, 0);
        assert_relative_eq!(0.3, factor.value(&a).unwrap(), epsilon = 1e-12);

        a.set(c, 1);
        assert_relative_eq!(0.7, factor.value(&a).unwrap(), epsilon = 1e-12);

        // estimates are independent of previous calls
        let again = estimator.estimate(&data).unwrap();
        assert_eq!(factor, again);
    }

    #[test]
    /// Test X (binary) -> Y (multinomial) factor
    ///
    /// CPT:
    ///    | y0 | y1 | y2
    /// ---+----+----+----
    /// x0 | .2 | .5 | .3
    /// ---+---------+----
    /// x1 | .8 | .1 | .1
    fn one_parent_binary_discrete() {
        let net = chain(2, 3);
        let data = data(2, 3, &[(0, 0, 20.0), (0, 1, 50.0), (0, 2, 30.0), (1, 0, 8.0), (1, 1, 1.0), (1, 2, 1.0)]);

        let learned = ModelMLEstimator::new(&net).unwrap().estimate(&data).unwrap();
        let expected = [0.2, 0.5, 0.3, 0.8, 0.1, 0.1];
        for (e, a) in expected.iter().zip(values(&learned, "Y")) {
            assert_relative_eq!(*e, a, epsilon = 1e-12);
        }

        // the marginal of X is 100 vs 10
        let x = learned.lookup("X").unwrap();
        let mut a = Assignment::new();
        a.set(x, 0);
        assert_relative_eq!(100.0 / 110.0, learned.cpt(x).unwrap().value(&a).unwrap(), epsilon = 1e-12);
    }

    #[test]
    /// A parent state that never occurs gets a uniform conditional distribution
    fn unseen_parent_state() {
        let net = chain(3, 2);
        let data = data(3, 2, &[(0, 0, 80.0), (0, 1, 20.0), (2, 0, 3.0), (2, 1, 7.0)]);

        let learned = ModelMLEstimator::new(&net).unwrap().estimate(&data).unwrap();
        let expected = [0.8, 0.2, 0.5, 0.5, 0.3, 0.7];
        for (e, a) in expected.iter().zip(values(&learned, "Y")) {
            assert_relative_eq!(*e, a, epsilon = 1e-12);
        }
        assert!(learned.cpt(learned.lookup("Y").unwrap()).unwrap().is_cpd());
    }

    #[test]
    fn incomplete_rows_are_rejected() {
        let net = chain(2, 2);
        let mut data = data(2, 2, &[(0, 0, 1.0)]);
        data.add(vec![Some(1), None], 1.0).unwrap();

        let mut estimator = ModelMLEstimator::new(&net).unwrap();
        match estimator.estimate(&data) {
            Err(StrataError::InvalidData(_)) => (),
            _ => panic!("expected InvalidData")
        }
    }

    #[test]
    /// Test X (binomial) -> Y (binomial) model
    ///
    /// Assuming 1000 samples:
    ///     x0: 300
    ///         y0: 300 * .8 = 240
    ///         y1: 300 * .2 = 60
    ///     x1: 700
    ///         y0: 700 * .5 = 350
    ///         y1: 700 * .5 = 350
    fn one_parent_model() {
        let net = chain(2, 2);
        let data = data(2, 2, &[(0, 0, 240.0), (0, 1, 60.0), (1, 0, 350.0), (1, 1, 350.0)]);

        let learner = MleLearner::new(ScoreType::LogLikelihood);
        let result = learner.learn_model(&net, &data).unwrap();
        let learned = result.model().unwrap();

        let (x, y) = (learned.lookup("X").unwrap(), learned.lookup("Y").unwrap());
        let expected = [0.3 * 0.8, 0.3 * 0.2, 0.7 * 0.5, 0.7 * 0.5];
        for ((a, b), e) in iproduct!(0..2, 0..2).zip(expected.iter()) {
            let mut assn = Assignment::new();
            assn.set(x, a);
            assn.set(y, b);
            assert_relative_eq!(*e, learned.probability(&assn).unwrap(), epsilon = 1e-12);
        }

        let ll = 240.0 * 0.24f64.ln() + 60.0 * 0.06f64.ln() + 700.0 * 0.35f64.ln();
        assert_relative_eq!(ll, result.score(), max_relative = 1e-12);
        assert_eq!("MLE", result.name());

        // the input network is untouched
        let mut assn = Assignment::new();
        assn.set(x, 0);
        assn.set(y, 0);
        assert_relative_eq!(0.25, net.probability(&assn).unwrap());
    }

    #[test]
    fn empty_network_from_data() {
        let data = data(2, 2, &[(0, 0, 240.0), (0, 1, 60.0), (1, 0, 350.0), (1, 1, 350.0)]);
        let net = initialize_empty(&data).unwrap();

        assert_eq!(2, net.num_nodes());
        assert_eq!(0, net.num_edges());

        let y = net.lookup("Y").unwrap();
        let mut a = Assignment::new();
        a.set(y, 0);
        assert_relative_eq!(0.59, net.cpt(y).unwrap().value(&a).unwrap(), epsilon = 1e-12);
    }
}
