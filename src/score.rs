//! Scoring primitives
//!
//! A network score decomposes into one term per node, computed from the weighted counts of the
//! node's family. Local scores can therefore be evaluated for a hypothetical family without
//! touching the rest of the network, which is what the local search operators rely on.

use crate::data::DiscreteData;
use crate::factor::Assignment;
use crate::graph::NodeId;
use crate::inference::CliqueTreePropagation;
use crate::model::DiscreteBayesNet;
use crate::util::{Result, StrataError};
use crate::variable::Variable;

use indexmap::IndexMap;

/// The criterion a learner optimizes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScoreType {
    LogLikelihood,

    /// Bayesian Information Criterion, `ll - dim * ln(N) / 2`
    Bic,

    /// Akaike Information Criterion, `ll - dim`
    Aic,

    /// Evidence lower bound of variational Bayes. Reported by `Vbem` only, it carries no
    /// dimension penalty.
    Elbo
}


impl ScoreType {

    /// Turn a log-likelihood into a score of this type
    ///
    /// # Args
    /// * `ll`: the (weighted) log-likelihood
    /// * `dimension`: the number of free parameters
    /// * `total_weight`: the weighted number of instances the log-likelihood was computed on
    pub fn penalize(self, ll: f64, dimension: usize, total_weight: f64) -> f64 {
        match self {
            ScoreType::LogLikelihood | ScoreType::Elbo => ll,
            ScoreType::Bic => ll - dimension as f64 * total_weight.ln() / 2.0,
            ScoreType::Aic => ll - dimension as f64
        }
    }

}


/// Weighted counts over the joint states of a family of dataset columns.
///
/// Cells are packed into a flat vector by mixed-radix ("magnitude") indexing: the columns keep
/// the order they have in the dataset and the last one varies fastest. Rows missing a value
/// of the family are not counted.
#[derive(Clone, Debug)]
pub struct FamilyCounts {

    /// The family, in dataset column order
    variables: Vec<Variable>,

    /// Stride of each variable in the flat index
    strides: Vec<usize>,

    counts: Vec<f64>

}


impl FamilyCounts {

    /// Count the joint states of the named columns
    ///
    /// # Errors
    /// * `StrataError::UnknownVariable` if a name is not a column of `data`
    pub fn new<S: AsRef<str>>(data: &DiscreteData, family: &[S]) -> Result<Self> {
        let mut columns = Vec::with_capacity(family.len());
        for name in family.iter() {
            let col = data.index_of(name.as_ref())
                          .ok_or_else(|| StrataError::UnknownVariable(String::from(name.as_ref())))?;
            columns.push(col);
        }
        columns.sort_unstable();
        columns.dedup();

        let variables: Vec<Variable> = columns.iter().map(|&c| data.variables()[c].clone()).collect();

        let mut strides = vec![1; variables.len()];
        for i in (0..variables.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * variables[i + 1].cardinality();
        }
        let size = variables.iter().map(|v| v.cardinality()).product();

        let mut counts = vec![0.0; size];
        'rows: for (row, w) in data.instances() {
            let mut idx = 0;
            for (&c, &s) in columns.iter().zip(strides.iter()) {
                match row[c] {
                    Some(state) => idx += state * s,
                    None => continue 'rows
                }
            }
            counts[idx] += w;
        }

        Ok(FamilyCounts { variables, strides, counts })
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Flat index of a joint state given in the order of `variables()`
    pub fn magnitude(&self, states: &[usize]) -> usize {
        states.iter().zip(self.strides.iter()).map(|(s, m)| s * m).sum()
    }

    pub fn count(&self, states: &[usize]) -> f64 {
        self.counts.get(self.magnitude(states)).cloned().unwrap_or(0.0)
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Total weight of the counted rows
    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Frequencies of `var` conditioned on the rest of the family, indexed like `counts()`.
    /// Cells whose conditioning configuration has no weight are left at zero.
    ///
    /// # Errors
    /// * `StrataError::UnknownVariable` if `var` is not part of the family
    pub fn conditional_frequencies(&self, var: &str) -> Result<Vec<f64>> {
        let (stride, card) = self.axis(var)?;
        let mut freqs = vec![0.0; self.counts.len()];

        for idx in 0..self.counts.len() {
            let state = (idx / stride) % card;
            if state != 0 {
                continue;
            }

            let total: f64 = (0..card).map(|k| self.counts[idx + k * stride]).sum();
            if total > 0.0 {
                for k in 0..card {
                    freqs[idx + k * stride] = self.counts[idx + k * stride] / total;
                }
            }
        }

        Ok(freqs)
    }

    /// Maximum likelihood of `var` given the rest of the family: `sum count * ln(frequency)`
    pub fn log_likelihood(&self, var: &str) -> Result<f64> {
        let freqs = self.conditional_frequencies(var)?;
        Ok(self.counts.iter()
                      .zip(freqs.iter())
                      .filter(|(&c, _)| c > 0.0)
                      .map(|(&c, &f)| c * f.ln())
                      .sum())
    }

    /// Free parameters of `var` given the rest of the family
    pub fn dimension(&self, var: &str) -> Result<usize> {
        let (_, card) = self.axis(var)?;
        Ok((card - 1) * self.counts.len() / card)
    }

    fn axis(&self, var: &str) -> Result<(usize, usize)> {
        self.variables.iter()
                      .position(|v| v.name() == var)
                      .map(|i| (self.strides[i], self.variables[i].cardinality()))
                      .ok_or_else(|| StrataError::UnknownVariable(String::from(var)))
    }

}


/// Score of `var` with the given family (which must contain `var`) at its maximum likelihood
/// parameters
pub fn local_score<S: AsRef<str>>(
    data: &DiscreteData,
    var: &str,
    family: &[S],
    score_type: ScoreType
) -> Result<f64> {
    let counts = FamilyCounts::new(data, family)?;
    let ll = counts.log_likelihood(var)?;
    Ok(score_type.penalize(ll, counts.dimension(var)?, data.total_weight()))
}


/// Score of a node of `net` with its current CPT on complete data
///
/// # Errors
/// * `StrataError::UnknownVariable` if a family member is not a column of `data`
pub fn node_score(net: &DiscreteBayesNet, id: NodeId, data: &DiscreteData, score_type: ScoreType) -> Result<f64> {
    let family = net.family(id);
    let names = family_names(net, &family)?;
    let counts = FamilyCounts::new(data, &names)?;
    let cpt = net.cpt(id)?;

    // data column order -> node
    let ordered: Vec<NodeId> = counts.variables()
                                     .iter()
                                     .map(|v| net.lookup(v.name()).ok_or(StrataError::NodeNotFound))
                                     .collect::<Result<Vec<NodeId>>>()?;

    let mut ll = 0.0;
    let mut assignment = Assignment::new();
    for (idx, &c) in counts.counts().iter().enumerate() {
        if c <= 0.0 {
            continue;
        }

        for (i, &v) in ordered.iter().enumerate() {
            let card = counts.variables()[i].cardinality();
            assignment.set(v, (idx / counts.strides[i]) % card);
        }
        ll += c * cpt.value(&assignment)?.ln();
    }

    Ok(score_type.penalize(ll, net.node_dimension(id)?, data.total_weight()))
}


/// Maximum likelihood local score of every node, keyed in node order. Requires every node to
/// be a column of `data`.
pub fn net_scores(net: &DiscreteBayesNet, data: &DiscreteData, score_type: ScoreType) -> Result<IndexMap<NodeId, f64>> {
    net.node_ids()
       .map(|id| {
           let names = family_names(net, &net.family(id))?;
           let name = net.name(id).ok_or(StrataError::NodeNotFound)?;
           Ok((id, local_score(data, name, &names, score_type)?))
       })
       .collect()
}


/// Exact weighted log-likelihood of the data, marginalizing out every node that is not a column
/// of `data` and every missing value
pub fn log_likelihood(net: &DiscreteBayesNet, data: &DiscreteData) -> Result<f64> {
    let columns: Vec<Option<NodeId>> = data.variables().iter().map(|v| net.lookup(v.name())).collect();
    let mut tree = CliqueTreePropagation::new(net)?;

    let mut ll = 0.0;
    for (row, w) in data.instances() {
        let mut evidence = Assignment::new();
        for (col, value) in columns.iter().zip(row.iter()) {
            if let (Some(id), Some(state)) = (col, value) {
                evidence.set(*id, *state);
            }
        }

        tree.set_evidence(&evidence)?;
        let p = tree.propagate()?;
        if p <= 0.0 {
            return Ok(f64::NEG_INFINITY);
        }
        ll += w * p.ln();
    }

    Ok(ll)
}


/// Score of the whole network
pub fn score(net: &DiscreteBayesNet, data: &DiscreteData, score_type: ScoreType) -> Result<f64> {
    let ll = log_likelihood(net, data)?;
    Ok(score_type.penalize(ll, net.dimension(), data.total_weight()))
}


/// Names of a list of nodes
pub(crate) fn family_names(net: &DiscreteBayesNet, family: &[NodeId]) -> Result<Vec<String>> {
    family.iter()
          .map(|&id| net.name(id).map(String::from).ok_or(StrataError::NodeNotFound))
          .collect()
}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::init::Initialization;
    use crate::model::DiscreteBayesNetBuilder;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn manifest(name: &str, card: usize) -> Variable {
        Variable::manifest(name, card).unwrap()
    }

    /// X (binary) -> Y (binary), 1000 rows
    ///     x0: 300 (y0: 240, y1: 60)
    ///     x1: 700 (y0: 350, y1: 350)
    fn chain_data() -> DiscreteData {
        let mut data = DiscreteData::new(vec![manifest("X", 2), manifest("Y", 2)]).unwrap();
        data.add_complete(&[0, 0], 240.0).unwrap();
        data.add_complete(&[0, 1], 60.0).unwrap();
        data.add_complete(&[1, 0], 350.0).unwrap();
        data.add_complete(&[1, 1], 350.0).unwrap();
        data
    }

    #[test]
    fn penalties() {
        assert_eq!(-10.0, ScoreType::LogLikelihood.penalize(-10.0, 3, 100.0));
        assert_eq!(-13.0, ScoreType::Aic.penalize(-10.0, 3, 100.0));
        assert_relative_eq!(-10.0 - 1.5 * 100f64.ln(), ScoreType::Bic.penalize(-10.0, 3, 100.0));
    }

    #[test]
    fn magnitude_indexing() {
        let data = chain_data();

        // family given out of order, counted in column order
        let counts = FamilyCounts::new(&data, &["Y", "X"]).unwrap();
        assert_eq!("X", counts.variables()[0].name());
        assert_eq!(3, counts.magnitude(&[1, 1]));
        assert_eq!(60.0, counts.count(&[0, 1]));
        assert_eq!(1000.0, counts.total());

        let freqs = counts.conditional_frequencies("Y").unwrap();
        assert_relative_eq!(0.8, freqs[0], epsilon = 1e-12);
        assert_relative_eq!(0.5, freqs[3], epsilon = 1e-12);
        assert_eq!(2, counts.dimension("Y").unwrap());

        assert!(FamilyCounts::new(&data, &["Z"]).is_err());
    }

    #[test]
    fn empty_cells_are_guarded() {
        let mut data = DiscreteData::new(vec![manifest("X", 3), manifest("Y", 2)]).unwrap();
        data.add_complete(&[0, 0], 4.0).unwrap();
        data.add_complete(&[0, 1], 4.0).unwrap();

        let counts = FamilyCounts::new(&data, &["X", "Y"]).unwrap();
        let freqs = counts.conditional_frequencies("Y").unwrap();
        assert_eq!(vec![0.5, 0.5, 0.0, 0.0, 0.0, 0.0], freqs);

        let ll = counts.log_likelihood("Y").unwrap();
        assert!(ll.is_finite());
        assert_relative_eq!(8.0 * 0.5f64.ln(), ll, epsilon = 1e-12);
    }

    #[test]
    fn local_scores() {
        let data = chain_data();

        let ll = local_score(&data, "Y", &["X", "Y"], ScoreType::LogLikelihood).unwrap();
        let expected = 240.0 * 0.8f64.ln() + 60.0 * 0.2f64.ln() + 700.0 * 0.5f64.ln();
        assert_relative_eq!(expected, ll, epsilon = 1e-9);

        let bic = local_score(&data, "Y", &["X", "Y"], ScoreType::Bic).unwrap();
        assert_relative_eq!(expected - 1000f64.ln(), bic, epsilon = 1e-9);

        // root
        let root = local_score(&data, "X", &["X"], ScoreType::LogLikelihood).unwrap();
        assert_relative_eq!(300.0 * 0.3f64.ln() + 700.0 * 0.7f64.ln(), root, epsilon = 1e-9);
    }

    #[test]
    /// The log-likelihood of the whole network equals the sum of the node terms
    fn additivity() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut net = DiscreteBayesNetBuilder::new()
            .with_variable(manifest("A", 2), &[], Initialization::Uniform)
            .with_variable(manifest("B", 3), &["A"], Initialization::Uniform)
            .with_variable(manifest("C", 2), &["A", "B"], Initialization::Uniform)
            .with_variable(manifest("D", 2), &["C"], Initialization::Uniform)
            .build()
            .unwrap();
        net.randomly_parameterize(&mut rng).unwrap();

        let data = DiscreteData::sample_from(&net, 300, 21).unwrap();

        let whole = log_likelihood(&net, &data).unwrap();
        let sum: f64 = net.node_ids()
                          .map(|id| node_score(&net, id, &data, ScoreType::LogLikelihood).unwrap())
                          .sum();
        assert_relative_eq!(whole, sum, max_relative = 1e-9);

        let bic: f64 = net.node_ids().map(|id| node_score(&net, id, &data, ScoreType::Bic).unwrap()).sum();
        assert_relative_eq!(score(&net, &data, ScoreType::Bic).unwrap(), bic, max_relative = 1e-9);
    }

    #[test]
    fn net_scores_follow_node_order() {
        let data = chain_data();
        let net = DiscreteBayesNetBuilder::new()
            .with_variable(manifest("X", 2), &[], Initialization::Uniform)
            .with_variable(manifest("Y", 2), &["X"], Initialization::Uniform)
            .build()
            .unwrap();

        let scores = net_scores(&net, &data, ScoreType::LogLikelihood).unwrap();
        let ids: Vec<NodeId> = scores.keys().cloned().collect();
        assert_eq!(net.node_ids().collect::<Vec<NodeId>>(), ids);

        let y = net.lookup("Y").unwrap();
        assert_relative_eq!(local_score(&data, "Y", &["X", "Y"], ScoreType::LogLikelihood).unwrap(), scores[&y]);
    }

    #[test]
    fn marginal_likelihood_with_latent() {
        // H -> X with H hidden: P(X) = sum_h P(h) P(X | h)
        let net = DiscreteBayesNetBuilder::new()
            .with_variable(Variable::latent("H", 2).unwrap(), &[], Initialization::Multinomial(&[0.25, 0.75]))
            .with_variable(manifest("X", 2), &["H"], Initialization::Uniform)
            .build()
            .unwrap();

        let mut data = DiscreteData::new(vec![manifest("X", 2)]).unwrap();
        data.add_complete(&[1], 3.0).unwrap();
        data.add(vec![None], 1.0).unwrap();

        // uniform P(X | H) gives P(X = 1) = 0.5, the missing row contributes ln 1
        assert_relative_eq!(3.0 * 0.5f64.ln(), log_likelihood(&net, &data).unwrap(), epsilon = 1e-12);
        assert_relative_eq!(
            3.0 * 0.5f64.ln() - 3.0 * 4f64.ln() / 2.0,
            score(&net, &data, ScoreType::Bic).unwrap(),
            epsilon = 1e-12
        );
    }
}
