//! Information measures over weighted discrete data
//!
//! Entropies use natural logarithms. Missing values are skipped pairwise: a row contributes to
//! the joint counts of two columns only if both are observed.

use crate::data::DiscreteData;
use crate::util::{Result, StrataError};

use itertools::Itertools;

/// How a mutual information value is scaled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MiNormalization {
    /// Raw mutual information
    None,

    /// Divided by `min(H(X), H(Y))`
    Min,

    /// Divided by `max(H(X), H(Y))`
    Max,

    /// Divided by `sqrt(H(X) * H(Y))`
    Sqrt,

    /// Divided by `H(X, Y)`
    Joint
}

impl Default for MiNormalization {
    fn default() -> Self {
        MiNormalization::None
    }
}


/// Entropy of the distribution proportional to `counts`. Zero cells contribute nothing and an
/// empty distribution has entropy zero.
pub fn entropy(counts: &[f64]) -> f64 {
    let total: f64 = counts.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }

    counts.iter()
          .filter(|&&c| c > 0.0)
          .map(|&c| {
              let p = c / total;
              -p * p.ln()
          })
          .sum()
}


/// Mutual information of two columns of a dataset, weighted by the row weights
///
/// # Errors
/// * `StrataError::UnknownVariable` if a name is not a column
pub fn mutual_information(data: &DiscreteData, x: &str, y: &str, norm: MiNormalization) -> Result<f64> {
    let ix = data.index_of(x).ok_or_else(|| StrataError::UnknownVariable(String::from(x)))?;
    let iy = data.index_of(y).ok_or_else(|| StrataError::UnknownVariable(String::from(y)))?;

    let (xs, ys, ws): (Vec<Option<usize>>, Vec<Option<usize>>, Vec<f64>) = data.instances()
        .map(|(row, w)| (row[ix], row[iy], w))
        .multiunzip();

    column_mutual_information(&xs, &ys, &ws, norm)
}


/// Mutual information of two aligned columns with per-row weights
///
/// # Errors
/// * `StrataError::InvalidData` if the slices differ in length
pub fn column_mutual_information(
    x: &[Option<usize>],
    y: &[Option<usize>],
    weights: &[f64],
    norm: MiNormalization
) -> Result<f64> {
    if x.len() != y.len() || x.len() != weights.len() {
        return Err(StrataError::InvalidData(String::from("columns of different lengths")));
    }

    let observed: Vec<(usize, usize, f64)> = x.iter()
                                               .zip(y.iter())
                                               .zip(weights.iter())
                                               .filter_map(|((a, b), &w)| Some(((*a)?, (*b)?, w)))
                                               .collect();

    let cx = observed.iter().map(|&(a, _, _)| a + 1).max().unwrap_or(0);
    let cy = observed.iter().map(|&(_, b, _)| b + 1).max().unwrap_or(0);

    let mut joint = vec![0.0; cx * cy];
    for &(a, b, w) in observed.iter() {
        joint[a * cy + b] += w;
    }

    let px: Vec<f64> = (0..cx).map(|a| joint[a * cy..(a + 1) * cy].iter().sum()).collect();
    let py: Vec<f64> = (0..cy).map(|b| (0..cx).map(|a| joint[a * cy + b]).sum()).collect();

    let (hx, hy, hxy) = (entropy(&px), entropy(&py), entropy(&joint));
    // clamp rounding noise around independence
    let mi = (hx + hy - hxy).max(0.0);

    let denominator = match norm {
        MiNormalization::None => return Ok(mi),
        MiNormalization::Min => hx.min(hy),
        MiNormalization::Max => hx.max(hy),
        MiNormalization::Sqrt => (hx * hy).sqrt(),
        MiNormalization::Joint => hxy
    };

    if denominator > 0.0 {
        Ok(mi / denominator)
    } else {
        Ok(0.0)
    }
}


/// Total correlation `sum_i H(X_i) - H(X_1, ..., X_n)` of all columns of a dataset, the KL
/// divergence between the joint and the product of its marginals. Zero exactly when the columns
/// are independent. Only complete rows are counted.
///
/// # Errors
/// * `StrataError::NotEnoughData` if there is no complete row
pub fn total_correlation(data: &DiscreteData) -> Result<f64> {
    let complete: Vec<(Vec<usize>, f64)> = data.instances()
                                               .filter_map(|(row, w)| {
                                                   row.iter().copied().collect::<Option<Vec<usize>>>().map(|r| (r, w))
                                               })
                                               .collect();
    if complete.is_empty() {
        return Err(StrataError::NotEnoughData);
    }

    let marginals: f64 = data.variables()
                             .iter()
                             .enumerate()
                             .map(|(i, v)| {
                                 let mut counts = vec![0.0; v.cardinality()];
                                 for (row, w) in complete.iter() {
                                     counts[row[i]] += w;
                                 }
                                 entropy(&counts)
                             })
                             .sum();

    // stored rows are distinct, so their weights are the joint counts
    let joint: Vec<f64> = complete.iter().map(|&(_, w)| w).collect();

    Ok((marginals - entropy(&joint)).max(0.0))
}
