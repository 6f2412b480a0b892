//! Chow-Liu trees: the maximum weight spanning tree of the pairwise mutual information
//! between the columns of a dataset, oriented away from a root.

use crate::data::DiscreteData;
use crate::estimators::ParameterLearner;
use crate::graph::{NodeId, UndirectedGraph};
use crate::information::{column_mutual_information, MiNormalization};
use crate::learning::LearningResult;
use crate::model::DiscreteBayesNet;
use crate::util::{Result, StrataError};

use itertools::Itertools;
use log::debug;

use std::collections::VecDeque;

#[derive(Clone, Debug, Default)]
pub struct ChowLiu {
    normalization: MiNormalization,

    /// Column the tree is grown from and oriented away from; the first column when unset
    root: Option<String>
}


impl ChowLiu {

    pub fn new(normalization: MiNormalization) -> Self {
        ChowLiu { normalization, root: None }
    }

    pub fn with_root(mut self, name: &str) -> Self {
        self.root = Some(String::from(name));
        self
    }

    fn root_index(&self, data: &DiscreteData) -> Result<usize> {
        match self.root.as_ref() {
            Some(name) => data.index_of(name).ok_or_else(|| StrataError::UnknownVariable(name.clone())),
            None => Ok(0)
        }
    }

    /// The spanning tree over the columns of `data`, one node per column in column order. Prim's
    /// algorithm from the root; among equal weights the earliest column is attached first.
    ///
    /// # Errors
    /// * `StrataError::NotEnoughData` if `data` has no columns
    /// * `StrataError::UnknownVariable` if the root is not a column
    pub fn spanning_tree(&self, data: &DiscreteData) -> Result<UndirectedGraph<String>> {
        let n = data.variables().len();
        if n == 0 {
            return Err(StrataError::NotEnoughData);
        }
        let root = self.root_index(data)?;

        let weights: Vec<f64> = data.instances().map(|(_, w)| w).collect();
        let columns: Vec<Vec<Option<usize>>> = (0..n).map(|i| data.instances().map(|(row, _)| row[i]).collect())
                                                     .collect();

        let mut mi = vec![vec![0.0; n]; n];
        for (i, j) in (0..n).tuple_combinations() {
            let value = column_mutual_information(&columns[i], &columns[j], &weights, self.normalization)?;
            mi[i][j] = value;
            mi[j][i] = value;
        }

        let mut tree = UndirectedGraph::new();
        let ids: Vec<NodeId> = data.variables().iter().map(|v| tree.add_node(String::from(v.name()))).collect();

        // best known attachment of every column outside the tree
        let mut attached = vec![false; n];
        let mut link: Vec<(f64, usize)> = (0..n).map(|j| (mi[root][j], root)).collect();
        attached[root] = true;

        for _ in 1..n {
            let mut next: Option<usize> = None;
            for j in (0..n).filter(|&j| !attached[j]) {
                if next.map_or(true, |k| link[j].0 > link[k].0) {
                    next = Some(j);
                }
            }

            let j = next.ok_or(StrataError::NotEnoughData)?;
            attached[j] = true;
            tree.add_edge(ids[link[j].1], ids[j])?;
            debug!("Chow-Liu edge {} - {} ({:.4})", data.variables()[link[j].1].name(), data.variables()[j].name(), link[j].0);

            for k in (0..n).filter(|&k| !attached[k]) {
                if mi[j][k] > link[k].0 {
                    link[k] = (mi[j][k], j);
                }
            }
        }

        Ok(tree)
    }

    /// Orient the spanning tree away from the root and fit its parameters with `learner`
    pub fn learn_model(&self, data: &DiscreteData, learner: &dyn ParameterLearner) -> Result<LearningResult> {
        let tree = self.spanning_tree(data)?;
        let root = self.root_index(data)?;

        let mut net = DiscreteBayesNet::new();
        let nodes = data.variables()
                        .iter()
                        .map(|v| net.add_node(v.clone()))
                        .collect::<Result<Vec<NodeId>>>()?;

        // tree node ids follow the column order
        let ids: Vec<NodeId> = tree.node_ids().collect();
        let mut visited = vec![false; ids.len()];
        let mut queue = VecDeque::new();
        visited[root] = true;
        queue.push_back(root);

        while let Some(parent) = queue.pop_front() {
            for &neighbor in tree.neighbors(ids[parent]) {
                let child = ids.iter().position(|&id| id == neighbor).ok_or(StrataError::NodeNotFound)?;
                if !visited[child] {
                    visited[child] = true;
                    net.add_edge(nodes[child], nodes[parent])?;
                    queue.push_back(child);
                }
            }
        }

        Ok(learner.learn_model(&net, data)?.with_name("ChowLiu"))
    }

}
