//! Exact inference by message passing over a clique tree.
//!
//! The tree is compiled once from a network (Koller & Friedman 10.4): the moral graph is
//! triangulated by min-fill elimination, the maximal elimination cliques are joined by a
//! maximum-weight spanning tree and every CPT is assigned to a clique holding its family.
//! Propagation is Shafer-Shenoy: a collect pass towards the root followed by a distribute pass.
//! Collect messages are scaled to sum to one and the scale factors are accumulated in log space,
//! so the probability of the evidence is available without underflow.

use crate::factor::{Assignment, Factor, Table};
use crate::graph::NodeId;
use crate::model::DiscreteBayesNet;
use crate::util::{Result, StrataError};
use super::ConditionalInferenceEngine;

use std::collections::{BTreeMap, BTreeSet, HashMap};

struct Clique {

    /// Sorted scope of the clique
    vars: Vec<NodeId>,

    /// Nodes whose CPT is multiplied into this clique
    assigned: Vec<NodeId>,

    /// Product of the assigned CPTs, over `vars`
    potential: Factor,

    /// Adjacent cliques in the tree
    neighbors: Vec<usize>

}


pub struct CliqueTreePropagation {

    /// Revision of the network the tree was compiled from
    revision: u64,

    cliques: Vec<Clique>,

    /// For every node: its family and the clique its CPT was assigned to
    families: HashMap<NodeId, (Vec<NodeId>, usize)>,

    /// For every node: the first clique that contains it
    home: HashMap<NodeId, usize>,

    cards: HashMap<NodeId, usize>,

    evidence: Assignment,

    /// Normalized clique beliefs of the last propagation
    beliefs: Vec<Factor>,

    /// ln P(evidence) of the last propagation
    log_evidence: Option<f64>

}


impl CliqueTreePropagation {

    /// Compile the clique tree of a network
    pub fn new(net: &DiscreteBayesNet) -> Result<Self> {
        let cards = net.node_ids()
                       .map(|id| Ok((id, net.cardinality(id)?)))
                       .collect::<Result<HashMap<NodeId, usize>>>()?;

        ///////////////////////////////////////////////////////////////////////
        // 1) triangulate the moral graph and keep the maximal cliques
        let sets = maximal(triangulate(net, &cards));

        ///////////////////////////////////////////////////////////////////////
        // 2) join them with a maximum-weight spanning tree (Prim). Every pair of cliques is a
        //    candidate, so disconnected components are joined through empty separators.
        let n = sets.len();
        let mut neighbors = vec![Vec::new(); n];
        let mut in_tree = vec![false; n];
        if n > 0 {
            in_tree[0] = true;
        }

        for _ in 1..n {
            let mut best: Option<(usize, usize, usize)> = None;
            for a in (0..n).filter(|&a| in_tree[a]) {
                for b in (0..n).filter(|&b| !in_tree[b]) {
                    let w = sets[a].intersection(&sets[b]).count();
                    if best.map_or(true, |(_, _, bw)| w > bw) {
                        best = Some((a, b, w));
                    }
                }
            }

            if let Some((a, b, _)) = best {
                in_tree[b] = true;
                neighbors[a].push(b);
                neighbors[b].push(a);
            }
        }

        ///////////////////////////////////////////////////////////////////////
        // 3) assign every family to a clique
        let mut families = HashMap::new();
        let mut home = HashMap::new();
        let mut assigned = vec![Vec::new(); n];

        for id in net.node_ids() {
            let family = net.family(id);
            let c = sets.iter()
                        .position(|s| family.iter().all(|v| s.contains(v)))
                        .ok_or_else(|| StrataError::General(String::from("no clique holds a family")))?;
            let h = sets.iter().position(|s| s.contains(&id)).unwrap_or(c);

            assigned[c].push(id);
            families.insert(id, (family, c));
            home.insert(id, h);
        }

        let cliques = sets.into_iter()
                          .zip(assigned.into_iter())
                          .zip(neighbors.into_iter())
                          .map(|((s, a), nb)| Clique {
                              vars: s.into_iter().collect(),
                              assigned: a,
                              potential: Factor::identity(),
                              neighbors: nb
                          })
                          .collect();

        let mut tree = CliqueTreePropagation {
            revision: net.revision(),
            cliques,
            families,
            home,
            cards,
            evidence: Assignment::new(),
            beliefs: Vec::new(),
            log_evidence: None
        };

        tree.load_potentials(net)?;
        Ok(tree)
    }

    /// Reload the CPTs of the network the tree was compiled from, after its parameters changed
    ///
    /// # Errors
    /// * `StrataError::StaleModel` if the structure or a cardinality of the network changed
    pub fn update_potentials(&mut self, net: &DiscreteBayesNet) -> Result<()> {
        if net.revision() != self.revision {
            return Err(StrataError::StaleModel);
        }

        self.load_potentials(net)
    }

    /// Scopes of the cliques, for inspection
    pub fn clique_scopes(&self) -> Vec<&[NodeId]> {
        self.cliques.iter().map(|c| c.vars.as_slice()).collect()
    }

    /// Replace the evidence. The previous beliefs are discarded.
    ///
    /// # Errors
    /// * `StrataError::NodeNotFound` if a variable is not in the tree
    /// * `StrataError::InvalidScope` if a state is out of range
    pub fn set_evidence(&mut self, evidence: &Assignment) -> Result<()> {
        for (v, s) in evidence.iter() {
            match self.cards.get(&v) {
                None => return Err(StrataError::NodeNotFound),
                Some(&c) if s >= c => return Err(StrataError::InvalidScope),
                _ => ()
            }
        }

        self.evidence = evidence.clone();
        self.beliefs.clear();
        self.log_evidence = None;
        Ok(())
    }

    /// Calibrate the tree with the current evidence.
    ///
    /// # Returns
    /// the probability of the evidence. Zero if the evidence is impossible, in which case no
    /// beliefs are available.
    pub fn propagate(&mut self) -> Result<f64> {
        self.beliefs.clear();
        self.log_evidence = None;

        if self.cliques.is_empty() {
            self.log_evidence = Some(0.0);
            return Ok(1.0);
        }

        let potentials: Vec<Factor> = self.cliques.iter()
                                          .map(|c| {
                                              let mut p = c.potential.clone();
                                              for (v, s) in self.evidence.iter() {
                                                  p.observe(v, s);
                                              }
                                              p
                                          })
                                          .collect();

        let (order, parent) = self.traversal();
        let mut messages: HashMap<(usize, usize), Factor> = HashMap::new();
        let mut log_scale = 0.0;

        // collect, leaves first
        for &c in order.iter().rev() {
            if let Some(p) = parent[c] {
                let msg = self.message(c, p, &potentials, &messages)?;
                let z = msg.sum();
                if z <= 0.0 {
                    self.log_evidence = Some(f64::NEG_INFINITY);
                    return Ok(0.0);
                }

                log_scale += z.ln();
                messages.insert((c, p), msg.product(&Factor::scalar(1.0 / z))?);
            }
        }

        let z = self.gather(order[0], None, &potentials, &messages)?.sum();
        if z <= 0.0 {
            self.log_evidence = Some(f64::NEG_INFINITY);
            return Ok(0.0);
        }
        let log_evidence = log_scale + z.ln();

        // distribute, root first
        for &c in order.iter() {
            for &child in self.cliques[c].neighbors.iter().filter(|&&n| parent[n] == Some(c)) {
                let msg = self.message(c, child, &potentials, &messages)?;
                let msg = if msg.sum() > 0.0 { msg.normalize()? } else { msg };
                messages.insert((c, child), msg);
            }
        }

        self.beliefs = (0..self.cliques.len())
            .map(|c| self.gather(c, None, &potentials, &messages)?.normalize())
            .collect::<Result<Vec<Factor>>>()?;
        self.log_evidence = Some(log_evidence);

        Ok(log_evidence.exp())
    }

    /// ln P(evidence) of the last propagation
    pub fn log_evidence(&self) -> Option<f64> {
        self.log_evidence
    }

    /// Posterior distribution of a single node, over `[node]`
    pub fn belief(&self, node: NodeId) -> Result<Factor> {
        let &c = self.home.get(&node).ok_or(StrataError::NodeNotFound)?;
        Ok(self.clique_belief(c)?.marginalize_to(&[node]))
    }

    /// Posterior joint distribution of a node's family, ordered parents first and the node last
    pub fn family_belief(&self, node: NodeId) -> Result<Factor> {
        let (family, c) = self.families.get(&node).ok_or(StrataError::NodeNotFound)?;
        Ok(self.clique_belief(*c)?.marginalize_to(family))
    }

    fn clique_belief(&self, c: usize) -> Result<&Factor> {
        self.beliefs.get(c).ok_or_else(|| StrataError::General(String::from("the tree is not calibrated")))
    }

    /// Load a nonnegative table per node in place of the CPTs, each over the node's family. The
    /// tables need not be normalized, `propagate` then returns the mass of their product
    /// consistent with the evidence.
    pub(crate) fn set_node_potentials(&mut self, tables: &HashMap<NodeId, Factor>) -> Result<()> {
        self.load_with(|id| tables.get(&id).ok_or(StrataError::NodeNotFound))
    }

    fn load_potentials(&mut self, net: &DiscreteBayesNet) -> Result<()> {
        self.load_with(|id| net.cpt(id))
    }

    fn load_with<'a, F>(&mut self, table: F) -> Result<()>
        where F: Fn(NodeId) -> Result<&'a Factor>
    {
        for clique in self.cliques.iter_mut() {
            let shape: Vec<usize> = clique.vars.iter().map(|v| self.cards[v]).collect();
            let mut potential = Factor::new(clique.vars.clone(), Table::ones(shape))?;
            for &id in clique.assigned.iter() {
                potential = potential.product(table(id)?)?;
            }
            clique.potential = potential;
        }

        self.beliefs.clear();
        self.log_evidence = None;
        Ok(())
    }

    /// Pre-order of the tree from clique 0, with the parent of every clique
    fn traversal(&self) -> (Vec<usize>, Vec<Option<usize>>) {
        let n = self.cliques.len();
        let mut order = Vec::with_capacity(n);
        let mut parent = vec![None; n];
        let mut seen = vec![false; n];
        let mut stack = vec![0];
        seen[0] = true;

        while let Some(c) = stack.pop() {
            order.push(c);
            for &nb in self.cliques[c].neighbors.iter().rev() {
                if !seen[nb] {
                    seen[nb] = true;
                    parent[nb] = Some(c);
                    stack.push(nb);
                }
            }
        }

        (order, parent)
    }

    /// Potential of clique `c` times the messages it received, skipping the one from `except`
    fn gather(
        &self,
        c: usize,
        except: Option<usize>,
        potentials: &[Factor],
        messages: &HashMap<(usize, usize), Factor>
    ) -> Result<Factor> {
        let mut f = potentials[c].clone();
        for &n in self.cliques[c].neighbors.iter().filter(|&&n| Some(n) != except) {
            if let Some(m) = messages.get(&(n, c)) {
                f = f.product(m)?;
            }
        }
        Ok(f)
    }

    fn message(
        &self,
        from: usize,
        to: usize,
        potentials: &[Factor],
        messages: &HashMap<(usize, usize), Factor>
    ) -> Result<Factor> {
        let separator: Vec<NodeId> = self.cliques[from].vars.iter()
                                                             .filter(|v| self.cliques[to].vars.contains(v))
                                                             .cloned()
                                                             .collect();

        Ok(self.gather(from, Some(to), potentials, messages)?.marginalize_to(&separator))
    }

}


impl ConditionalInferenceEngine for CliqueTreePropagation {

    /// Variables must share a clique
    fn infer(&mut self, variables: &[NodeId]) -> Result<Factor> {
        if self.beliefs.is_empty() && self.propagate()? <= 0.0 {
            return Err(StrataError::DivideByZero);
        }

        let c = self.cliques.iter()
                            .position(|c| variables.iter().all(|v| c.vars.contains(v)))
                            .ok_or(StrataError::InvalidScope)?;
        Ok(self.clique_belief(c)?.marginalize_to(variables))
    }

}


/// Min-fill elimination of the moral graph, ties broken by the smallest clique table and then by
/// the lowest handle. Returns the elimination cliques in order.
fn triangulate(net: &DiscreteBayesNet, cards: &HashMap<NodeId, usize>) -> Vec<BTreeSet<NodeId>> {
    let moral = net.dag().compute_moral_graph();
    let mut adj: BTreeMap<NodeId, BTreeSet<NodeId>> = moral.node_ids()
                                                           .map(|id| (id, moral.neighbors(id).iter().cloned().collect()))
                                                           .collect();
    let mut cliques = Vec::with_capacity(adj.len());

    while !adj.is_empty() {
        let mut best: Option<(NodeId, usize, f64)> = None;
        for (&v, ns) in adj.iter() {
            let nv: Vec<NodeId> = ns.iter().cloned().collect();
            let fill = nv.iter()
                         .enumerate()
                         .map(|(i, a)| nv[i + 1..].iter().filter(|b| !adj[a].contains(b)).count())
                         .sum::<usize>();
            let weight: f64 = nv.iter().chain(Some(&v)).map(|n| cards[n] as f64).product();

            let better = match best {
                None => true,
                Some((_, f, w)) => fill < f || (fill == f && weight < w)
            };
            if better {
                best = Some((v, fill, weight));
            }
        }

        let v = match best {
            Some((v, _, _)) => v,
            None => break
        };

        let ns: Vec<NodeId> = adj.remove(&v).unwrap_or_default().into_iter().collect();
        for (i, &a) in ns.iter().enumerate() {
            for &b in ns[i + 1..].iter() {
                adj.entry(a).or_default().insert(b);
                adj.entry(b).or_default().insert(a);
            }
            if let Some(set) = adj.get_mut(&a) {
                set.remove(&v);
            }
        }

        let mut clique: BTreeSet<NodeId> = ns.into_iter().collect();
        clique.insert(v);
        cliques.push(clique);
    }

    cliques
}


/// Drop every clique contained in another one, keeping the first of identical cliques
fn maximal(cliques: Vec<BTreeSet<NodeId>>) -> Vec<BTreeSet<NodeId>> {
    cliques.iter()
           .enumerate()
           .filter(|&(i, c)| {
               !cliques.iter().enumerate().any(|(j, d)| {
                   j != i && c.is_subset(d) && (c.len() < d.len() || j < i)
               })
           })
           .map(|(_, c)| c.clone())
           .collect()
}
