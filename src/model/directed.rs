//! Defines the `DiscreteBayesNet`, a Bayesian model that represents the factorization of
//! a probability distribution P over discrete variables

use crate::factor::{Assignment, Factor, Table};
use crate::graph::{DirectedAcyclicGraph, Edge, NodeId};
use crate::init::Initialization;
use crate::util::{Result, StrataError};
use crate::variable::Variable;

use bidir_map::BidirMap;
use rand::rngs::StdRng;

/// A node of a `DiscreteBayesNet`: a variable and its conditional probability table
#[derive(Clone, Debug)]
pub struct BeliefNode {
    variable: Variable,

    /// P(variable | parents), scope is the parents in graph order followed by the node itself
    cpt: Factor
}

impl BeliefNode {

    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    pub fn cpt(&self) -> &Factor {
        &self.cpt
    }
}


/// Represents a Bayesian Network - a Directed Probabilistic Graphical Model over discrete
/// variables.
///
/// # Representation
/// The structure is a `DirectedAcyclicGraph` whose nodes own a `Variable` and its CPT. The CPT
/// of a node always has the node's family as scope: its parents, in the order the parent edges
/// were added, followed by the node itself. Names are unique and map to stable `NodeId`s, which
/// survive cardinality changes.
///
/// Every structural or cardinality change bumps the `revision`, which lets inference structures
/// compiled from the network detect that they are stale.
#[derive(Clone, Debug)]
pub struct DiscreteBayesNet {

    /// The structure and the local distributions
    dag: DirectedAcyclicGraph<BeliefNode>,

    /// Two way lookup ```(NodeId -> Name)``` and ```(Name -> NodeId)```
    names: BidirMap<NodeId, String>,

    /// Incremented on every change to the structure or to a cardinality
    revision: u64

}


impl Default for DiscreteBayesNet {
    fn default() -> Self {
        DiscreteBayesNet { dag: DirectedAcyclicGraph::new(), names: BidirMap::new(), revision: 0 }
    }
}


impl DiscreteBayesNet {

    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unconnected node with a uniform distribution
    ///
    /// # Errors
    /// * `StrataError::DuplicateVariable` if the name is taken
    pub fn add_node(&mut self, variable: Variable) -> Result<NodeId> {
        let name = String::from(variable.name());
        if self.lookup(&name).is_some() {
            return Err(StrataError::DuplicateVariable(name));
        }

        let card = variable.cardinality();
        let id = self.dag.add_node(BeliefNode { variable, cpt: Factor::identity() });
        self.names.insert(id, name);
        self.revision += 1;

        let cpt = Initialization::Uniform.build_cpd((id, card), &[])?;
        self.node_mut(id)?.cpt = cpt;
        Ok(id)
    }

    /// Remove a node with its edges. The children lose the corresponding parent axis, which is
    /// averaged out of their CPTs.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Variable> {
        let children = self.children(id).to_vec();
        let node = self.dag.remove_node(id)?;
        self.names.remove_by_first(&id);
        self.revision += 1;

        for child in children {
            self.conform_cpt(child)?;
        }

        Ok(node.variable)
    }

    /// Add the edge `tail -> head`.
    ///
    /// The CPT of `head` is reshaped to its new family by replicating it along the new parent
    /// axis. The parameters are not re-estimated.
    ///
    /// # Errors
    /// Any structural error of `DirectedAcyclicGraph::add_edge`
    pub fn add_edge(&mut self, head: NodeId, tail: NodeId) -> Result<Edge> {
        let edge = self.dag.add_edge(head, tail)?;
        self.revision += 1;
        self.conform_cpt(head)?;
        Ok(edge)
    }

    /// Remove the edge `tail -> head`, averaging the CPT of `head` over the dropped parent
    pub fn remove_edge(&mut self, head: NodeId, tail: NodeId) -> Result<Edge> {
        let edge = self.dag.remove_edge(head, tail)?;
        self.revision += 1;
        self.conform_cpt(head)?;
        Ok(edge)
    }

    /// Turn `tail -> head` into `head -> tail`, reshaping both CPTs
    pub fn reverse_edge(&mut self, head: NodeId, tail: NodeId) -> Result<Edge> {
        let edge = self.dag.reverse_edge(head, tail)?;
        self.revision += 1;
        self.conform_cpt(head)?;
        self.conform_cpt(tail)?;
        Ok(edge)
    }

    pub fn is_edge_allowed(&self, head: NodeId, tail: NodeId) -> bool {
        self.dag.is_edge_allowed(head, tail)
    }

    pub fn is_reversal_allowed(&self, head: NodeId, tail: NodeId) -> bool {
        self.dag.is_reversal_allowed(head, tail)
    }

    pub fn contains_edge(&self, head: NodeId, tail: NodeId) -> bool {
        self.dag.contains_edge(head, tail)
    }

    /// The underlying graph
    pub fn dag(&self) -> &DirectedAcyclicGraph<BeliefNode> {
        &self.dag
    }

    pub fn node(&self, id: NodeId) -> Option<&BeliefNode> {
        self.dag.node(id)
    }

    pub fn variable(&self, id: NodeId) -> Result<&Variable> {
        self.dag.node(id).map(|n| &n.variable).ok_or(StrataError::NodeNotFound)
    }

    pub fn cardinality(&self, id: NodeId) -> Result<usize> {
        self.variable(id).map(|v| v.cardinality())
    }

    pub fn cpt(&self, id: NodeId) -> Result<&Factor> {
        self.dag.node(id).map(|n| &n.cpt).ok_or(StrataError::NodeNotFound)
    }

    /// Replace the CPT of a node. The factor may list the parents in any order; it is stored in
    /// the canonical family order.
    ///
    /// # Errors
    /// * `StrataError::InvalidScope` if the factor is not over the node's family
    /// * `StrataError::InvalidInitialization` if the factor is not a CPD
    pub fn set_cpt(&mut self, id: NodeId, cpt: Factor) -> Result<()> {
        let var = (id, self.cardinality(id)?);
        let parents = self.parent_cards(id)?;
        let cpt = Initialization::Table(cpt).build_cpd(var, &parents)?;
        self.node_mut(id)?.cpt = cpt;
        Ok(())
    }

    /// Find a node by the name of its variable
    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.names.get_by_second(&String::from(name)).cloned()
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.names.get_by_first(&id).map(|n| n.as_str())
    }

    /// Node handles in insertion order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.dag.node_ids()
    }

    pub fn manifest_nodes(&self) -> Vec<NodeId> {
        self.dag.nodes().filter(|(_, n)| n.variable.is_manifest()).map(|(id, _)| id).collect()
    }

    pub fn latent_nodes(&self) -> Vec<NodeId> {
        self.dag.nodes().filter(|(_, n)| n.variable.is_latent()).map(|(id, _)| id).collect()
    }

    pub fn parents(&self, id: NodeId) -> &[NodeId] {
        self.dag.parents(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.dag.children(id)
    }

    /// The parents of a node followed by the node itself, the scope of its CPT
    pub fn family(&self, id: NodeId) -> Vec<NodeId> {
        let mut family = self.parents(id).to_vec();
        family.push(id);
        family
    }

    /// Parents, children and the other parents of the children, without the node itself
    pub fn markov_blanket(&self, id: NodeId) -> Vec<NodeId> {
        let mut blanket: Vec<NodeId> = Vec::new();
        let mut push = |n: NodeId| {
            if n != id && !blanket.contains(&n) {
                blanket.push(n);
            }
        };

        for &p in self.parents(id) {
            push(p);
        }
        for &c in self.children(id) {
            push(c);
            for &p in self.parents(c) {
                push(p);
            }
        }

        blanket
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.dag.edges()
    }

    pub fn num_nodes(&self) -> usize {
        self.dag.num_nodes()
    }

    pub fn num_edges(&self) -> usize {
        self.dag.num_edges()
    }

    /// Number of free parameters of a node: (cardinality - 1) * product of parent cardinalities
    pub fn node_dimension(&self, id: NodeId) -> Result<usize> {
        let card = self.cardinality(id)?;
        self.parents(id).iter().try_fold(card - 1, |acc, &p| Ok(acc * self.cardinality(p)?))
    }

    /// Number of free parameters of the network
    pub fn dimension(&self) -> usize {
        self.node_ids().filter_map(|id| self.node_dimension(id).ok()).sum()
    }

    pub fn topological_sort(&self) -> Vec<NodeId> {
        self.dag.topological_sort()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Give a latent variable `amount` more states. Every edge is kept and every CPT of the
    /// network is randomized, since the parameter space changed shape.
    ///
    /// # Errors
    /// * `StrataError::NotLatent` if the node is manifest
    pub fn increase_cardinality(&mut self, id: NodeId, amount: usize, rng: &mut StdRng) -> Result<()> {
        let card = self.cardinality(id)?;
        self.set_cardinality(id, card + amount, rng)
    }

    /// Remove `amount` states from a latent variable. Every edge is kept and every CPT of the
    /// network is randomized.
    ///
    /// # Errors
    /// * `StrataError::NotLatent` if the node is manifest
    /// * `StrataError::InvalidCardinality` if fewer than 2 states would remain
    pub fn decrease_cardinality(&mut self, id: NodeId, amount: usize, rng: &mut StdRng) -> Result<()> {
        let card = self.cardinality(id)?;
        if amount + 2 > card {
            return Err(StrataError::InvalidCardinality(card.saturating_sub(amount)));
        }
        self.set_cardinality(id, card - amount, rng)
    }

    /// Draw fresh random parameters for every node
    pub fn randomly_parameterize(&mut self, rng: &mut StdRng) -> Result<()> {
        let ids: Vec<NodeId> = self.node_ids().collect();
        self.randomly_parameterize_nodes(&ids, rng)
    }

    /// Draw fresh random parameters for the given nodes, in the given order
    pub fn randomly_parameterize_nodes(&mut self, ids: &[NodeId], rng: &mut StdRng) -> Result<()> {
        for &id in ids {
            let var = (id, self.cardinality(id)?);
            let parents = self.parent_cards(id)?;
            let cpt = Initialization::Random(&mut *rng).build_cpd(var, &parents)?;
            self.node_mut(id)?.cpt = cpt;
        }
        Ok(())
    }

    /// Determine the probability of a full `Assignment` to the variables of the network, by the
    /// chain rule.
    ///
    /// # Errors
    /// * `StrataError::InvalidScope` if the assignment is not complete
    pub fn probability(&self, assignment: &Assignment) -> Result<f64> {
        self.dag.nodes()
                .map(|(_, n)| n.cpt.value(assignment))
                .try_fold(1.0, |acc, val| val.map(|v| acc * v))
    }

    /// `(parent, cardinality)` pairs in family order
    fn parent_cards(&self, id: NodeId) -> Result<Vec<(NodeId, usize)>> {
        self.parents(id).iter().map(|&p| Ok((p, self.cardinality(p)?))).collect()
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut BeliefNode> {
        self.dag.node_mut(id).ok_or(StrataError::NodeNotFound)
    }

    fn set_cardinality(&mut self, id: NodeId, card: usize, rng: &mut StdRng) -> Result<()> {
        let variable = self.variable(id)?;
        if !variable.is_latent() {
            return Err(StrataError::NotLatent(String::from(variable.name())));
        }

        let variable = variable.with_cardinality(card)?;
        self.node_mut(id)?.variable = variable;
        self.revision += 1;
        self.randomly_parameterize(rng)
    }

    /// Bring the CPT of a node in line with its current family: parents that were dropped are
    /// averaged out, new parents are replicated along.
    fn conform_cpt(&mut self, id: NodeId) -> Result<()> {
        let family = self.family(id);
        let mut cpt = self.cpt(id)?.clone();

        for &v in self.cpt(id)?.scope() {
            if !family.contains(&v) {
                let card = cpt.cardinality(v).ok_or(StrataError::InvalidScope)?;
                cpt = cpt.marginalize(v).product(&Factor::scalar(1.0 / card as f64))?;
            }
        }

        for &p in family.iter() {
            if cpt.scope().contains(&p) {
                continue;
            }
            let ones = Factor::new(vec![p], Table::ones(vec![self.cardinality(p)?]))?;
            cpt = cpt.product(&ones)?;
        }

        self.node_mut(id)?.cpt = cpt.permute(&family)?;
        Ok(())
    }

}


/// An implementation of the [builder pattern] for creating a `DiscreteBayesNet`.
///
/// Variables are added in topological order: the parents of a variable must already be part of
/// the network.
///
/// [builder pattern]: https://en.wikipedia.org/wiki/Builder_pattern
pub struct DiscreteBayesNetBuilder {

    /// The network assembled so far
    net: DiscreteBayesNet,

    /// The error state of the builder
    err: Option<StrataError>

}


impl Default for DiscreteBayesNetBuilder {
    fn default() -> Self {
        DiscreteBayesNetBuilder { net: DiscreteBayesNet::new(), err: None }
    }
}


impl DiscreteBayesNetBuilder {

    /// Construct a new `DiscreteBayesNetBuilder` representing an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `Variable` to the network.
    ///
    /// # Args
    /// * `var`: the variable to add to the model
    /// * `parents`: the names of the parent variables. The parents must already be in the model.
    /// * `init`: the initialization mechanism for the CPD of `var` in the model.
    pub fn with_variable(mut self, var: Variable, parents: &[&str], init: Initialization) -> Self {
        ///////////////////////////////////////////////////////////////////////
        // 1) if we are in an error state, do nothing
        if self.err.is_some() {
            return self;
        }

        ///////////////////////////////////////////////////////////////////////
        // 2) add the variable and its edges
        if let Err(e) = self.add_variable(var, parents, init) {
            self.err = Some(e);
        }

        self
    }

    /// Complete building the model.
    ///
    /// # Returns
    /// the `DiscreteBayesNet`, or the first error generated during the building process
    pub fn build(self) -> Result<DiscreteBayesNet> {
        match self.err {
            Some(e) => Err(e),
            None => Ok(self.net)
        }
    }

    fn add_variable(&mut self, var: Variable, parents: &[&str], init: Initialization) -> Result<()> {
        let parent_ids = parents.iter()
                                .map(|p| self.net.lookup(p).ok_or_else(|| StrataError::UnknownVariable(String::from(*p))))
                                .collect::<Result<Vec<NodeId>>>()?;

        let id = self.net.add_node(var)?;
        for p in parent_ids {
            self.net.add_edge(id, p)?;
        }

        let card = self.net.cardinality(id)?;
        let cpt = init.build_cpd((id, card), &self.net.parent_cards(id)?)?;
        self.net.node_mut(id)?.cpt = cpt;
        Ok(())
    }
}


#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;
    use itertools::iproduct;
    use ndarray::array;
    use rand::SeedableRng;

    fn manifest(name: &str, card: usize) -> Variable {
        Variable::manifest(name, card).unwrap()
    }

    /// Example taken from Koller & Friedman Section 3.1.2
    fn intelligence() -> DiscreteBayesNet {
        let s = array![[0.95, 0.05], [0.2, 0.8]].into_dyn();

        let mut net = DiscreteBayesNetBuilder::new()
            .with_variable(manifest("I", 2), &[], Initialization::Multinomial(&[0.7, 0.3]))
            .with_variable(manifest("S", 2), &["I"], Initialization::Uniform)
            .build()
            .expect("Unexpected error");

        let (i, sat) = (net.lookup("I").unwrap(), net.lookup("S").unwrap());
        net.set_cpt(sat, Factor::cpd(sat, &[i], s).unwrap()).expect("Unexpected error");
        net
    }

    /// Koller & Friedman student network: D -> G <- I, I -> S, G -> L
    fn student() -> DiscreteBayesNet {
        DiscreteBayesNetBuilder::new()
            .with_variable(manifest("D", 2), &[], Initialization::Uniform)
            .with_variable(manifest("I", 2), &[], Initialization::Uniform)
            .with_variable(manifest("G", 3), &["I", "D"], Initialization::Uniform)
            .with_variable(manifest("S", 2), &["I"], Initialization::Uniform)
            .with_variable(manifest("L", 2), &["G"], Initialization::Uniform)
            .build()
            .expect("Unexpected error")
    }

    #[test]
    fn build_empty() {
        let net = DiscreteBayesNetBuilder::new().build().expect("Unexpected error");
        assert_eq!(0, net.num_nodes());
        assert_eq!(0, net.dimension());
    }

    #[test]
    fn build_errors() {
        let res = DiscreteBayesNetBuilder::new()
            .with_variable(manifest("A", 2), &["B"], Initialization::Uniform)
            .build();
        match res {
            Err(StrataError::UnknownVariable(n)) => assert_eq!("B", n),
            _ => panic!("expected UnknownVariable")
        }

        let res = DiscreteBayesNetBuilder::new()
            .with_variable(manifest("A", 2), &[], Initialization::Uniform)
            .with_variable(manifest("A", 3), &[], Initialization::Uniform)
            .build();
        match res {
            Err(StrataError::DuplicateVariable(n)) => assert_eq!("A", n),
            _ => panic!("expected DuplicateVariable")
        }
    }

    #[test]
    fn probability() {
        let net = intelligence();
        let (i, s) = (net.lookup("I").unwrap(), net.lookup("S").unwrap());
        assert_eq!(Some("S"), net.name(s));

        let expected = [[0.7 * 0.95, 0.7 * 0.05], [0.3 * 0.2, 0.3 * 0.8]];
        for (x, y) in iproduct!(0..2, 0..2) {
            let mut a = Assignment::new();
            a.set(i, x);
            a.set(s, y);
            assert_relative_eq!(expected[x][y], net.probability(&a).unwrap(), epsilon = 1e-12);
        }

        // partial assignment
        let mut a = Assignment::new();
        a.set(i, 1);
        assert!(net.probability(&a).is_err());
    }

    #[test]
    fn structure_queries() {
        let net = student();
        let id = |n: &str| net.lookup(n).unwrap();

        assert_eq!(vec![id("I"), id("D"), id("G")], net.family(id("G")));
        assert_eq!(vec![id("I"), id("D"), id("L")], net.markov_blanket(id("G")));
        assert_eq!(vec![id("G"), id("D"), id("S")], net.markov_blanket(id("I")));
        assert_eq!(4, net.num_edges());

        // D: 1, I: 1, G: 2 * 4, S: 1 * 2, L: 1 * 3
        assert_eq!(15, net.dimension());
        assert_eq!(8, net.node_dimension(id("G")).unwrap());

        let order = net.topological_sort();
        let pos = |n: &str| order.iter().position(|&x| x == id(n)).unwrap();
        assert!(pos("I") < pos("G") && pos("D") < pos("G") && pos("G") < pos("L"));
    }

    #[test]
    fn edges_reshape_cpts() {
        let mut net = intelligence();
        let (i, s) = (net.lookup("I").unwrap(), net.lookup("S").unwrap());
        let d = net.add_node(manifest("D", 3)).unwrap();
        let before = net.revision();

        net.add_edge(s, d).expect("Unexpected error");
        assert!(net.revision() > before);
        let cpt = net.cpt(s).unwrap();
        assert_eq!(&[i, d, s], cpt.scope());
        assert!(cpt.is_cpd());
        let mut a = Assignment::new();
        a.set(i, 1);
        a.set(d, 2);
        a.set(s, 1);
        assert_relative_eq!(0.8, cpt.value(&a).unwrap());

        // dropping the parent again averages over its axis
        net.remove_edge(s, i).expect("Unexpected error");
        let cpt = net.cpt(s).unwrap();
        assert_eq!(&[d, s], cpt.scope());
        assert_relative_eq!(0.425, cpt.value(&a).unwrap(), epsilon = 1e-12);

        match net.add_edge(s, d) {
            Err(StrataError::DuplicateEdge) => assert!(true),
            _ => panic!("expected DuplicateEdge")
        }
    }

    #[test]
    fn reverse_and_remove() {
        let mut net = intelligence();
        let (i, s) = (net.lookup("I").unwrap(), net.lookup("S").unwrap());

        net.reverse_edge(s, i).expect("Unexpected error");
        assert!(net.contains_edge(i, s));
        assert_eq!(&[s, i], net.cpt(i).unwrap().scope());
        assert_eq!(&[s], net.cpt(s).unwrap().scope());
        assert!(net.cpt(i).unwrap().is_cpd() && net.cpt(s).unwrap().is_cpd());

        let v = net.remove_node(s).expect("Unexpected error");
        assert_eq!("S", v.name());
        assert_eq!(None, net.lookup("S"));
        assert_eq!(&[i], net.cpt(i).unwrap().scope());
        assert!(net.cpt(i).unwrap().is_cpd());
    }

    #[test]
    fn set_cpt_reorders() {
        let mut net = student();
        let id = |n: &str| net.lookup(n).unwrap();
        let (d, i, g) = (id("D"), id("I"), id("G"));

        // P(G | D, I) given with D first
        let table = Table::from_elem(vec![2, 2, 3], 1.0 / 3.0);
        net.set_cpt(g, Factor::cpd(g, &[d, i], table).unwrap()).expect("Unexpected error");
        assert_eq!(&[i, d, g], net.cpt(g).unwrap().scope());

        let wrong = Factor::cpd(g, &[d], Table::from_elem(vec![2, 3], 1.0 / 3.0)).unwrap();
        assert!(net.set_cpt(g, wrong).is_err());
    }

    #[test]
    fn cardinality_change_keeps_edges() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut net = DiscreteBayesNetBuilder::new()
            .with_variable(manifest("R", 2), &[], Initialization::Uniform)
            .with_variable(Variable::latent("H", 2).unwrap(), &["R"], Initialization::Uniform)
            .with_variable(manifest("X", 2), &["H"], Initialization::Uniform)
            .with_variable(manifest("Y", 3), &["H"], Initialization::Uniform)
            .build()
            .unwrap();
        let h = net.lookup("H").unwrap();
        let edges = net.edges();
        let uniform = net.cpt(net.lookup("R").unwrap()).unwrap().clone();

        net.increase_cardinality(h, 2, &mut rng).expect("Unexpected error");
        assert_eq!(4, net.cardinality(h).unwrap());
        assert_eq!(Some(h), net.lookup("H"));
        assert_eq!(edges, net.edges());
        for id in net.node_ids() {
            assert!(net.cpt(id).unwrap().is_cpd());
            assert_eq!(net.family(id), net.cpt(id).unwrap().scope().to_vec());
        }
        assert_eq!(Some(4), net.cpt(net.lookup("Y").unwrap()).unwrap().cardinality(h));
        assert_ne!(&uniform, net.cpt(net.lookup("R").unwrap()).unwrap());

        net.decrease_cardinality(h, 1, &mut rng).expect("Unexpected error");
        assert_eq!(3, net.cardinality(h).unwrap());
        assert_eq!(edges, net.edges());

        match net.decrease_cardinality(h, 2, &mut rng) {
            Err(StrataError::InvalidCardinality(1)) => assert!(true),
            _ => panic!("expected InvalidCardinality")
        }
        match net.increase_cardinality(net.lookup("X").unwrap(), 1, &mut rng) {
            Err(StrataError::NotLatent(n)) => assert_eq!("X", n),
            _ => panic!("expected NotLatent")
        }
    }
}
