//! Defines the `DirectedAcyclicGraph`, the structure every Bayesian network is built on.

use super::{Edge, NodeId, UndirectedGraph};
use crate::util::{Result, StrataError};

#[derive(Clone, Debug)]
struct Node<T> {
    content: T,
    parents: Vec<NodeId>,
    children: Vec<NodeId>
}


/// A directed graph that can never hold a directed cycle.
///
/// # Representation
/// Nodes live in an arena indexed by `NodeId`. Removed nodes leave an empty slot so the handles
/// of the remaining nodes stay stable. Each node keeps its parent and child lists in insertion
/// order, which makes every iteration over the graph deterministic.
#[derive(Clone, Debug)]
pub struct DirectedAcyclicGraph<T> {

    /// The node arena
    nodes: Vec<Option<Node<T>>>,

    /// Number of live nodes
    count: usize,

    /// Number of edges
    edge_count: usize

}


impl<T> Default for DirectedAcyclicGraph<T> {
    fn default() -> Self {
        DirectedAcyclicGraph { nodes: Vec::new(), count: 0, edge_count: 0 }
    }
}


impl<T> DirectedAcyclicGraph<T> {

    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new, unconnected node holding `content`
    pub fn add_node(&mut self, content: T) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Some(Node { content, parents: Vec::new(), children: Vec::new() }));
        self.count += 1;
        id
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.slot(id).is_ok()
    }

    /// The content of a node
    pub fn node(&self, id: NodeId) -> Option<&T> {
        self.slot(id).ok().map(|n| &n.content)
    }

    /// Mutable access to the content of a node. The structure can not be changed through it.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.slot_mut(id).ok().map(|n| &mut n.content)
    }

    pub fn num_nodes(&self) -> usize {
        self.count
    }

    pub fn num_edges(&self) -> usize {
        self.edge_count
    }

    /// Iterate over the live node handles in insertion order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter()
                  .enumerate()
                  .filter(|(_, n)| n.is_some())
                  .map(|(i, _)| NodeId::new(i))
    }

    /// Iterate over the live nodes and their contents in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &T)> + '_ {
        self.nodes.iter()
                  .enumerate()
                  .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId::new(i), &n.content)))
    }

    /// The parents of a node, in the order their edges were added. Empty if the node does not
    /// exist.
    pub fn parents(&self, id: NodeId) -> &[NodeId] {
        self.slot(id).map(|n| n.parents.as_slice()).unwrap_or(&[])
    }

    /// The children of a node, in the order their edges were added. Empty if the node does not
    /// exist.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slot(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Nodes without parents
    pub fn roots(&self) -> Vec<NodeId> {
        self.node_ids().filter(|&id| self.parents(id).is_empty()).collect()
    }

    /// `true` if there is an edge between the nodes, in either direction
    pub fn are_neighbors(&self, a: NodeId, b: NodeId) -> bool {
        self.contains_edge(a, b) || self.contains_edge(b, a)
    }

    /// `true` if `tail` is a parent of `head`
    pub fn contains_edge(&self, head: NodeId, tail: NodeId) -> bool {
        self.parents(head).contains(&tail)
    }

    /// All edges, grouped by head in node order and by tail in parent order
    pub fn edges(&self) -> Vec<Edge> {
        self.node_ids()
            .flat_map(|head| self.parents(head).iter().map(move |&tail| Edge::new(head, tail)))
            .collect()
    }

    /// Reachability query: is there a directed path (following parent -> child links) from
    /// `from` to `to`? A node always reaches itself.
    pub fn contains_path(&self, from: NodeId, to: NodeId) -> bool {
        self.reaches(from, to, None)
    }

    /// Check whether `add_edge(head, tail)` would succeed, without modifying the graph
    pub fn is_edge_allowed(&self, head: NodeId, tail: NodeId) -> bool {
        self.check_edge(head, tail).is_ok()
    }

    /// Check whether the existing edge `tail -> head` can be turned around without closing a
    /// cycle
    pub fn is_reversal_allowed(&self, head: NodeId, tail: NodeId) -> bool {
        self.contains_edge(head, tail) && !self.reaches(tail, head, Some(Edge::new(head, tail)))
    }

    /// Add the edge `tail -> head`, making `tail` a parent of `head`.
    ///
    /// # Errors
    /// * `StrataError::NodeNotFound` if either node is not in the graph
    /// * `StrataError::SelfLoop` if `head == tail`
    /// * `StrataError::DuplicateEdge` if the nodes are already neighbours
    /// * `StrataError::CycleDetected` if `head` already reaches `tail`
    pub fn add_edge(&mut self, head: NodeId, tail: NodeId) -> Result<Edge> {
        self.check_edge(head, tail)?;
        self.link(head, tail)?;
        Ok(Edge::new(head, tail))
    }

    /// Remove the edge `tail -> head`
    ///
    /// # Errors
    /// * `StrataError::NodeNotFound` if either node is not in the graph
    /// * `StrataError::EdgeNotFound` if there is no such edge
    pub fn remove_edge(&mut self, head: NodeId, tail: NodeId) -> Result<Edge> {
        self.slot(head)?;
        self.slot(tail)?;
        if !self.contains_edge(head, tail) {
            return Err(StrataError::EdgeNotFound);
        }

        self.slot_mut(head)?.parents.retain(|&p| p != tail);
        self.slot_mut(tail)?.children.retain(|&c| c != head);
        self.edge_count -= 1;
        Ok(Edge::new(head, tail))
    }

    /// Turn the edge `tail -> head` around, so that `head` becomes the parent of `tail`
    ///
    /// # Errors
    /// * `StrataError::EdgeNotFound` if there is no such edge
    /// * `StrataError::CycleDetected` if another path from `tail` to `head` exists
    pub fn reverse_edge(&mut self, head: NodeId, tail: NodeId) -> Result<Edge> {
        if !self.contains_edge(head, tail) {
            return Err(StrataError::EdgeNotFound);
        }
        if !self.is_reversal_allowed(head, tail) {
            return Err(StrataError::CycleDetected);
        }

        self.remove_edge(head, tail)?;
        self.link(tail, head)?;
        Ok(Edge::new(tail, head))
    }

    /// Remove a node and every edge incident to it, returning its content
    pub fn remove_node(&mut self, id: NodeId) -> Result<T> {
        let node = self.nodes.get_mut(id.index())
                             .and_then(|n| n.take())
                             .ok_or(StrataError::NodeNotFound)?;

        for &p in node.parents.iter() {
            if let Ok(parent) = self.slot_mut(p) {
                parent.children.retain(|&c| c != id);
            }
        }
        for &c in node.children.iter() {
            if let Ok(child) = self.slot_mut(c) {
                child.parents.retain(|&p| p != id);
            }
        }

        self.edge_count -= node.parents.len() + node.children.len();
        self.count -= 1;
        Ok(node.content)
    }

    /// Order the nodes so that every parent comes before its children.
    ///
    /// Post-order depth first search from every unvisited node (in insertion order), emitting
    /// nodes in reverse finishing order. Uses an explicit stack.
    pub fn topological_sort(&self) -> Vec<NodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut finished = Vec::with_capacity(self.count);

        for start in self.node_ids() {
            if visited[start.index()] {
                continue;
            }

            visited[start.index()] = true;
            let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];

            while let Some(top) = stack.last_mut() {
                let (id, next) = *top;
                let children = self.children(id);
                if next < children.len() {
                    top.1 += 1;
                    let child = children[next];
                    if !visited[child.index()] {
                        visited[child.index()] = true;
                        stack.push((child, 0));
                    }
                } else {
                    finished.push(id);
                    stack.pop();
                }
            }
        }

        finished.reverse();
        finished
    }

    /// Build a graph with the same shape and node handles but different contents
    pub fn map<U, F>(&self, mut f: F) -> DirectedAcyclicGraph<U>
        where F: FnMut(NodeId, &T) -> U
    {
        let nodes = self.nodes.iter()
                              .enumerate()
                              .map(|(i, n)| n.as_ref().map(|n| Node {
                                  content: f(NodeId::new(i), &n.content),
                                  parents: n.parents.clone(),
                                  children: n.children.clone()
                              }))
                              .collect();

        DirectedAcyclicGraph { nodes, count: self.count, edge_count: self.edge_count }
    }

    /// Every node has at most one parent
    pub fn is_forest(&self) -> bool {
        self.node_ids().all(|id| self.parents(id).len() <= 1)
    }

    /// A forest with a single root
    pub fn is_tree(&self) -> bool {
        self.count > 0 && self.is_forest() && self.roots().len() == 1
    }

    /// The underlying undirected graph has no cycles
    pub fn is_polyforest(&self) -> bool {
        self.edge_count + self.num_components() == self.count
    }

    /// A polyforest with a single connected component
    pub fn is_polytree(&self) -> bool {
        self.count > 0 && self.is_polyforest() && self.num_components() == 1
    }

    /// Number of weakly connected components
    fn num_components(&self) -> usize {
        let mut seen = vec![false; self.nodes.len()];
        let mut components = 0;

        for start in self.node_ids() {
            if seen[start.index()] {
                continue;
            }

            components += 1;
            seen[start.index()] = true;
            let mut stack = vec![start];
            while let Some(id) = stack.pop() {
                for &n in self.parents(id).iter().chain(self.children(id).iter()) {
                    if !seen[n.index()] {
                        seen[n.index()] = true;
                        stack.push(n);
                    }
                }
            }
        }

        components
    }

    fn slot(&self, id: NodeId) -> Result<&Node<T>> {
        self.nodes.get(id.index())
                  .and_then(|n| n.as_ref())
                  .ok_or(StrataError::NodeNotFound)
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut Node<T>> {
        self.nodes.get_mut(id.index())
                  .and_then(|n| n.as_mut())
                  .ok_or(StrataError::NodeNotFound)
    }

    fn check_edge(&self, head: NodeId, tail: NodeId) -> Result<()> {
        self.slot(head)?;
        self.slot(tail)?;

        if head == tail {
            Err(StrataError::SelfLoop)
        } else if self.are_neighbors(head, tail) {
            Err(StrataError::DuplicateEdge)
        } else if self.contains_path(head, tail) {
            Err(StrataError::CycleDetected)
        } else {
            Ok(())
        }
    }

    /// Insert an edge that has already been validated
    fn link(&mut self, head: NodeId, tail: NodeId) -> Result<()> {
        self.slot_mut(head)?.parents.push(tail);
        self.slot_mut(tail)?.children.push(head);
        self.edge_count += 1;
        Ok(())
    }

    /// Iterative DFS along child links, optionally ignoring one edge
    fn reaches(&self, from: NodeId, to: NodeId, skip: Option<Edge>) -> bool {
        if !self.contains_node(from) || !self.contains_node(to) {
            return false;
        }

        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        visited[from.index()] = true;

        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }

            for &child in self.children(id) {
                if skip == Some(Edge::new(child, id)) {
                    continue;
                }
                if !visited[child.index()] {
                    visited[child.index()] = true;
                    stack.push(child);
                }
            }
        }

        false
    }

}


impl<T: Clone> DirectedAcyclicGraph<T> {

    /// A copy of this graph with every edge pointing the other way
    pub fn reverse_edges(&self) -> Self {
        let nodes = self.nodes.iter()
                              .map(|n| n.as_ref().map(|n| Node {
                                  content: n.content.clone(),
                                  parents: n.children.clone(),
                                  children: n.parents.clone()
                              }))
                              .collect();

        DirectedAcyclicGraph { nodes, count: self.count, edge_count: self.edge_count }
    }

    /// Compute the moral graph: every edge loses its direction and the parents of every node
    /// are pairwise connected. Node handles are preserved.
    pub fn compute_moral_graph(&self) -> UndirectedGraph<T> {
        let slots = self.nodes.iter().map(|n| n.as_ref().map(|n| n.content.clone())).collect();
        let mut moral = UndirectedGraph::from_slots(slots);

        for id in self.node_ids() {
            let parents = self.parents(id);
            for (i, &p) in parents.iter().enumerate() {
                // both endpoints exist and differ, so the only possible failure is a
                // duplicate, which is fine to ignore
                let _ = moral.add_edge(id, p);
                for &q in parents[i + 1..].iter() {
                    let _ = moral.add_edge(p, q);
                }
            }
        }

        moral
    }

}


#[cfg(test)]
mod tests {

    use super::*;
    use proptest::prelude::*;

    /// a -> b -> c, a -> c
    fn triangle() -> (DirectedAcyclicGraph<&'static str>, NodeId, NodeId, NodeId) {
        let mut g = DirectedAcyclicGraph::new();
        let a = g.add_node("a");
        let b = g.add_node("b");
        let c = g.add_node("c");
        g.add_edge(b, a).unwrap();
        g.add_edge(c, b).unwrap();
        g.add_edge(c, a).unwrap();
        (g, a, b, c)
    }

    fn position(order: &[NodeId], id: NodeId) -> usize {
        order.iter().position(|&x| x == id).unwrap()
    }

    #[test]
    fn add_edge_errors() {
        let (mut g, a, b, c) = triangle();

        assert_eq!(Err(StrataError::SelfLoop), g.add_edge(a, a));
        assert_eq!(Err(StrataError::DuplicateEdge), g.add_edge(b, a));
        assert_eq!(Err(StrataError::DuplicateEdge), g.add_edge(a, b));
        assert_eq!(Err(StrataError::NodeNotFound), g.add_edge(a, NodeId::new(42)));

        let d = g.add_node("d");
        g.add_edge(d, c).unwrap();
        // d is a descendant of a, so a <- d would close a -> ... -> d -> a
        assert_eq!(Err(StrataError::CycleDetected), g.add_edge(a, d));
        assert!(!g.is_edge_allowed(a, d));
        assert!(g.is_edge_allowed(d, a));
        assert_eq!(4, g.num_edges());
    }

    #[test]
    fn remove_edge_and_node() {
        let (mut g, a, b, c) = triangle();

        g.remove_edge(c, a).unwrap();
        assert!(!g.contains_edge(c, a));
        assert_eq!(Err(StrataError::EdgeNotFound), g.remove_edge(c, a));
        assert_eq!(2, g.num_edges());

        assert_eq!(Ok("b"), g.remove_node(b));
        assert_eq!(0, g.num_edges());
        assert_eq!(2, g.num_nodes());
        assert!(g.children(a).is_empty());
        assert!(g.parents(c).is_empty());
        assert!(!g.contains_node(b));
        assert_eq!(Err(StrataError::NodeNotFound), g.remove_node(b));

        // handles stay stable after removal
        assert_eq!(Some(&"c"), g.node(c));
        assert_eq!(vec![a, c], g.node_ids().collect::<Vec<_>>());
    }

    #[test]
    fn paths() {
        let (g, a, b, c) = triangle();
        assert!(g.contains_path(a, c));
        assert!(g.contains_path(b, c));
        assert!(!g.contains_path(c, a));
        assert!(g.contains_path(b, b));
    }

    #[test]
    fn reversal() {
        let (mut g, a, b, c) = triangle();

        // a -> c can not be reversed, a -> b -> c would become a cycle
        assert!(!g.is_reversal_allowed(c, a));
        assert_eq!(Err(StrataError::CycleDetected), g.reverse_edge(c, a));

        // b -> a, a -> c, b -> c is fine
        assert!(g.is_reversal_allowed(b, a));
        g.reverse_edge(b, a).unwrap();
        assert!(g.contains_edge(a, b));
        assert!(!g.contains_edge(b, a));
        assert_eq!(3, g.num_edges());
    }

    #[test]
    fn topological_sort_forest() {
        let mut g = DirectedAcyclicGraph::new();
        let x = g.add_node(0);
        let y = g.add_node(1);
        let z = g.add_node(2);
        let u = g.add_node(3);
        let v = g.add_node(4);
        g.add_edge(x, z).unwrap();
        g.add_edge(y, z).unwrap();
        g.add_edge(u, v).unwrap();

        let order = g.topological_sort();
        assert_eq!(5, order.len());
        for e in g.edges() {
            assert!(position(&order, e.tail) < position(&order, e.head));
        }
    }

    #[test]
    fn reverse_edges() {
        let (g, a, b, c) = triangle();
        let r = g.reverse_edges();

        assert!(r.contains_edge(a, b));
        assert!(r.contains_edge(b, c));
        assert!(r.contains_edge(a, c));
        assert_eq!(3, r.num_edges());
        assert_eq!(vec![c], r.roots());
    }

    #[test]
    fn moral_graph() {
        // v-structure a -> c <- b plus c -> d
        let mut g = DirectedAcyclicGraph::new();
        let a = g.add_node('a');
        let b = g.add_node('b');
        let c = g.add_node('c');
        let d = g.add_node('d');
        g.add_edge(c, a).unwrap();
        g.add_edge(c, b).unwrap();
        g.add_edge(d, c).unwrap();

        let m = g.compute_moral_graph();
        assert!(m.contains_edge(a, c));
        assert!(m.contains_edge(c, a));
        assert!(m.contains_edge(a, b));
        assert!(m.contains_edge(d, c));
        assert!(!m.contains_edge(a, d));
        assert_eq!(4, m.num_edges());
    }

    #[test]
    fn structure_predicates() {
        let mut g = DirectedAcyclicGraph::new();
        let r = g.add_node(());
        let x = g.add_node(());
        let y = g.add_node(());
        g.add_edge(x, r).unwrap();
        g.add_edge(y, r).unwrap();
        assert!(g.is_tree() && g.is_forest() && g.is_polytree() && g.is_polyforest());

        let z = g.add_node(());
        assert!(!g.is_tree());
        assert!(g.is_forest());
        assert!(!g.is_polytree());
        assert!(g.is_polyforest());

        // z gets two parents: no longer a forest, still a polytree
        g.add_edge(z, x).unwrap();
        g.add_edge(z, y).unwrap();
        assert!(!g.is_forest());
        assert!(!g.is_polyforest());

        g.remove_edge(z, y).unwrap();
        let w = g.add_node(());
        g.add_edge(w, y).unwrap();
        g.add_edge(w, x).unwrap();
        assert!(!g.is_forest());
        assert!(!g.is_polytree());

        // r -> x -> z and r -> y -> w
        g.remove_edge(w, x).unwrap();
        assert!(g.is_polytree());
        assert!(g.is_tree());

        g.remove_edge(x, r).unwrap();
        assert!(!g.is_tree());
        assert!(g.is_forest());
    }

    #[derive(Clone, Debug)]
    enum Op {
        Add(usize, usize),
        Remove(usize, usize)
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0..8usize, 0..8usize).prop_map(|(h, t)| Op::Add(h, t)),
            1 => (0..8usize, 0..8usize).prop_map(|(h, t)| Op::Remove(h, t)),
        ]
    }

    proptest! {
        #[test]
        fn accepted_edges_never_form_a_cycle(ops in prop::collection::vec(op(), 0..60)) {
            let mut g = DirectedAcyclicGraph::new();
            let ids: Vec<NodeId> = (0..8).map(|i| g.add_node(i)).collect();

            for op in ops {
                match op {
                    Op::Add(h, t) => {
                        let (head, tail) = (ids[h], ids[t]);
                        let closes_cycle = h != t && !g.are_neighbors(head, tail)
                            && g.contains_path(head, tail);
                        let allowed = g.is_edge_allowed(head, tail);
                        let result = g.add_edge(head, tail);

                        prop_assert_eq!(allowed, result.is_ok());
                        if closes_cycle {
                            prop_assert_eq!(Err(StrataError::CycleDetected), result);
                        }
                    },
                    Op::Remove(h, t) => {
                        let present = g.contains_edge(ids[h], ids[t]);
                        prop_assert_eq!(present, g.remove_edge(ids[h], ids[t]).is_ok());
                    }
                }

                let order = g.topological_sort();
                prop_assert_eq!(g.num_nodes(), order.len());
                for e in g.edges() {
                    prop_assert!(position(&order, e.tail) < position(&order, e.head));
                }
            }
        }
    }
}
