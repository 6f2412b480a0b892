//! Defines the `UndirectedGraph`, used for moral graphs and their triangulations.

use super::{Edge, NodeId};
use crate::util::{Result, StrataError};

#[derive(Clone, Debug)]
struct Node<T> {
    content: T,
    neighbors: Vec<NodeId>
}


/// An undirected graph over the same kind of node arena as `DirectedAcyclicGraph`
#[derive(Clone, Debug)]
pub struct UndirectedGraph<T> {
    nodes: Vec<Option<Node<T>>>,
    count: usize,
    edge_count: usize
}


impl<T> Default for UndirectedGraph<T> {
    fn default() -> Self {
        UndirectedGraph { nodes: Vec::new(), count: 0, edge_count: 0 }
    }
}


impl<T> UndirectedGraph<T> {

    pub fn new() -> Self {
        Self::default()
    }

    /// Build an edgeless graph that reuses the slot layout of another arena, so that node handles
    /// carry over
    pub(crate) fn from_slots(slots: Vec<Option<T>>) -> Self {
        let count = slots.iter().filter(|s| s.is_some()).count();
        let nodes = slots.into_iter()
                         .map(|s| s.map(|content| Node { content, neighbors: Vec::new() }))
                         .collect();

        UndirectedGraph { nodes, count, edge_count: 0 }
    }

    pub fn add_node(&mut self, content: T) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Some(Node { content, neighbors: Vec::new() }));
        self.count += 1;
        id
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.slot(id).is_ok()
    }

    pub fn node(&self, id: NodeId) -> Option<&T> {
        self.slot(id).ok().map(|n| &n.content)
    }

    pub fn num_nodes(&self) -> usize {
        self.count
    }

    pub fn num_edges(&self) -> usize {
        self.edge_count
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter()
                  .enumerate()
                  .filter(|(_, n)| n.is_some())
                  .map(|(i, _)| NodeId::new(i))
    }

    /// The neighbours of a node in insertion order. Empty if the node does not exist.
    pub fn neighbors(&self, id: NodeId) -> &[NodeId] {
        self.slot(id).map(|n| n.neighbors.as_slice()).unwrap_or(&[])
    }

    /// Symmetric membership test
    pub fn contains_edge(&self, a: NodeId, b: NodeId) -> bool {
        self.neighbors(a).contains(&b)
    }

    /// Connect two nodes.
    ///
    /// # Errors
    /// * `StrataError::NodeNotFound` if either node is missing
    /// * `StrataError::SelfLoop` if `a == b`
    /// * `StrataError::DuplicateEdge` if they are already connected
    pub fn add_edge(&mut self, a: NodeId, b: NodeId) -> Result<Edge> {
        self.slot(a)?;
        self.slot(b)?;
        if a == b {
            return Err(StrataError::SelfLoop);
        }
        if self.contains_edge(a, b) {
            return Err(StrataError::DuplicateEdge);
        }

        self.slot_mut(a)?.neighbors.push(b);
        self.slot_mut(b)?.neighbors.push(a);
        self.edge_count += 1;
        Ok(canonical(a, b))
    }

    pub fn remove_edge(&mut self, a: NodeId, b: NodeId) -> Result<Edge> {
        if !self.contains_edge(a, b) {
            self.slot(a)?;
            self.slot(b)?;
            return Err(StrataError::EdgeNotFound);
        }

        self.slot_mut(a)?.neighbors.retain(|&n| n != b);
        self.slot_mut(b)?.neighbors.retain(|&n| n != a);
        self.edge_count -= 1;
        Ok(canonical(a, b))
    }

    /// Remove a node and its incident edges, returning its content
    pub fn remove_node(&mut self, id: NodeId) -> Result<T> {
        let node = self.nodes.get_mut(id.index())
                             .and_then(|n| n.take())
                             .ok_or(StrataError::NodeNotFound)?;

        for &n in node.neighbors.iter() {
            if let Ok(other) = self.slot_mut(n) {
                other.neighbors.retain(|&x| x != id);
            }
        }

        self.edge_count -= node.neighbors.len();
        self.count -= 1;
        Ok(node.content)
    }

    /// Every edge once, with the lower handle as the `tail`
    pub fn edges(&self) -> Vec<Edge> {
        self.node_ids()
            .flat_map(|a| {
                self.neighbors(a).iter().filter(move |&&b| a < b).map(move |&b| canonical(a, b))
            })
            .collect()
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
}


fn canonical(a: NodeId, b: NodeId) -> Edge {
    if a < b { Edge::new(b, a) } else { Edge::new(a, b) }
}
