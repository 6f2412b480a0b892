//! Generic graph substrate: an index-based arena for directed acyclic graphs and undirected
//! graphs.
//!
//! Nodes are addressed by `NodeId` handles. A handle stays valid for the lifetime of the graph
//! (and of every clone of it) until its node is removed; handles are never reused.

use std::fmt;

mod directed;
mod undirected;

pub use self::directed::DirectedAcyclicGraph;
pub use self::undirected::UndirectedGraph;

/// Handle to a node of a graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {

    /// The position of the node in its arena
    pub fn index(self) -> usize {
        self.0
    }

    pub(crate) fn new(index: usize) -> Self {
        NodeId(index)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}


/// A directed edge. By convention the `head` is the child, whose distribution is conditioned on
/// the `tail` (the parent).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    pub head: NodeId,
    pub tail: NodeId
}

impl Edge {
    pub fn new(head: NodeId, tail: NodeId) -> Self {
        Edge { head, tail }
    }

    /// The same edge pointing the other way
    pub fn reversed(self) -> Self {
        Edge { head: self.tail, tail: self.head }
    }
}
