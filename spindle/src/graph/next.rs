//! Routing value returned by each node.

/// What the runner does after a node completes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Next {
    /// Follow the graph's edge (linear or conditional) out of this node.
    Continue,
    /// Jump directly to the named node, bypassing the edge.
    Node(String),
    /// Stop the run here with the current state.
    End,
}
