//! Graph compilation error.
//!
//! Returned by [`StateGraph::compile`](super::StateGraph::compile) when the
//! topology is invalid: unknown node ids, missing START/END, a node with
//! both an unconditional edge and conditional edges, or a bad path-map
//! target.

use thiserror::Error;

/// Error when compiling a state graph.
#[derive(Debug, Error)]
pub enum CompilationError {
    /// An edge references a node id never registered via `add_node`.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// There must be exactly one edge from START.
    #[error("graph must have exactly one edge from START")]
    MissingStart,

    /// No path reaches END (neither an edge nor a conditional target).
    #[error("graph must have an edge or conditional path to END")]
    MissingEnd,

    /// Edges violate the one-outgoing-edge-per-node rule.
    #[error("invalid edge layout: {0}")]
    InvalidChain(String),

    /// A node has both an outgoing edge and conditional edges.
    #[error("node has both edge and conditional edges: {0}")]
    NodeHasBothEdgeAndConditional(String),

    /// A conditional path-map value is not a node id or END.
    #[error("conditional path_map invalid target: {0}")]
    InvalidConditionalPathMap(String),
}
