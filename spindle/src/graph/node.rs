//! Graph node trait: one step in a [`StateGraph`](super::StateGraph).

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::AgentError;

use super::Next;

/// One step in a graph: state in, (state out, next step).
///
/// Return [`Next::Continue`] to follow the node's outgoing edge,
/// [`Next::Node`] to jump, [`Next::End`] to stop the run. Dependencies
/// (model, store, runner) are injected at node construction; the runner
/// passes only state.
///
/// **Interaction**: Implemented by the research nodes; registered via
/// [`StateGraph::add_node`](super::StateGraph::add_node); driven by
/// [`CompiledStateGraph::invoke`](super::CompiledStateGraph::invoke).
#[async_trait]
pub trait Node<S>: Send + Sync
where
    S: Clone + Send + Sync + Debug + 'static,
{
    /// Node id (e.g. `"plan"`). Unique within a graph.
    fn id(&self) -> &str;

    /// One step: state in, (state out, next step).
    async fn run(&self, state: S) -> Result<(S, Next), AgentError>;
}
