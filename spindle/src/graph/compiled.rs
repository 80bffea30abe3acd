//! Executable graph: drives nodes sequentially with routing, snapshot
//! streaming, and cooperative cancellation.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::AgentError;
use crate::telemetry;

use super::node::Node;
use super::state_graph::{NextEntry, END};
use super::Next;

/// Safety valve against mis-wired graphs; domain termination bounds (the
/// iteration cap) live in the state, not here.
const DEFAULT_STEP_LIMIT: usize = 64;

/// Observable progress of a streaming run.
#[derive(Clone, Debug)]
pub enum GraphEvent<S> {
    /// A node completed; `snapshot` is a read-only copy of the state.
    NodeCompleted { node: String, snapshot: S },
    /// The run reached END with this final state.
    Finished { state: S },
    /// The run failed; the error already carries span records.
    Failed { error: String },
}

/// Compiled, immutable graph ready for `invoke` / `stream`.
///
/// **Interaction**: Produced by
/// [`StateGraph::compile`](super::StateGraph::compile); the orchestrator
/// invokes it once per step.
pub struct CompiledStateGraph<S> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    first_node_id: String,
    next_map: HashMap<String, NextEntry<S>>,
    step_limit: usize,
}

impl<S> CompiledStateGraph<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    pub(super) fn new(
        nodes: HashMap<String, Arc<dyn Node<S>>>,
        first_node_id: String,
        next_map: HashMap<String, NextEntry<S>>,
    ) -> Self {
        Self {
            nodes,
            first_node_id,
            next_map,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub(super) fn nodes(&self) -> &HashMap<String, Arc<dyn Node<S>>> {
        &self.nodes
    }

    pub(super) fn first_node_id(&self) -> &str {
        &self.first_node_id
    }

    pub(super) fn next_map(&self) -> &HashMap<String, NextEntry<S>> {
        &self.next_map
    }

    /// Runs the graph to completion and returns the final state.
    ///
    /// Cancellation is honored before every node; a cancelled run returns
    /// [`AgentError::Cancelled`] and persists nothing.
    pub async fn invoke(&self, state: S, cancel: &CancellationToken) -> Result<S, AgentError> {
        let span = telemetry::graph_span();
        let result = self
            .run_loop(state, cancel, None)
            .instrument(span.clone())
            .await;
        telemetry::record_success(&span, result.is_ok());
        result
    }

    /// Streaming variant: yields a [`GraphEvent::NodeCompleted`] snapshot
    /// after every node, then `Finished` or `Failed`.
    ///
    /// Snapshots are copies; mutating them does not affect the run.
    pub fn stream(
        self: Arc<Self>,
        state: S,
        cancel: CancellationToken,
    ) -> ReceiverStream<GraphEvent<S>> {
        let (tx, rx) = mpsc::channel(16);
        let graph = self;
        tokio::spawn(async move {
            let span = telemetry::graph_span();
            let result = graph
                .run_loop(state, &cancel, Some(&tx))
                .instrument(span.clone())
                .await;
            telemetry::record_success(&span, result.is_ok());
            let event = match result {
                Ok(final_state) => GraphEvent::Finished { state: final_state },
                Err(err) => GraphEvent::Failed {
                    error: err.to_string(),
                },
            };
            let _ = tx.send(event).await;
        });
        ReceiverStream::new(rx)
    }

    async fn run_loop(
        &self,
        mut state: S,
        cancel: &CancellationToken,
        events: Option<&mpsc::Sender<GraphEvent<S>>>,
    ) -> Result<S, AgentError> {
        let mut current = self.first_node_id.clone();
        let mut steps = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            steps += 1;
            if steps > self.step_limit {
                return Err(AgentError::Graph(format!(
                    "step limit {} exceeded at node {}",
                    self.step_limit, current
                )));
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| AgentError::Graph(format!("unknown node: {}", current)))?;
            let span = telemetry::node_span(node.id());
            let (next_state, next) = match node.run(state).instrument(span.clone()).await {
                Ok(output) => {
                    telemetry::record_success(&span, true);
                    output
                }
                Err(err) => {
                    telemetry::record_success(&span, false);
                    tracing::error!(node = %current, error = %err, "graph node failed");
                    return Err(err);
                }
            };
            state = next_state;

            if let Some(tx) = events {
                let _ = tx
                    .send(GraphEvent::NodeCompleted {
                        node: current.clone(),
                        snapshot: state.clone(),
                    })
                    .await;
            }

            let resolved = match next {
                Next::End => break,
                Next::Node(id) => id,
                Next::Continue => match self.next_map.get(&current) {
                    Some(NextEntry::Unconditional(to)) => to.clone(),
                    Some(NextEntry::Conditional(router)) => {
                        let key = (router.path)(&state);
                        let target = router
                            .path_map
                            .as_ref()
                            .and_then(|m| m.get(&key).cloned())
                            .unwrap_or(key);
                        let edge_span = telemetry::edge_span(&current, &target);
                        edge_span.in_scope(|| {
                            tracing::debug!(from = %current, next_node = %target, "routing decision");
                        });
                        target
                    }
                    // No outgoing edge: only reachable via explicit jumps;
                    // treat as terminal.
                    None => break,
                },
            };

            if resolved == END {
                break;
            }
            if !self.nodes.contains_key(&resolved) {
                return Err(AgentError::Graph(format!("unknown node: {}", resolved)));
            }
            current = resolved;
        }
        Ok(state)
    }
}
