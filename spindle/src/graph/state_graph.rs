//! Graph builder: nodes, edges, conditional edges, and compile-time
//! validation.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;

use super::compile_error::CompilationError;
use super::compiled::CompiledStateGraph;
use super::node::Node;

/// Sentinel for graph entry: use as `from_id` in `add_edge(START, first)`.
pub const START: &str = "__start__";

/// Sentinel for graph exit: use as `to_id` in `add_edge(last, END)`.
pub const END: &str = "__end__";

/// Routing function for conditional edges: `(state) -> key`.
pub type ConditionalRouterFn<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// A conditional edge: router plus optional key → node-id map.
pub struct ConditionalRouter<S> {
    pub path: ConditionalRouterFn<S>,
    pub path_map: Option<HashMap<String, String>>,
}

impl<S> ConditionalRouter<S> {
    pub fn new(path: ConditionalRouterFn<S>, path_map: Option<HashMap<String, String>>) -> Self {
        Self { path, path_map }
    }
}

impl<S> Clone for ConditionalRouter<S> {
    fn clone(&self) -> Self {
        Self {
            path: Arc::clone(&self.path),
            path_map: self.path_map.clone(),
        }
    }
}

/// Outgoing transition of a node in the compiled graph.
pub enum NextEntry<S> {
    Unconditional(String),
    Conditional(ConditionalRouter<S>),
}

/// State graph: nodes plus explicit edges and optional conditional edges.
///
/// Generic over state type `S`. A node must have either one outgoing
/// `add_edge` or `add_conditional_edges`, not both. Back-edges (cycles) are
/// permitted only through conditional routing, so every loop passes a
/// routing decision; a purely linear chain must be acyclic.
pub struct StateGraph<S> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: Vec<(String, String)>,
    conditional_edges: HashMap<String, ConditionalRouter<S>>,
}

impl<S> Default for StateGraph<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> StateGraph<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: Vec::new(),
            conditional_edges: HashMap::new(),
        }
    }

    /// Adds a node; id must be unique. Replaces on same id.
    pub fn add_node(&mut self, id: impl Into<String>, node: Arc<dyn Node<S>>) -> &mut Self {
        self.nodes.insert(id.into(), node);
        self
    }

    /// Adds an edge from `from_id` to `to_id`. Use [`START`] / [`END`] for
    /// entry and exit.
    pub fn add_edge(&mut self, from_id: impl Into<String>, to_id: impl Into<String>) -> &mut Self {
        self.edges.push((from_id.into(), to_id.into()));
        self
    }

    /// Adds conditional edges from `source`: after the node runs, `path` is
    /// called with the updated state; the returned key is looked up in
    /// `path_map` when provided, else used directly as the next node id (or
    /// [`END`]).
    pub fn add_conditional_edges(
        &mut self,
        source: impl Into<String>,
        path: ConditionalRouterFn<S>,
        path_map: Option<HashMap<String, String>>,
    ) -> &mut Self {
        self.conditional_edges
            .insert(source.into(), ConditionalRouter::new(path, path_map));
        self
    }

    /// Validates the topology and builds the executable graph.
    pub fn compile(self) -> Result<CompiledStateGraph<S>, CompilationError> {
        for (from, to) in &self.edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(CompilationError::NodeNotFound(from.clone()));
            }
            if to != END && !self.nodes.contains_key(to) {
                return Err(CompilationError::NodeNotFound(to.clone()));
            }
        }
        for (source, router) in &self.conditional_edges {
            if !self.nodes.contains_key(source) {
                return Err(CompilationError::NodeNotFound(source.clone()));
            }
            if let Some(ref path_map) = router.path_map {
                for target in path_map.values() {
                    if target != END && !self.nodes.contains_key(target) {
                        return Err(CompilationError::InvalidConditionalPathMap(target.clone()));
                    }
                }
            }
        }

        let start_edges: Vec<_> = self
            .edges
            .iter()
            .filter(|(f, _)| f == START)
            .map(|(_, t)| t.clone())
            .collect();
        let first = match start_edges.len() {
            1 => start_edges.into_iter().next().expect("one start edge"),
            _ => return Err(CompilationError::MissingStart),
        };

        let has_end = self.edges.iter().any(|(_, t)| t == END)
            || self.conditional_edges.values().any(|r| {
                r.path_map
                    .as_ref()
                    .map_or(true, |m| m.values().any(|v| v == END))
            });
        if !has_end {
            return Err(CompilationError::MissingEnd);
        }

        let edge_froms: HashSet<_> = self
            .edges
            .iter()
            .filter(|(f, _)| f.as_str() != START)
            .map(|(f, _)| f.clone())
            .collect();
        if edge_froms.len()
            != self
                .edges
                .iter()
                .filter(|(f, _)| f.as_str() != START)
                .count()
        {
            return Err(CompilationError::InvalidChain(
                "duplicate outgoing edge (branch)".into(),
            ));
        }
        for source in self.conditional_edges.keys() {
            if edge_froms.contains(source) {
                return Err(CompilationError::NodeHasBothEdgeAndConditional(
                    source.clone(),
                ));
            }
        }

        // A cycle in the plain edges would run without ever passing a
        // routing decision; only conditional graphs may loop.
        if self.conditional_edges.is_empty() {
            let linear_next: HashMap<&str, &str> = self
                .edges
                .iter()
                .filter(|(f, _)| f.as_str() != START)
                .map(|(f, t)| (f.as_str(), t.as_str()))
                .collect();
            let mut current = first.as_str();
            let mut visited = HashSet::new();
            visited.insert(current);
            while let Some(&next) = linear_next.get(current) {
                if next == END {
                    break;
                }
                if !visited.insert(next) {
                    return Err(CompilationError::InvalidChain("cycle detected".into()));
                }
                current = next;
            }
        }

        let mut next_map: HashMap<String, NextEntry<S>> = self
            .edges
            .iter()
            .filter(|(f, _)| f.as_str() != START)
            .map(|(f, t)| (f.clone(), NextEntry::Unconditional(t.clone())))
            .collect();
        for (source, router) in &self.conditional_edges {
            next_map.insert(source.clone(), NextEntry::Conditional(router.clone()));
        }

        Ok(CompiledStateGraph::new(self.nodes, first, next_map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::error::AgentError;
    use crate::graph::Next;

    #[derive(Clone, Debug)]
    struct DummyState;

    #[derive(Clone)]
    struct DummyNode(&'static str);

    #[async_trait]
    impl Node<DummyState> for DummyNode {
        fn id(&self) -> &str {
            self.0
        }
        async fn run(&self, state: DummyState) -> Result<(DummyState, Next), AgentError> {
            Ok((state, Next::Continue))
        }
    }

    /// **Scenario**: Compile fails when a node has both an outgoing edge and
    /// conditional edges.
    #[test]
    fn compile_fails_when_node_has_both_edge_and_conditional() {
        let mut graph = StateGraph::<DummyState>::new();
        graph.add_node("a", Arc::new(DummyNode("a")));
        graph.add_node("b", Arc::new(DummyNode("b")));
        graph.add_edge(START, "a");
        graph.add_edge("a", "b");
        graph.add_edge("b", END);
        graph.add_conditional_edges(
            "a",
            Arc::new(|_| "b".to_string()),
            Some([("b".to_string(), "b".to_string())].into_iter().collect()),
        );
        match graph.compile() {
            Err(CompilationError::NodeHasBothEdgeAndConditional(id)) => assert_eq!(id, "a"),
            other => panic!("expected NodeHasBothEdgeAndConditional, got {:?}", other.err()),
        }
    }

    /// **Scenario**: Compile fails when a conditional path_map references a
    /// node that does not exist.
    #[test]
    fn compile_fails_on_invalid_path_map_target() {
        let mut graph = StateGraph::<DummyState>::new();
        graph.add_node("a", Arc::new(DummyNode("a")));
        graph.add_edge(START, "a");
        graph.add_conditional_edges(
            "a",
            Arc::new(|_| "x".to_string()),
            Some(
                [("x".to_string(), "nonexistent".to_string())]
                    .into_iter()
                    .collect(),
            ),
        );
        match graph.compile() {
            Err(CompilationError::InvalidConditionalPathMap(id)) => assert_eq!(id, "nonexistent"),
            other => panic!("expected InvalidConditionalPathMap, got {:?}", other.err()),
        }
    }

    #[test]
    fn compile_fails_without_start_edge() {
        let mut graph = StateGraph::<DummyState>::new();
        graph.add_node("a", Arc::new(DummyNode("a")));
        graph.add_edge("a", END);
        assert!(matches!(
            graph.compile(),
            Err(CompilationError::MissingStart)
        ));
    }

    #[test]
    fn compile_fails_without_path_to_end() {
        let mut graph = StateGraph::<DummyState>::new();
        graph.add_node("a", Arc::new(DummyNode("a")));
        graph.add_edge(START, "a");
        assert!(matches!(graph.compile(), Err(CompilationError::MissingEnd)));
    }

    #[test]
    fn compile_fails_on_linear_cycle() {
        let mut graph = StateGraph::<DummyState>::new();
        graph.add_node("a", Arc::new(DummyNode("a")));
        graph.add_node("b", Arc::new(DummyNode("b")));
        graph.add_node("c", Arc::new(DummyNode("c")));
        graph.add_edge(START, "a");
        graph.add_edge("a", "b");
        graph.add_edge("b", "a");
        graph.add_edge("c", END);
        assert!(matches!(
            graph.compile(),
            Err(CompilationError::InvalidChain(_))
        ));
    }

    #[test]
    fn compile_fails_on_unknown_edge_target() {
        let mut graph = StateGraph::<DummyState>::new();
        graph.add_node("a", Arc::new(DummyNode("a")));
        graph.add_edge(START, "a");
        graph.add_edge("a", "ghost");
        assert!(matches!(
            graph.compile(),
            Err(CompilationError::NodeNotFound(id)) if id == "ghost"
        ));
    }
}
