//! Wiring: build and compile the research graph.
//!
//! Topology (fixed): `START → plan → research → critique -cond-> {refine |
//! finish}`, `refine → research` (the single back-edge), `finish → END`.
//! Exactly one conditional edge exists, at critique, so no path reaches a
//! second research cycle without passing the routing decision.

use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::AgentRunner;
use crate::graph::{CompilationError, CompiledStateGraph, StateGraph, END, START};
use crate::llm::ModelClient;
use crate::memory::MemoryStore;

use super::critique_node::CritiqueNode;
use super::finish_node::FinishNode;
use super::plan_node::PlanNode;
use super::refine_node::RefineNode;
use super::research_node::ResearchNode;
use super::route::{critique_router, NODE_CRITIQUE, NODE_FINISH, NODE_PLAN, NODE_REFINE, NODE_RESEARCH};
use super::state::ResearchState;

/// Dependencies the research nodes need.
pub struct ResearchGraphDeps {
    pub model: Arc<dyn ModelClient>,
    pub runner: Arc<AgentRunner>,
    pub store: Arc<dyn MemoryStore>,
}

/// Builds and compiles the research graph.
pub fn build_research_graph(
    deps: ResearchGraphDeps,
) -> Result<CompiledStateGraph<ResearchState>, CompilationError> {
    let mut graph = StateGraph::new();
    graph.add_node(NODE_PLAN, Arc::new(PlanNode::new(deps.model.clone())));
    graph.add_node(NODE_RESEARCH, Arc::new(ResearchNode::new(deps.runner)));
    graph.add_node(NODE_CRITIQUE, Arc::new(CritiqueNode::new(deps.model.clone())));
    graph.add_node(NODE_REFINE, Arc::new(RefineNode::new(deps.model)));
    graph.add_node(NODE_FINISH, Arc::new(FinishNode::new(deps.store)));

    graph.add_edge(START, NODE_PLAN);
    graph.add_edge(NODE_PLAN, NODE_RESEARCH);
    graph.add_edge(NODE_RESEARCH, NODE_CRITIQUE);
    graph.add_conditional_edges(
        NODE_CRITIQUE,
        Arc::new(critique_router),
        Some(HashMap::from([
            (NODE_REFINE.to_string(), NODE_REFINE.to_string()),
            (NODE_FINISH.to_string(), NODE_FINISH.to_string()),
        ])),
    );
    graph.add_edge(NODE_REFINE, NODE_RESEARCH);
    graph.add_edge(NODE_FINISH, END);

    graph.compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::generate_text;
    use crate::llm::MockModel;
    use crate::memory::InMemoryMemory;
    use crate::tool_source::ToolRegistry;
    use std::time::Duration;

    fn deps() -> ResearchGraphDeps {
        let model: Arc<dyn ModelClient> = Arc::new(MockModel::new());
        let registry = Arc::new(ToolRegistry::new(vec![]));
        let runner = Arc::new(AgentRunner::new(
            model.clone(),
            registry,
            Duration::from_secs(30),
        ));
        ResearchGraphDeps {
            model,
            runner,
            store: Arc::new(InMemoryMemory::new(4)),
        }
    }

    #[test]
    fn research_graph_compiles_with_expected_topology() {
        let graph = build_research_graph(deps()).expect("topology is valid");
        let text = generate_text(&graph);
        assert!(text.contains("__start__ -> plan"));
        assert!(text.contains("plan -> research"));
        assert!(text.contains("research -> critique"));
        assert!(text.contains("critique -? finish -> finish"));
        assert!(text.contains("critique -? refine -> refine"));
        assert!(text.contains("refine -> research"));
        assert!(text.contains("finish -> __end__"));
    }
}
