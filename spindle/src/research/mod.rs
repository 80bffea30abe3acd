//! The research workflow: Plan → Research → Critique → Refine → Finish.
//!
//! A cyclical state machine with guaranteed termination. Only the research
//! node increments `iteration_count`; the single conditional edge out of
//! critique checks the iteration cap before the quality threshold, so at
//! most [`MAX_RESEARCH_ITERATIONS`] research turns run regardless of
//! configuration. State is owned by the graph for the duration of the run;
//! streamed snapshots are copies.

mod build;
mod critique_node;
mod finish_node;
mod plan_node;
mod refine_node;
mod research_node;
mod route;
mod state;

pub use build::{build_research_graph, ResearchGraphDeps};
pub use critique_node::CritiqueNode;
pub use finish_node::FinishNode;
pub use plan_node::PlanNode;
pub use refine_node::RefineNode;
pub use research_node::ResearchNode;
pub use route::{critique_router, NODE_CRITIQUE, NODE_FINISH, NODE_PLAN, NODE_REFINE, NODE_RESEARCH};
pub use state::{
    ResearchState, ResearchStatus, SourceReference, DEFAULT_QUALITY_THRESHOLD,
    MAX_RESEARCH_ITERATIONS,
};
