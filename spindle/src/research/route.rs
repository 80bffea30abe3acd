//! Conditional routing out of the critique node.

use super::state::ResearchState;

pub const NODE_PLAN: &str = "plan";
pub const NODE_RESEARCH: &str = "research";
pub const NODE_CRITIQUE: &str = "critique";
pub const NODE_REFINE: &str = "refine";
pub const NODE_FINISH: &str = "finish";

/// Decides where to go after critique. Priority order is load-bearing:
///
/// 1. Iteration cap reached → finish (hard stop, checked first).
/// 2. Quality threshold met → finish.
/// 3. Otherwise → refine (which loops back to research).
pub fn critique_router(state: &ResearchState) -> String {
    if state.iteration_count >= state.max_iterations {
        return NODE_FINISH.to_string();
    }
    if state.quality_score >= state.quality_threshold {
        return NODE_FINISH.to_string();
    }
    NODE_REFINE.to_string()
}
