//! Refine node: improve the synthesis using the critique, then loop back
//! to research.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::graph::{Next, Node};
use crate::llm::{invoke_with_retry, ModelClient};
use crate::message::Message;

use super::route::NODE_REFINE;
use super::state::{ResearchState, ResearchStatus};

const REFINE_RETRIES: u32 = 2;

const REFINE_SYSTEM_PROMPT: &str = "You improve research drafts. Given a topic, a draft answer, \
and a critique, produce a revised answer that addresses the critique. Keep cited facts; do not \
invent sources.";

pub struct RefineNode {
    model: Arc<dyn ModelClient>,
}

impl RefineNode {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Node<ResearchState> for RefineNode {
    fn id(&self) -> &str {
        NODE_REFINE
    }

    /// Updates `refined_answer` and hands control back to research (the
    /// graph's back-edge). Does not increment the iteration counter.
    async fn run(&self, mut state: ResearchState) -> Result<(ResearchState, Next), AgentError> {
        let span = tracing::Span::current();
        span.record("iteration_count", state.iteration_count as i64);
        span.record("status", state.status.as_str());

        let messages = [
            Message::system(REFINE_SYSTEM_PROMPT),
            Message::user(format!(
                "Topic: {}\nCritique:\n{}\nCurrent draft:\n{}",
                state.topic,
                state.critique.as_deref().unwrap_or("(no critique)"),
                state.refined_answer.as_deref().unwrap_or("(no draft)"),
            )),
        ];
        let response = invoke_with_retry(self.model.as_ref(), &messages, REFINE_RETRIES).await?;
        if !response.content.trim().is_empty() {
            state.refined_answer = Some(response.content);
        }
        state.status = ResearchStatus::Researching;
        Ok((state, Next::Continue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockModel;

    #[tokio::test]
    async fn refine_updates_answer_and_loops_back_to_researching() {
        let model = Arc::new(MockModel::new());
        model.push_text("better draft");
        let node = RefineNode::new(model);

        let mut state = ResearchState::new("t", "u", 5, 0.8);
        state.refined_answer = Some("draft".into());
        state.critique = Some("too shallow".into());
        state.iteration_count = 1;

        let (state, next) = node.run(state).await.unwrap();
        assert_eq!(state.refined_answer.as_deref(), Some("better draft"));
        assert_eq!(state.status, ResearchStatus::Researching);
        assert_eq!(state.iteration_count, 1, "refine never increments");
        assert_eq!(next, Next::Continue);
    }

    #[tokio::test]
    async fn empty_refinement_keeps_previous_draft() {
        let model = Arc::new(MockModel::new());
        model.push_text("  ");
        let node = RefineNode::new(model);
        let mut state = ResearchState::new("t", "u", 5, 0.8);
        state.refined_answer = Some("keep me".into());
        let (state, _) = node.run(state).await.unwrap();
        assert_eq!(state.refined_answer.as_deref(), Some("keep me"));
    }
}
