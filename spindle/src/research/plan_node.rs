//! Plan node: turn the topic into a focused research plan.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::graph::{Next, Node};
use crate::llm::{invoke_with_retry, ModelClient};
use crate::message::Message;

use super::route::NODE_PLAN;
use super::state::{ResearchState, ResearchStatus};

const PLAN_RETRIES: u32 = 2;

const PLAN_SYSTEM_PROMPT: &str = "You are a research planner. Produce a short, concrete plan \
(3-5 numbered steps) for researching the user's topic with web search and memory tools. \
Plain text only.";

pub struct PlanNode {
    model: Arc<dyn ModelClient>,
}

impl PlanNode {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Node<ResearchState> for PlanNode {
    fn id(&self) -> &str {
        NODE_PLAN
    }

    /// Writes `state.plan` and moves to researching. Does not touch the
    /// iteration counter.
    async fn run(&self, mut state: ResearchState) -> Result<(ResearchState, Next), AgentError> {
        let span = tracing::Span::current();
        span.record("iteration_count", state.iteration_count as i64);
        span.record("status", state.status.as_str());

        let messages = [
            Message::system(PLAN_SYSTEM_PROMPT),
            Message::user(format!("Topic: {}", state.topic)),
        ];
        let response = invoke_with_retry(self.model.as_ref(), &messages, PLAN_RETRIES).await?;
        let plan = if response.content.trim().is_empty() {
            format!("1. Search the web for \"{}\" and collect sources.", state.topic)
        } else {
            response.content
        };

        state.plan = Some(plan);
        state.status = ResearchStatus::Researching;
        Ok((state, Next::Continue))
    }
}
