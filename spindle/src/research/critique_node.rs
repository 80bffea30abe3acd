//! Critique node: score the current synthesis and name the gaps.
//!
//! The score is advisory: it routes against the threshold, nothing more.
//! Routing itself happens on the conditional edge, not here.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::AgentError;
use crate::graph::{Next, Node};
use crate::llm::{invoke_structured_with_retry, ModelClient};
use crate::message::Message;

use super::route::NODE_CRITIQUE;
use super::state::{ResearchState, ResearchStatus};

const CRITIQUE_RETRIES: u32 = 2;

const CRITIQUE_SYSTEM_PROMPT: &str = "You are a strict research critic. Given a topic, a draft \
answer, and the number of sources gathered, score the draft's quality from 0.0 to 1.0 and name \
concrete gaps. Be conservative: missing citations, vague claims, and unanswered parts of the \
topic lower the score.";

fn critique_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "quality_score": {"type": "number", "minimum": 0.0, "maximum": 1.0},
            "critique": {"type": "string"},
            "gaps": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["quality_score", "critique"],
        "additionalProperties": false
    })
}

pub struct CritiqueNode {
    model: Arc<dyn ModelClient>,
}

impl CritiqueNode {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Node<ResearchState> for CritiqueNode {
    fn id(&self) -> &str {
        NODE_CRITIQUE
    }

    /// Writes `quality_score` and `critique`. Does not increment the
    /// iteration counter.
    async fn run(&self, mut state: ResearchState) -> Result<(ResearchState, Next), AgentError> {
        let span = tracing::Span::current();
        span.record("iteration_count", state.iteration_count as i64);
        span.record("status", state.status.as_str());

        let messages = [
            Message::system(CRITIQUE_SYSTEM_PROMPT),
            Message::user(format!(
                "Topic: {}\nSources gathered: {}\nDraft answer:\n{}",
                state.topic,
                state.sources.len(),
                state.refined_answer.as_deref().unwrap_or("(no draft yet)"),
            )),
        ];
        let schema = critique_schema();
        let response = invoke_structured_with_retry(
            self.model.as_ref(),
            &messages,
            "critique",
            &schema,
            CRITIQUE_RETRIES,
        )
        .await?;

        let score = response
            .value
            .get("quality_score")
            .and_then(Value::as_f64)
            .ok_or_else(|| AgentError::Schema("critique missing quality_score".into()))?;
        let critique = response
            .value
            .get("critique")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        state.quality_score = score.clamp(0.0, 1.0);
        state.critique = Some(critique);
        state.status = ResearchStatus::Critiquing;
        Ok((state, Next::Continue))
    }
}
