//! Scripted model client for tests: pops pre-loaded turns in order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AgentError;
use crate::message::Message;

use super::{ModelClient, ModelResponse, ModelUsage, StructuredResponse};

enum MockTurn {
    Text(String),
    Structured(Value),
    Fail(String),
    AuthFail(String),
}

/// Scripted [`ModelClient`]: each call consumes the next scripted turn.
///
/// An exhausted script answers with a fixed fallback so tests that do not
/// care about later turns stay short. Call counts are tracked for retry
/// assertions.
pub struct MockModel {
    script: Mutex<VecDeque<MockTurn>>,
    calls: AtomicUsize,
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queues a plain-text response.
    pub fn push_text(&self, content: impl Into<String>) {
        self.script
            .lock()
            .expect("mock script lock")
            .push_back(MockTurn::Text(content.into()));
    }

    /// Queues a structured (JSON) response.
    pub fn push_structured(&self, value: Value) {
        self.script
            .lock()
            .expect("mock script lock")
            .push_back(MockTurn::Structured(value));
    }

    /// Queues a transient failure ([`AgentError::Model`]).
    pub fn push_failure(&self, detail: impl Into<String>) {
        self.script
            .lock()
            .expect("mock script lock")
            .push_back(MockTurn::Fail(detail.into()));
    }

    /// Queues an unrecoverable failure ([`AgentError::Auth`]).
    pub fn push_auth_failure(&self, detail: impl Into<String>) {
        self.script
            .lock()
            .expect("mock script lock")
            .push_back(MockTurn::AuthFail(detail.into()));
    }

    /// Number of calls made so far (plain + structured).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_turn(&self) -> Option<MockTurn> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.lock().expect("mock script lock").pop_front()
    }

    fn usage() -> Option<ModelUsage> {
        Some(ModelUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        })
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelClient for MockModel {
    fn model_id(&self) -> &str {
        "mock"
    }

    async fn invoke(&self, _messages: &[Message]) -> Result<ModelResponse, AgentError> {
        match self.next_turn() {
            Some(MockTurn::Text(content)) => Ok(ModelResponse {
                content,
                usage: Self::usage(),
            }),
            Some(MockTurn::Structured(value)) => Ok(ModelResponse {
                content: value.to_string(),
                usage: Self::usage(),
            }),
            Some(MockTurn::Fail(detail)) => Err(AgentError::Model(detail)),
            Some(MockTurn::AuthFail(detail)) => Err(AgentError::Auth(detail)),
            None => Ok(ModelResponse {
                content: "mock response".to_string(),
                usage: Self::usage(),
            }),
        }
    }

    async fn invoke_structured(
        &self,
        _messages: &[Message],
        _schema_name: &str,
        _schema: &Value,
    ) -> Result<StructuredResponse, AgentError> {
        match self.next_turn() {
            Some(MockTurn::Structured(value)) => Ok(StructuredResponse {
                value,
                usage: Self::usage(),
            }),
            Some(MockTurn::Text(content)) => serde_json::from_str(&content)
                .map(|value| StructuredResponse {
                    value,
                    usage: Self::usage(),
                })
                .map_err(|e| AgentError::Schema(e.to_string())),
            Some(MockTurn::Fail(detail)) => Err(AgentError::Model(detail)),
            Some(MockTurn::AuthFail(detail)) => Err(AgentError::Auth(detail)),
            None => Err(AgentError::Schema("mock script exhausted".to_string())),
        }
    }
}
