//! Crate-wide error types: validation, agent turns, and the orchestrator step.
//!
//! Per-area errors live with their area ([`StoreError`](crate::memory::StoreError),
//! [`ToolSourceError`](crate::tool_source::ToolSourceError),
//! [`CompilationError`](crate::graph::CompilationError)); this module holds the
//! errors that cross component boundaries.

use thiserror::Error;

use crate::graph::CompilationError;
use crate::memory::StoreError;
use crate::tool_source::ToolSourceError;

/// Input validation failure: fails fast, before any side effect.
///
/// Raised at the orchestrator entry (topic/user_id), at configuration load,
/// and by the memory store for bad operation arguments.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// Topic is empty or whitespace-only.
    #[error("topic must not be empty")]
    EmptyTopic,

    /// Topic exceeds the 500-character limit.
    #[error("topic too long: {0} chars (max 500)")]
    TopicTooLong(usize),

    /// `user_id` is not a valid UUID.
    #[error("user_id is not a valid UUID: {0}")]
    UserId(String),

    /// Message content is empty after trimming.
    #[error("message content must not be empty")]
    EmptyContent,

    /// Role string is not one of user / assistant / system.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// Embedding length does not match the configured dimension.
    #[error("embedding dimension {actual} does not match configured dimension {expected}")]
    Dimension { expected: usize, actual: usize },

    /// `top_k` outside [1, 1000].
    #[error("top_k must be in [1, 1000], got {0}")]
    TopK(u32),

    /// History `limit` must be positive.
    #[error("limit must be > 0")]
    Limit,

    /// Temporal query with `start > end`.
    #[error("invalid date range: start is after end")]
    DateRange,

    /// A configuration option failed to parse or is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Error from one agent turn or graph node execution.
///
/// Transient model failures are retried inside the agent runner (at most 2
/// retries) before surfacing; [`AgentError::Auth`] and [`AgentError::Quota`]
/// are unrecoverable and propagate immediately.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentError {
    /// Transient model transport or generation failure.
    #[error("model error: {0}")]
    Model(String),

    /// Authentication with the model provider failed; not retried.
    #[error("model authentication failed: {0}")]
    Auth(String),

    /// Provider quota exhausted; not retried.
    #[error("model quota exhausted: {0}")]
    Quota(String),

    /// Structured output did not match the requested schema.
    #[error("structured output did not match schema: {0}")]
    Schema(String),

    /// Graph runtime failure (unknown node id, step limit).
    #[error("graph error: {0}")]
    Graph(String),

    /// The run was cancelled cooperatively; no state was persisted.
    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    ToolSource(#[from] ToolSourceError),
}

impl AgentError {
    /// True for failures that must not be retried (auth revoked, quota
    /// exhausted, storage down, cancellation).
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            AgentError::Auth(_) | AgentError::Quota(_) | AgentError::Store(_) | AgentError::Cancelled
        )
    }
}

/// Step-level error returned to the workflow engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Compilation(#[from] CompilationError),

    #[error(transparent)]
    Agent(#[from] AgentError),
}
