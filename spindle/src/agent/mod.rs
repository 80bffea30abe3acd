//! Agent turn: one reasoning step with tool use, gap pre-check, and
//! risk-aware deferral.
//!
//! [`AgentRunner::run`] produces either an [`AgentResponse`] (answer,
//! reasoning, tool-call records, confidence) or a
//! [`ToolGapReport`](crate::tool_source::ToolGapReport) when the task needs
//! tools that are not available. Non-reversible tool requests are never
//! executed inside the turn; they are deferred onto the caller's planned
//! actions for the orchestrator to gate.

mod runner;

pub use runner::AgentRunner;

use serde_json::Value;

use crate::risk::RiskLevel;
use crate::tool_source::ToolGapReport;

/// Outcome of one executed tool call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolCallStatus {
    Success,
    Failed,
    Timeout,
}

/// Immutable record of one executed tool call.
///
/// `result` is `None` unless `status` is `Success`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub parameters: Value,
    pub result: Option<Value>,
    pub duration_ms: u64,
    pub status: ToolCallStatus,
}

/// One completed agent turn.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AgentResponse {
    /// Non-empty final answer.
    pub answer: String,
    /// Non-empty reasoning trace.
    pub reasoning: String,
    /// Executed tool calls, in order. May be empty.
    pub tool_calls: Vec<ToolCallRecord>,
    /// In `[0.0, 1.0]`; lowered by failed or timed-out tool calls.
    pub confidence: f64,
}

/// An action the model proposed but the turn did not execute.
///
/// Carried on the research state until the orchestrator gates it through
/// the risk classifier and, where required, the approval coordinator.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PlannedAction {
    /// Tool name the action would invoke.
    pub action_type: String,
    pub action_description: String,
    pub parameters: Value,
    pub risk_level: RiskLevel,
}

/// What one agent turn produced: a response, or an honest refusal.
#[derive(Clone, Debug)]
pub enum AgentOutcome {
    Response(AgentResponse),
    Gap(ToolGapReport),
}

/// Turn result: the outcome plus any actions deferred for approval.
#[derive(Clone, Debug)]
pub struct AgentTurn {
    pub outcome: AgentOutcome,
    pub planned_actions: Vec<PlannedAction>,
}
