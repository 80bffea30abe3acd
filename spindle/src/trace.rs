//! Structured audit events emitted during a run.
//!
//! These integrate with the `tracing` pipeline and are machine-parseable:
//! each event serializes to one JSON object tagged by `event`. They carry
//! the decisions an operator audits after the fact (approvals, escalations,
//! gaps, stored reports). Spans carry timing; these carry outcomes.

use serde::Serialize;
use uuid::Uuid;

/// Audit events. Emit with [`TraceEvent::emit`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    /// An approval gate opened for a planned action.
    ApprovalRequested {
        approval_id: Uuid,
        action_type: String,
    },

    /// An approval timed out; the action was skipped, never executed.
    ApprovalEscalated {
        approval_id: Uuid,
        action_type: String,
        reason: String,
        escalation_action: String,
    },

    /// A human rejected a planned action.
    ActionRejected {
        action_type: String,
        approver: Option<String>,
    },

    /// A planned action was dispatched.
    ActionExecuted { action_type: String },

    /// A planned action was skipped without dispatch.
    ActionSkipped { action_type: String, reason: String },

    /// Capability extraction was unavailable; the run proceeded without a
    /// gap check (degraded no-gap case).
    CapabilityExtractionFailed { detail: String },

    /// Required capabilities were not a subset of the available tools.
    ToolGapDetected {
        attempted_task: String,
        missing: Vec<String>,
    },

    /// The finish node persisted a report document.
    ReportStored {
        doc_id: Uuid,
        iterations: u32,
        source_count: usize,
    },
}

impl TraceEvent {
    /// Emits this event on the current span as a structured log line.
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "spindle_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag() {
        let event = TraceEvent::ApprovalEscalated {
            approval_id: Uuid::nil(),
            action_type: "send_email".into(),
            reason: "approval_timeout".into(),
            escalation_action: "skip_and_notify".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"ApprovalEscalated\""));
        assert!(json.contains("approval_timeout"));
        event.emit();
    }
}
