//! Human approval gate: suspend until an external decision or timeout.
//!
//! [`ApprovalCoordinator::request_approval`] blocks (cooperatively) on a
//! oneshot resume channel. Three outcomes, all equally ordinary:
//! `Approved`, `Rejected` (external resume), `Escalated` (timeout; the
//! action is skipped and an audit event is emitted, never auto-approved).
//!
//! The pending map is the coordinator's externally visible surface: the
//! embedding workflow engine maps its per-suspend resume URLs onto
//! [`approve`](ApprovalCoordinator::approve) / [`reject`](ApprovalCoordinator::reject)
//! by approval id.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::trace::TraceEvent;

/// Escalation reason recorded on timeout.
pub const ESCALATION_REASON_TIMEOUT: &str = "approval_timeout";
/// What the engine does with an escalated action.
pub const ESCALATION_ACTION_SKIP: &str = "skip_and_notify";

/// Default wait for a human decision.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(300);

/// External resume payload.
#[derive(Debug)]
struct ResumeSignal {
    approved: bool,
    approver: Option<String>,
    comment: Option<String>,
}

/// Metadata attached to an external decision.
#[derive(Clone, Debug, serde::Serialize)]
pub struct DecisionMetadata {
    pub approver: Option<String>,
    pub comment: Option<String>,
    /// Wall time between request and resume.
    pub waited_ms: u64,
}

/// Outcome of one approval gate.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum ApprovalOutcome {
    Approved(DecisionMetadata),
    Rejected(DecisionMetadata),
    Escalated {
        reason: String,
        escalation_action: String,
    },
}

/// Serializable snapshot of a pending approval.
#[derive(Clone, Debug, serde::Serialize)]
pub struct PendingApproval {
    pub id: Uuid,
    pub action_type: String,
    pub action_description: String,
    pub requester_id: String,
    pub requested_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
}

struct Pending {
    info: PendingApproval,
    respond: oneshot::Sender<ResumeSignal>,
}

/// Coordinator for suspend-and-wait approval gates.
///
/// **Interaction**: The orchestrator calls
/// [`request_approval`](ApprovalCoordinator::request_approval) per gated
/// action, sequentially. The embedding engine resolves pending entries via
/// [`approve`](ApprovalCoordinator::approve) /
/// [`reject`](ApprovalCoordinator::reject).
pub struct ApprovalCoordinator {
    pending: Mutex<HashMap<Uuid, Pending>>,
    timeout: Duration,
}

impl ApprovalCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// The configured decision timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Suspends until an external decision or the configured timeout.
    ///
    /// Timeout is an ordinary resume path: the result is
    /// [`ApprovalOutcome::Escalated`], the pending entry is removed, an audit
    /// event is emitted, and the caller skips the action.
    pub async fn request_approval(
        &self,
        action_type: &str,
        action_description: &str,
        requester_id: &str,
    ) -> ApprovalOutcome {
        let id = Uuid::new_v4();
        let requested_at = Utc::now();
        let timeout_at = requested_at
            + chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::seconds(300));
        let (tx, rx) = oneshot::channel();

        let info = PendingApproval {
            id,
            action_type: action_type.to_string(),
            action_description: action_description.to_string(),
            requester_id: requester_id.to_string(),
            requested_at,
            timeout_at,
        };
        TraceEvent::ApprovalRequested {
            approval_id: id,
            action_type: action_type.to_string(),
        }
        .emit();
        self.pending
            .lock()
            .insert(id, Pending { info, respond: tx });

        let started = std::time::Instant::now();
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(signal)) => {
                let metadata = DecisionMetadata {
                    approver: signal.approver,
                    comment: signal.comment,
                    waited_ms: started.elapsed().as_millis() as u64,
                };
                if signal.approved {
                    ApprovalOutcome::Approved(metadata)
                } else {
                    ApprovalOutcome::Rejected(metadata)
                }
            }
            // Sender dropped without a decision, or the window elapsed:
            // both resolve to escalation, never to approval.
            Ok(Err(_)) | Err(_) => {
                self.pending.lock().remove(&id);
                TraceEvent::ApprovalEscalated {
                    approval_id: id,
                    action_type: action_type.to_string(),
                    reason: ESCALATION_REASON_TIMEOUT.to_string(),
                    escalation_action: ESCALATION_ACTION_SKIP.to_string(),
                }
                .emit();
                ApprovalOutcome::Escalated {
                    reason: ESCALATION_REASON_TIMEOUT.to_string(),
                    escalation_action: ESCALATION_ACTION_SKIP.to_string(),
                }
            }
        }
    }

    /// Resolves a pending approval positively. Returns `false` if unknown.
    pub fn approve(&self, id: Uuid, approver: Option<String>, comment: Option<String>) -> bool {
        self.resolve(id, true, approver, comment)
    }

    /// Resolves a pending approval negatively. Returns `false` if unknown.
    pub fn reject(&self, id: Uuid, approver: Option<String>, comment: Option<String>) -> bool {
        self.resolve(id, false, approver, comment)
    }

    fn resolve(
        &self,
        id: Uuid,
        approved: bool,
        approver: Option<String>,
        comment: Option<String>,
    ) -> bool {
        if let Some(pending) = self.pending.lock().remove(&id) {
            let _ = pending.respond.send(ResumeSignal {
                approved,
                approver,
                comment,
            });
            return true;
        }
        false
    }

    /// Snapshot of everything currently awaiting a decision.
    pub fn list_pending(&self) -> Vec<PendingApproval> {
        self.pending
            .lock()
            .values()
            .map(|p| p.info.clone())
            .collect()
    }
}
