//! Orchestrator step: the entry point the external workflow engine invokes.
//!
//! Validates input, compiles and drives the research graph, then walks the
//! planned actions in list order: auto-execute what needs no approval, gate
//! the rest through the approval coordinator, sequentially. The report was
//! already formatted and persisted inside the graph's finish node; this
//! layer returns the document id and a JSON-serializable result summary.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::agent::{AgentRunner, PlannedAction};
use crate::approval::{ApprovalCoordinator, ApprovalOutcome};
use crate::config::EngineConfig;
use crate::error::{OrchestratorError, ValidationError};
use crate::llm::ModelClient;
use crate::memory::MemoryStore;
use crate::research::{build_research_graph, ResearchGraphDeps, ResearchState};
use crate::risk::{categorize, requires_approval};
use crate::telemetry;
use crate::tool_source::{ToolGapReport, ToolRegistry};
use crate::trace::TraceEvent;

const MAX_TOPIC_LEN: usize = 500;
const RESULT_SUMMARY_LEN: usize = 200;

/// Input from the workflow engine.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct RunRequest {
    pub topic: String,
    pub user_id: String,
    /// Optional W3C trace-context token chaining this step into the
    /// engine's trace.
    pub traceparent: Option<String>,
}

/// How one planned action ended.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Executed { result_summary: String },
    Rejected { approver: Option<String>, comment: Option<String> },
    Escalated { reason: String },
    Skipped { reason: String },
    Failed { error: String },
}

/// One gated (or auto-executed) action with its outcome.
#[derive(Clone, Debug, serde::Serialize)]
pub struct ActionRecord {
    pub action: PlannedAction,
    pub outcome: ActionOutcome,
}

/// Successful run result returned to the workflow engine.
#[derive(Clone, Debug, serde::Serialize)]
pub struct RunReport {
    pub doc_id: Uuid,
    pub report_markdown: String,
    pub iterations: u32,
    pub quality_score: f64,
    pub actions: Vec<ActionRecord>,
}

/// Every step ends in one of these two shapes (or a typed error).
#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunOutcome {
    Report(RunReport),
    Gap(ToolGapReport),
}

/// The orchestrator: owns the per-step wiring.
///
/// **Interaction**: Holds the shared model accessor, the per-run tool
/// registry, the memory store, and the approval coordinator. The workflow
/// engine calls [`run`](Orchestrator::run) once per job.
pub struct Orchestrator {
    model: Arc<dyn ModelClient>,
    registry: Arc<ToolRegistry>,
    store: Arc<dyn MemoryStore>,
    approvals: Arc<ApprovalCoordinator>,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn ModelClient>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn MemoryStore>,
        approvals: Arc<ApprovalCoordinator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            model,
            registry,
            store,
            approvals,
            config,
        }
    }

    /// Runs one research step to completion.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome, OrchestratorError> {
        self.run_cancellable(request, CancellationToken::new()).await
    }

    /// Like [`run`](Orchestrator::run), honoring cooperative cancellation at
    /// every suspension point. A cancelled run persists nothing.
    pub async fn run_cancellable(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, OrchestratorError> {
        validate_topic(&request.topic)?;
        validate_user_id(&request.user_id)?;

        let span = telemetry::workflow_step_span(request.traceparent.as_deref());
        let result = self
            .run_inner(&request, &cancel)
            .instrument(span.clone())
            .await;
        telemetry::record_success(&span, result.is_ok());
        result
    }

    async fn run_inner(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, OrchestratorError> {
        let runner = Arc::new(AgentRunner::new(
            self.model.clone(),
            self.registry.clone(),
            self.config.tool_call_timeout,
        ));
        let graph = build_research_graph(ResearchGraphDeps {
            model: self.model.clone(),
            runner,
            store: self.store.clone(),
        })?;

        let state = ResearchState::new(
            request.topic.trim(),
            request.user_id.clone(),
            self.config.max_iterations,
            self.config.quality_threshold,
        );
        let final_state = graph.invoke(state, cancel).await?;

        if let Some(gap) = final_state.gap_report {
            return Ok(RunOutcome::Gap(gap));
        }

        let doc_id = final_state.report_doc_id.ok_or_else(|| {
            OrchestratorError::Agent(crate::error::AgentError::Graph(
                "run ended without a stored report".into(),
            ))
        })?;
        let report_markdown = final_state.report_markdown.unwrap_or_default();

        let actions = self
            .gate_planned_actions(
                &final_state.planned_actions,
                final_state.confidence,
                &request.user_id,
                cancel,
            )
            .await?;

        Ok(RunOutcome::Report(RunReport {
            doc_id,
            report_markdown,
            iterations: final_state.iteration_count,
            quality_score: final_state.quality_score,
            actions,
        }))
    }

    /// Walks planned actions in list order, sequentially. Risk is
    /// re-classified here; an action the classifier marks irreversible is
    /// never dispatched without an explicit approval, no matter how it
    /// reached this list.
    pub(crate) async fn gate_planned_actions(
        &self,
        actions: &[PlannedAction],
        confidence: f64,
        requester_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ActionRecord>, OrchestratorError> {
        let mut records = Vec::with_capacity(actions.len());
        for action in actions {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Agent(crate::error::AgentError::Cancelled));
            }
            let risk = categorize(&action.action_type, &action.parameters);
            let outcome = if !requires_approval(risk, confidence) {
                self.execute_action(action).await
            } else {
                match self
                    .approvals
                    .request_approval(
                        &action.action_type,
                        &action.action_description,
                        requester_id,
                    )
                    .await
                {
                    ApprovalOutcome::Approved(_) => self.execute_action(action).await,
                    ApprovalOutcome::Rejected(metadata) => {
                        TraceEvent::ActionRejected {
                            action_type: action.action_type.clone(),
                            approver: metadata.approver.clone(),
                        }
                        .emit();
                        ActionOutcome::Rejected {
                            approver: metadata.approver,
                            comment: metadata.comment,
                        }
                    }
                    ApprovalOutcome::Escalated { reason, .. } => {
                        ActionOutcome::Escalated { reason }
                    }
                }
            };
            records.push(ActionRecord {
                action: action.clone(),
                outcome,
            });
        }
        Ok(records)
    }

    /// Dispatches one authorized action through the registry.
    async fn execute_action(&self, action: &PlannedAction) -> ActionOutcome {
        match self.registry.has_tool(&action.action_type).await {
            Ok(true) => {}
            Ok(false) => {
                let reason = "no tool of this name is available".to_string();
                TraceEvent::ActionSkipped {
                    action_type: action.action_type.clone(),
                    reason: reason.clone(),
                }
                .emit();
                return ActionOutcome::Skipped { reason };
            }
            Err(err) => {
                return ActionOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }

        let call = self
            .registry
            .call_tool(&action.action_type, action.parameters.clone());
        match tokio::time::timeout(self.config.tool_call_timeout, call).await {
            Ok(Ok(result)) => {
                TraceEvent::ActionExecuted {
                    action_type: action.action_type.clone(),
                }
                .emit();
                ActionOutcome::Executed {
                    result_summary: summarize(&result),
                }
            }
            Ok(Err(err)) => ActionOutcome::Failed {
                error: err.to_string(),
            },
            Err(_elapsed) => ActionOutcome::Failed {
                error: format!(
                    "timed out after {}s",
                    self.config.tool_call_timeout.as_secs()
                ),
            },
        }
    }
}

fn summarize(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() > RESULT_SUMMARY_LEN {
        text.chars().take(RESULT_SUMMARY_LEN).collect()
    } else {
        text
    }
}

pub(crate) fn validate_topic(topic: &str) -> Result<(), ValidationError> {
    let trimmed = topic.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTopic);
    }
    let len = trimmed.chars().count();
    if len > MAX_TOPIC_LEN {
        return Err(ValidationError::TopicTooLong(len));
    }
    Ok(())
}

pub(crate) fn validate_user_id(user_id: &str) -> Result<(), ValidationError> {
    Uuid::parse_str(user_id)
        .map(|_| ())
        .map_err(|_| ValidationError::UserId(user_id.to_string()))
}
