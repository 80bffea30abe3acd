//! The agent runner: drives one reasoning turn against the model and tools.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::Instrument;

use crate::error::AgentError;
use crate::llm::ModelClient;
use crate::message::Message;
use crate::risk::{categorize, RiskLevel};
use crate::telemetry;
use crate::tool_source::{GapDetector, MissingTool, ToolGapReport, ToolRegistry};

use super::{
    AgentOutcome, AgentResponse, AgentTurn, PlannedAction, ToolCallRecord, ToolCallStatus,
};

/// Retries per model call on transient errors or schema mismatches.
const MODEL_RETRIES: u32 = 2;

/// Tool-use rounds inside one turn before the last proposal is taken as final.
const MAX_TOOL_ROUNDS: usize = 4;

/// Confidence penalty per failed or timed-out tool call.
const FAILURE_PENALTY: f64 = 0.1;

/// What the model returns each round.
#[derive(serde::Deserialize)]
struct ModelProposal {
    answer: String,
    reasoning: String,
    confidence: f64,
    #[serde(default)]
    tool_requests: Vec<ToolRequest>,
}

#[derive(serde::Deserialize)]
struct ToolRequest {
    tool_name: String,
    #[serde(default)]
    parameters: Value,
}

fn proposal_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "answer": {"type": "string"},
            "reasoning": {"type": "string"},
            "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0},
            "tool_requests": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "tool_name": {"type": "string"},
                        "parameters": {"type": "object"}
                    },
                    "required": ["tool_name"]
                }
            }
        },
        "required": ["answer", "reasoning", "confidence"],
        "additionalProperties": false
    })
}

/// One reasoning turn: gap pre-check, then a bounded propose/observe loop.
///
/// **Interaction**: Built per run by the orchestrator; the research node
/// calls [`run`](AgentRunner::run) once per iteration. All model access goes
/// through the shared [`ModelClient`]; all tool access through the
/// [`ToolRegistry`].
pub struct AgentRunner {
    model: Arc<dyn ModelClient>,
    registry: Arc<ToolRegistry>,
    gap_detector: GapDetector,
    tool_call_timeout: Duration,
}

impl AgentRunner {
    pub fn new(
        model: Arc<dyn ModelClient>,
        registry: Arc<ToolRegistry>,
        tool_call_timeout: Duration,
    ) -> Self {
        let gap_detector = GapDetector::new(model.clone());
        Self {
            model,
            registry,
            gap_detector,
            tool_call_timeout,
        }
    }

    /// Runs one turn for `task`.
    ///
    /// 1. Gap pre-check: a detected gap returns immediately, no reasoning call.
    /// 2. Propose/observe loop: each round the model may request tool calls.
    ///    Reversible requests execute with a per-call timeout; everything
    ///    else is deferred onto planned actions with a stub observation.
    /// 3. A request for a tool absent from discovery at call time turns the
    ///    whole turn into a gap report (honest refusal over fabrication).
    pub async fn run(&self, task: &str) -> Result<AgentTurn, AgentError> {
        let span = telemetry::agent_span(self.model.model_id());
        let result = self.run_inner(task).instrument(span.clone()).await;
        telemetry::record_success(&span, result.is_ok());
        if let Ok(AgentTurn {
            outcome: AgentOutcome::Response(ref response),
            ..
        }) = result
        {
            span.record("confidence", response.confidence);
            span.record("tool_call_count", response.tool_calls.len() as i64);
        }
        result
    }

    async fn run_inner(&self, task: &str) -> Result<AgentTurn, AgentError> {
        if let Some(report) = self
            .gap_detector
            .detect_missing_tools(task, &self.registry)
            .await?
        {
            return Ok(AgentTurn {
                outcome: AgentOutcome::Gap(report),
                planned_actions: Vec::new(),
            });
        }

        let tools = self.registry.list_tools().await?;
        let mut messages = vec![
            Message::system(system_prompt(&tools)),
            Message::user(task.to_string()),
        ];

        let schema = proposal_schema();
        let mut records: Vec<ToolCallRecord> = Vec::new();
        let mut planned: Vec<PlannedAction> = Vec::new();
        let mut last_proposal: Option<ModelProposal> = None;

        for _round in 0..MAX_TOOL_ROUNDS {
            let proposal = self.propose(&messages, &schema).await?;

            if proposal.tool_requests.is_empty() {
                last_proposal = Some(proposal);
                break;
            }

            messages.push(Message::assistant(proposal.reasoning.clone()));
            for request in &proposal.tool_requests {
                if !self.registry.has_tool(&request.tool_name).await? {
                    // A tool the model believes in but discovery does not
                    // list: refuse the whole turn with a gap report.
                    return Ok(AgentTurn {
                        outcome: AgentOutcome::Gap(self.gap_for_unknown_tool(task, request).await?),
                        planned_actions: Vec::new(),
                    });
                }

                let risk = categorize(&request.tool_name, &request.parameters);
                if risk == RiskLevel::Reversible {
                    let record = self.execute_tool(request).await;
                    messages.push(Message::user(observation(&record)));
                    records.push(record);
                } else {
                    planned.push(PlannedAction {
                        action_type: request.tool_name.clone(),
                        action_description: format!(
                            "{} requested during: {}",
                            request.tool_name, task
                        ),
                        parameters: request.parameters.clone(),
                        risk_level: risk,
                    });
                    messages.push(Message::user(format!(
                        "Observation for {}: deferred pending human approval; \
                         continue without its result.",
                        request.tool_name
                    )));
                }
            }
            last_proposal = Some(proposal);
        }

        let proposal = last_proposal
            .ok_or_else(|| AgentError::Model("model produced no proposal".to_string()))?;

        let failures = records
            .iter()
            .filter(|r| r.status != ToolCallStatus::Success)
            .count();
        let confidence =
            (proposal.confidence.clamp(0.0, 1.0) - FAILURE_PENALTY * failures as f64).max(0.0);

        let response = AgentResponse {
            answer: non_empty(proposal.answer, "No answer produced by the model."),
            reasoning: non_empty(proposal.reasoning, "No reasoning provided."),
            tool_calls: records,
            confidence,
        };
        Ok(AgentTurn {
            outcome: AgentOutcome::Response(response),
            planned_actions: planned,
        })
    }

    /// One constrained model call parsed into a proposal. Transient model
    /// errors and schema mismatches (transport or parse) share the same
    /// retry budget; unrecoverable errors propagate immediately.
    async fn propose(
        &self,
        messages: &[Message],
        schema: &serde_json::Value,
    ) -> Result<ModelProposal, AgentError> {
        let mut attempt = 0;
        loop {
            let result = self
                .model
                .invoke_structured(messages, "agent_response", schema)
                .await
                .and_then(|structured| {
                    serde_json::from_value::<ModelProposal>(structured.value)
                        .map_err(|e| AgentError::Schema(e.to_string()))
                });
            match result {
                Ok(proposal) => return Ok(proposal),
                Err(err) if err.is_unrecoverable() => return Err(err),
                Err(err) => {
                    if attempt >= MODEL_RETRIES {
                        return Err(err);
                    }
                    attempt += 1;
                    tracing::debug!(attempt, error = %err, "retrying agent proposal");
                }
            }
        }
    }

    /// Executes one reversible tool call with the per-call timeout.
    ///
    /// Failure and timeout degrade the record (and later the confidence);
    /// they never abort the turn.
    async fn execute_tool(&self, request: &ToolRequest) -> ToolCallRecord {
        let span = telemetry::tool_span(&request.tool_name);
        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.tool_call_timeout,
            self.registry
                .call_tool(&request.tool_name, request.parameters.clone()),
        )
        .instrument(span.clone())
        .await;
        let duration_ms = started.elapsed().as_millis() as u64;
        span.record("duration_ms", duration_ms as i64);

        match outcome {
            Ok(Ok(result)) => {
                telemetry::record_success(&span, true);
                if let Some(items) = result.as_array() {
                    telemetry::record_result_count(&span, items.len());
                }
                ToolCallRecord {
                    tool_name: request.tool_name.clone(),
                    parameters: request.parameters.clone(),
                    result: Some(result),
                    duration_ms,
                    status: ToolCallStatus::Success,
                }
            }
            Ok(Err(err)) => {
                telemetry::record_success(&span, false);
                tracing::warn!(tool = %request.tool_name, error = %err, "tool call failed");
                ToolCallRecord {
                    tool_name: request.tool_name.clone(),
                    parameters: request.parameters.clone(),
                    result: None,
                    duration_ms,
                    status: ToolCallStatus::Failed,
                }
            }
            Err(_elapsed) => {
                telemetry::record_success(&span, false);
                tracing::warn!(tool = %request.tool_name, "tool call timed out");
                ToolCallRecord {
                    tool_name: request.tool_name.clone(),
                    parameters: request.parameters.clone(),
                    result: None,
                    duration_ms,
                    status: ToolCallStatus::Timeout,
                }
            }
        }
    }

    async fn gap_for_unknown_tool(
        &self,
        task: &str,
        request: &ToolRequest,
    ) -> Result<ToolGapReport, AgentError> {
        let existing = self.registry.tool_names().await?;
        Ok(ToolGapReport {
            missing_tools: vec![MissingTool {
                name: request.tool_name.clone(),
                purpose: format!("requested by the model during: {}", task),
                initial_risk: "low".to_string(),
                implementation_hint: format!(
                    "expose a tool named {} through the discovery protocol",
                    request.tool_name
                ),
            }],
            attempted_task: task.to_string(),
            existing_tools_checked: existing,
        })
    }
}

fn system_prompt(tools: &[crate::tool_source::ToolDescriptor]) -> String {
    let mut prompt = String::from(
        "You are a research agent. Use only the tools listed below, by exact name, \
         via tool_requests. If a capability you need is not listed, say so in your \
         answer instead of inventing results; never fabricate tool output. \
         When you have enough information, return your final answer with an empty \
         tool_requests list.\n\nAvailable tools:\n",
    );
    for tool in tools {
        prompt.push_str("- ");
        prompt.push_str(&tool.name);
        if let Some(ref description) = tool.description {
            prompt.push_str(": ");
            prompt.push_str(description);
        }
        prompt.push('\n');
    }
    prompt
}

fn observation(record: &ToolCallRecord) -> String {
    match (&record.status, &record.result) {
        (ToolCallStatus::Success, Some(result)) => {
            format!("Observation for {}: {}", record.tool_name, result)
        }
        (ToolCallStatus::Timeout, _) => format!(
            "Observation for {}: the call timed out; no result.",
            record.tool_name
        ),
        _ => format!(
            "Observation for {}: the call failed; no result.",
            record.tool_name
        ),
    }
}

fn non_empty(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}
