//! Tool gap detection: can this task be attempted with the tools at hand?
//!
//! Required capabilities are extracted from the task description with a
//! dedicated constrained model call, then diffed (case-insensitively)
//! against the registry's discovered names. A non-empty difference becomes a
//! [`ToolGapReport`], a successful outcome the caller returns in place of
//! an agent response. Gap detection never raises for a detected gap.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::llm::{invoke_structured_with_retry, ModelClient};
use crate::message::Message;
use crate::trace::TraceEvent;

use super::registry::normalize_name;
use super::{ToolRegistry, ToolSourceError};

/// One capability the task needs but no discovered tool provides.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct MissingTool {
    pub name: String,
    pub purpose: String,
    /// Initial risk estimate for a future implementation; always "low" until
    /// a human classifies it.
    pub initial_risk: String,
    pub implementation_hint: String,
}

/// Structured refusal: the required capability set is not a subset of the
/// available tools.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ToolGapReport {
    /// At least one entry.
    pub missing_tools: Vec<MissingTool>,
    pub attempted_task: String,
    pub existing_tools_checked: Vec<String>,
}

const EXTRACTION_RETRIES: u32 = 2;

fn extraction_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "capabilities": {
                "type": "array",
                "items": {"type": "string"}
            }
        },
        "required": ["capabilities"],
        "additionalProperties": false
    })
}

const EXTRACTION_PROMPT: &str = "You extract tool capabilities. Given a task, list the names of \
the external capabilities (tools) strictly required to complete it, as short snake_case names \
such as web_search, read_file, get_current_time, financial_data_lookup. List only capabilities \
that require an external tool; omit reasoning the model can do itself.";

/// Detects missing capabilities for a task against a [`ToolRegistry`].
///
/// **Interaction**: The agent runner calls
/// [`detect_missing_tools`](GapDetector::detect_missing_tools) before every
/// turn; `Some(report)` short-circuits the turn with no model reasoning call.
pub struct GapDetector {
    model: Arc<dyn ModelClient>,
}

impl GapDetector {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    /// `None` means all required capabilities are present: proceed.
    ///
    /// Extraction failure is a degraded no-gap case: the run proceeds and an
    /// audit event records that extraction was unavailable. Registry
    /// (discovery transport) failures do propagate: without a tool list
    /// there is nothing sound to diff against.
    pub async fn detect_missing_tools(
        &self,
        task: &str,
        registry: &ToolRegistry,
    ) -> Result<Option<ToolGapReport>, ToolSourceError> {
        let available = registry.tool_names().await?;

        let messages = [
            Message::system(EXTRACTION_PROMPT),
            Message::user(task.to_string()),
        ];
        let schema = extraction_schema();
        let extraction = invoke_structured_with_retry(
            self.model.as_ref(),
            &messages,
            "required_capabilities",
            &schema,
            EXTRACTION_RETRIES,
        )
        .await;

        let required: Vec<String> = match extraction {
            Ok(response) => response
                .value
                .get("capabilities")
                .and_then(Value::as_array)
                .map(|caps| {
                    caps.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            Err(err) => {
                TraceEvent::CapabilityExtractionFailed {
                    detail: err.to_string(),
                }
                .emit();
                return Ok(None);
            }
        };

        let available_normalized: std::collections::HashSet<String> =
            available.iter().map(|n| normalize_name(n)).collect();

        let missing: Vec<MissingTool> = required
            .iter()
            .filter(|cap| !available_normalized.contains(&normalize_name(cap)))
            .map(|cap| MissingTool {
                name: normalize_name(cap),
                purpose: format!("required capability \"{}\" for: {}", cap, task),
                initial_risk: "low".to_string(),
                implementation_hint: format!(
                    "expose a tool named {} through the discovery protocol",
                    normalize_name(cap)
                ),
            })
            .collect();

        if missing.is_empty() {
            return Ok(None);
        }

        let report = ToolGapReport {
            missing_tools: missing,
            attempted_task: task.to_string(),
            existing_tools_checked: available,
        };
        TraceEvent::ToolGapDetected {
            attempted_task: report.attempted_task.clone(),
            missing: report.missing_tools.iter().map(|m| m.name.clone()).collect(),
        }
        .emit();
        Ok(Some(report))
    }
}
