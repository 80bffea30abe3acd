//! Research node: one agent turn gathering sources toward the plan.
//!
//! The only node that increments `iteration_count`. A gap outcome from the
//! agent ends the run immediately (the orchestrator surfaces the report);
//! otherwise sources extracted from successful search calls are appended and
//! the synthesis becomes the current answer.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::{AgentOutcome, AgentRunner, ToolCallRecord, ToolCallStatus};
use crate::error::AgentError;
use crate::graph::{Next, Node};

use super::route::NODE_RESEARCH;
use super::state::{truncate_chars, ResearchState, ResearchStatus, SourceReference};

/// Sources taken from one tool invocation, at most.
const MAX_SOURCES_PER_CALL: usize = 5;

/// Snippet cap at extraction time (tighter than the storage cap).
const EXTRACT_SNIPPET_LEN: usize = 500;

pub struct ResearchNode {
    runner: Arc<AgentRunner>,
}

impl ResearchNode {
    pub fn new(runner: Arc<AgentRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Node<ResearchState> for ResearchNode {
    fn id(&self) -> &str {
        NODE_RESEARCH
    }

    async fn run(&self, mut state: ResearchState) -> Result<(ResearchState, Next), AgentError> {
        let span = tracing::Span::current();
        span.record("iteration_count", state.iteration_count as i64);
        span.record("status", state.status.as_str());

        let task = format!(
            "Research the topic \"{}\".\nPlan:\n{}\nThis is research iteration {} of {}. \
             Use web search to gather sources, then synthesize what you found so far.",
            state.topic,
            state.plan.as_deref().unwrap_or("(no plan)"),
            state.iteration_count + 1,
            state.max_iterations,
        );

        let turn = self.runner.run(&task).await?;
        match turn.outcome {
            AgentOutcome::Gap(report) => {
                state.gap_report = Some(report);
                Ok((state, Next::End))
            }
            AgentOutcome::Response(response) => {
                state.sources.extend(extract_sources(&response.tool_calls));
                state.refined_answer = Some(response.answer);
                state.confidence = response.confidence;
                state.planned_actions.extend(turn.planned_actions);
                state.iteration_count += 1;
                state.status = ResearchStatus::Critiquing;
                Ok((state, Next::Continue))
            }
        }
    }
}

/// Pulls [`SourceReference`]s out of successful search-tool results.
///
/// Accepts either a bare array or a `{"results": [...]}` wrapper; items need
/// a `title` and an absolute `url`, snippet optional (truncated to 500).
fn extract_sources(records: &[ToolCallRecord]) -> Vec<SourceReference> {
    let mut sources = Vec::new();
    for record in records {
        if record.status != ToolCallStatus::Success {
            continue;
        }
        if !record.tool_name.to_lowercase().contains("search") {
            continue;
        }
        let Some(ref result) = record.result else {
            continue;
        };
        let items = result
            .as_array()
            .or_else(|| result.get("results").and_then(|r| r.as_array()));
        let Some(items) = items else {
            continue;
        };
        for item in items.iter().take(MAX_SOURCES_PER_CALL) {
            let Some(title) = item.get("title").and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(url) = item.get("url").and_then(|v| v.as_str()) else {
                continue;
            };
            if title.trim().is_empty() || url::Url::parse(url).is_err() {
                continue;
            }
            let snippet = item
                .get("snippet")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            sources.push(SourceReference::new(
                title,
                url,
                truncate_chars(snippet, EXTRACT_SNIPPET_LEN),
            ));
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn success_record(tool: &str, result: serde_json::Value) -> ToolCallRecord {
        ToolCallRecord {
            tool_name: tool.to_string(),
            parameters: json!({}),
            result: Some(result),
            duration_ms: 3,
            status: ToolCallStatus::Success,
        }
    }

    #[test]
    fn extracts_from_bare_array_and_results_wrapper() {
        let records = vec![
            success_record(
                "web_search",
                json!([{"title": "A", "url": "https://a.example", "snippet": "sa"}]),
            ),
            success_record(
                "web_search",
                json!({"results": [{"title": "B", "url": "https://b.example"}]}),
            ),
        ];
        let sources = extract_sources(&records);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title, "A");
        assert_eq!(sources[1].snippet, "");
    }

    #[test]
    fn limits_to_five_sources_per_invocation() {
        let items: Vec<_> = (0..9)
            .map(|i| json!({"title": format!("t{i}"), "url": format!("https://example.com/{i}")}))
            .collect();
        let records = vec![success_record("web_search", json!(items))];
        assert_eq!(extract_sources(&records).len(), 5);
    }

    #[test]
    fn skips_failed_calls_non_search_tools_and_bad_urls() {
        let records = vec![
            ToolCallRecord {
                tool_name: "web_search".into(),
                parameters: json!({}),
                result: None,
                duration_ms: 1,
                status: ToolCallStatus::Failed,
            },
            success_record("read_file", json!([{"title": "x", "url": "https://x.example"}])),
            success_record("web_search", json!([{"title": "bad", "url": "not a url"}])),
        ];
        assert!(extract_sources(&records).is_empty());
    }

    #[test]
    fn extraction_truncates_snippets_to_500() {
        let records = vec![success_record(
            "web_search",
            json!([{"title": "t", "url": "https://example.com", "snippet": "y".repeat(900)}]),
        )];
        let sources = extract_sources(&records);
        assert_eq!(sources[0].snippet.chars().count(), 500);
    }
}
