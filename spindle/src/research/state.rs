//! Research state: the graph's working memory for one run.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::agent::PlannedAction;
use crate::tool_source::ToolGapReport;

/// Hard cap on research iterations; configured values above this clamp down.
pub const MAX_RESEARCH_ITERATIONS: u32 = 5;

/// Default quality threshold for finishing early.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.8;

const MAX_SNIPPET_LEN: usize = 1000;

/// Where the run currently is in the cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchStatus {
    Planning,
    Researching,
    Critiquing,
    Refining,
    Finished,
}

impl ResearchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchStatus::Planning => "planning",
            ResearchStatus::Researching => "researching",
            ResearchStatus::Critiquing => "critiquing",
            ResearchStatus::Refining => "refining",
            ResearchStatus::Finished => "finished",
        }
    }
}

/// One gathered source. Snippets are truncated silently at 1000 chars.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SourceReference {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub retrieved_at: DateTime<Utc>,
}

impl SourceReference {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        let snippet: String = snippet.into();
        Self {
            title: title.into(),
            url: url.into(),
            snippet: truncate_chars(&snippet, MAX_SNIPPET_LEN),
            retrieved_at: Utc::now(),
        }
    }
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Working memory of one research run. Owned by the graph engine; nodes
/// mutate it between transitions; nothing else holds a reference across
/// node boundaries.
#[derive(Clone, Debug)]
pub struct ResearchState {
    /// 1–500 chars, validated at the step entry.
    pub topic: String,
    /// UUID string, validated at the step entry.
    pub user_id: String,
    pub plan: Option<String>,
    /// Append-only across iterations; deduplication happens at formatting.
    pub sources: Vec<SourceReference>,
    pub critique: Option<String>,
    pub refined_answer: Option<String>,
    /// Incremented by the research node only; monotone; ≤ `max_iterations`.
    pub iteration_count: u32,
    /// Clamped to [`MAX_RESEARCH_ITERATIONS`] at construction.
    pub max_iterations: u32,
    pub status: ResearchStatus,
    pub quality_score: f64,
    pub quality_threshold: f64,
    /// Confidence reported by the latest agent turn; gates planned actions.
    pub confidence: f64,
    pub planned_actions: Vec<PlannedAction>,
    /// Set when a turn refused with a gap; ends the run without a report.
    pub gap_report: Option<ToolGapReport>,
    /// Written by the finish node.
    pub report_doc_id: Option<Uuid>,
    pub report_markdown: Option<String>,
}

impl ResearchState {
    pub fn new(
        topic: impl Into<String>,
        user_id: impl Into<String>,
        max_iterations: u32,
        quality_threshold: f64,
    ) -> Self {
        Self {
            topic: topic.into(),
            user_id: user_id.into(),
            plan: None,
            sources: Vec::new(),
            critique: None,
            refined_answer: None,
            iteration_count: 0,
            max_iterations: max_iterations.clamp(1, MAX_RESEARCH_ITERATIONS),
            status: ResearchStatus::Planning,
            quality_score: 0.0,
            quality_threshold: quality_threshold.clamp(0.0, 1.0),
            confidence: 0.0,
            planned_actions: Vec::new(),
            gap_report: None,
            report_doc_id: None,
            report_markdown: None,
        }
    }
}
