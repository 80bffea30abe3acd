//! Finish node: derive the report, render it, persist it.
//!
//! The stored document's metadata carries only `{type, topic, user_id,
//! iterations, sources (title+url), timestamp}`: no snippets and no other
//! free text, so nothing personally identifying leaks into queryable
//! metadata. A storage failure here fails the run; no partial report
//! persists.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::error::AgentError;
use crate::graph::{Next, Node};
use crate::memory::MemoryStore;
use crate::report::{format_report, QualityIndicators, ResearchReport};
use crate::trace::TraceEvent;

use super::route::NODE_FINISH;
use super::state::{ResearchState, ResearchStatus};

pub struct FinishNode {
    store: Arc<dyn MemoryStore>,
}

impl FinishNode {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }

    fn build_report(state: &ResearchState) -> ResearchReport {
        let findings = state
            .refined_answer
            .clone()
            .unwrap_or_else(|| "No findings were produced.".to_string());
        let executive_summary = findings
            .split("\n\n")
            .next()
            .unwrap_or(&findings)
            .to_string();

        let limited_sources = state.quality_score < state.quality_threshold;
        let mut warnings = Vec::new();
        if limited_sources {
            warnings.push(
                "iteration cap reached before the quality threshold was met".to_string(),
            );
        }
        if state.sources.is_empty() {
            warnings.push("no sources were gathered".to_string());
        }

        ResearchReport {
            topic: state.topic.clone(),
            user_id: state.user_id.clone(),
            executive_summary,
            detailed_findings: findings,
            sources: state.sources.clone(),
            iterations: state.iteration_count,
            generated_at: Utc::now(),
            quality_indicators: QualityIndicators {
                quality_score: state.quality_score,
                warnings,
                limited_sources,
            },
        }
    }
}

#[async_trait]
impl Node<ResearchState> for FinishNode {
    fn id(&self) -> &str {
        NODE_FINISH
    }

    async fn run(&self, mut state: ResearchState) -> Result<(ResearchState, Next), AgentError> {
        let span = tracing::Span::current();
        span.record("iteration_count", state.iteration_count as i64);
        span.record("status", state.status.as_str());

        let report = Self::build_report(&state);
        let markdown = format_report(&report);

        let source_refs: Vec<serde_json::Value> = state
            .sources
            .iter()
            .map(|s| json!({"title": s.title, "url": s.url}))
            .collect();
        let metadata = json!({
            "type": "research_report",
            "topic": state.topic,
            "user_id": state.user_id,
            "iterations": state.iteration_count,
            "sources": source_refs,
            "timestamp": report.generated_at.to_rfc3339(),
        });

        let doc_id = self
            .store
            .store_document(&markdown, metadata, None)
            .await?;

        TraceEvent::ReportStored {
            doc_id,
            iterations: state.iteration_count,
            source_count: state.sources.len(),
        }
        .emit();

        state.report_doc_id = Some(doc_id);
        state.report_markdown = Some(markdown);
        state.status = ResearchStatus::Finished;
        Ok((state, Next::Continue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryMemory;
    use crate::research::SourceReference;

    fn finished_state() -> ResearchState {
        let mut state = ResearchState::new(
            "capital of France",
            "00000000-0000-0000-0000-000000000001",
            5,
            0.8,
        );
        state.refined_answer = Some("Paris is the capital of France.".into());
        state.quality_score = 0.9;
        state.iteration_count = 1;
        state.sources.push(SourceReference::new(
            "Paris",
            "https://example.com/paris",
            "a snippet that must not reach metadata",
        ));
        state
    }

    #[tokio::test]
    async fn finish_persists_report_with_allowed_metadata_keys_only() {
        let store = Arc::new(InMemoryMemory::new(4));
        let node = FinishNode::new(store.clone());

        let (state, _) = node.run(finished_state()).await.unwrap();
        assert_eq!(state.status, ResearchStatus::Finished);
        let doc_id = state.report_doc_id.expect("doc stored");

        let from = Utc::now() - chrono::Duration::minutes(1);
        let docs = store.temporal_query(from, Utc::now(), None).await.unwrap();
        let doc = docs.iter().find(|d| d.id == doc_id).expect("stored doc");

        assert_eq!(doc.metadata["type"], "research_report");
        let allowed = [
            "type",
            "topic",
            "user_id",
            "iterations",
            "sources",
            "timestamp",
            "quality_indicators",
        ];
        for key in doc.metadata.as_object().unwrap().keys() {
            assert!(allowed.contains(&key.as_str()), "unexpected key {key}");
        }
        // Source entries carry title and url only, never snippets.
        let sources = doc.metadata["sources"].as_array().unwrap();
        assert_eq!(
            sources[0].as_object().unwrap().keys().collect::<Vec<_>>(),
            vec!["title", "url"]
        );
        assert!(!doc.metadata.to_string().contains("snippet that must not"));
    }

    #[tokio::test]
    async fn below_threshold_report_carries_limited_sources_warning() {
        let store = Arc::new(InMemoryMemory::new(4));
        let node = FinishNode::new(store);

        let mut state = finished_state();
        state.quality_score = 0.4;
        state.iteration_count = 5;
        let (state, _) = node.run(state).await.unwrap();
        assert!(state
            .report_markdown
            .as_deref()
            .unwrap()
            .contains("capital of France"));

        let report = FinishNode::build_report(&state);
        assert!(report.quality_indicators.limited_sources);
        assert!(!report.quality_indicators.warnings.is_empty());
    }

    #[tokio::test]
    async fn storage_failure_fails_the_run() {
        struct FailingStore;

        #[async_trait]
        impl MemoryStore for FailingStore {
            async fn store_message(
                &self,
                _: uuid::Uuid,
                _: crate::memory::Role,
                _: &str,
                _: Option<serde_json::Value>,
            ) -> Result<uuid::Uuid, crate::memory::StoreError> {
                unreachable!()
            }
            async fn get_conversation_history(
                &self,
                _: uuid::Uuid,
                _: u32,
            ) -> Result<Vec<crate::memory::StoredMessage>, crate::memory::StoreError> {
                unreachable!()
            }
            async fn store_document(
                &self,
                _: &str,
                _: serde_json::Value,
                _: Option<Vec<f32>>,
            ) -> Result<uuid::Uuid, crate::memory::StoreError> {
                Err(crate::memory::StoreError::Storage("connection lost".into()))
            }
            async fn semantic_search(
                &self,
                _: &[f32],
                _: u32,
                _: Option<&crate::memory::MetadataFilter>,
            ) -> Result<Vec<crate::memory::Document>, crate::memory::StoreError> {
                unreachable!()
            }
            async fn temporal_query(
                &self,
                _: chrono::DateTime<Utc>,
                _: chrono::DateTime<Utc>,
                _: Option<&crate::memory::MetadataFilter>,
            ) -> Result<Vec<crate::memory::Document>, crate::memory::StoreError> {
                unreachable!()
            }
            async fn health_check(&self) -> crate::memory::HealthReport {
                unreachable!()
            }
        }

        let node = FinishNode::new(Arc::new(FailingStore));
        let err = node.run(finished_state()).await.expect_err("storage down");
        assert!(matches!(err, AgentError::Store(_)));
    }
}
