//! Full-graph runs against scripted models and static tools.

use std::collections::BTreeMap;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use spindle::memory::MemoryStore;
use spindle::research::{build_research_graph, ResearchState, ResearchStatus};

use crate::common::Fixture;

const USER: &str = "00000000-0000-0000-0000-000000000001";

/// **Scenario**: Successful research with no risky actions. One iteration
/// meets the threshold; the report lands in the store with the right
/// metadata and the answer survives into the markdown.
#[tokio::test]
async fn successful_run_stores_report_and_finishes() {
    let fixture = Fixture::new();
    fixture.model.push_text("1. search the web\n2. synthesize");
    fixture.script_search_iteration("Paris is the capital of France.", 0.9);
    fixture.script_critique(0.92);

    let graph = build_research_graph(fixture.deps()).unwrap();
    let state = ResearchState::new("capital of France", USER, 5, 0.8);
    let final_state = graph
        .invoke(state, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(final_state.status, ResearchStatus::Finished);
    assert_eq!(final_state.iteration_count, 1);
    assert!(final_state.quality_score >= 0.8);
    assert!(!final_state.sources.is_empty(), "search results became sources");

    let markdown = final_state.report_markdown.as_deref().unwrap();
    assert!(markdown.to_lowercase().contains("paris"));
    assert!(markdown.contains("https://example.com/paris"));

    // Exactly one research_report document, findable by metadata filter.
    let doc_id = final_state.report_doc_id.unwrap();
    let mut filters = BTreeMap::new();
    filters.insert("type".to_string(), json!("research_report"));
    let now = chrono::Utc::now();
    let docs = fixture
        .store
        .temporal_query(now - chrono::Duration::minutes(1), now, Some(&filters))
        .await
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, doc_id);
    assert_eq!(docs[0].metadata["user_id"], USER);
}

/// **Scenario**: Iteration cap enforcement. The critic never reaches the
/// threshold, so the graph performs exactly five research turns and still
/// finishes with a stored report.
#[tokio::test]
async fn iteration_cap_stops_at_five_even_when_configured_higher() {
    let fixture = Fixture::new();
    fixture.model.push_text("plan");
    for iteration in 0..5 {
        fixture.script_plain_iteration(&format!("draft {}", iteration + 1), 0.6);
        fixture.script_critique(0.2);
        if iteration < 4 {
            fixture.model.push_text(&format!("refined draft {}", iteration + 1));
        }
    }

    let graph = build_research_graph(fixture.deps()).unwrap();
    // Configured cap of 10 must clamp to 5.
    let state = ResearchState::new("unanswerable topic", USER, 10, 0.8);
    let final_state = graph
        .invoke(state, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(final_state.iteration_count, 5);
    assert_eq!(final_state.max_iterations, 5);
    assert_eq!(final_state.status, ResearchStatus::Finished);
    assert!(final_state.quality_score < final_state.quality_threshold);
    assert!(final_state.report_doc_id.is_some(), "capped run still reports");
}

/// **Scenario**: Capability gap short-circuit. Required capabilities are
/// not a subset of the available tools; the run ends with a gap report and
/// stores nothing.
#[tokio::test]
async fn capability_gap_ends_run_without_report() {
    let fixture = Fixture::new();
    fixture.model.push_text("plan");
    fixture
        .model
        .push_structured(json!({"capabilities": ["financial_data_lookup", "web_search"]}));

    let graph = build_research_graph(fixture.deps()).unwrap();
    let state = ResearchState::new("retrieve my Q3 portfolio performance", USER, 5, 0.8);
    let final_state = graph
        .invoke(state, &CancellationToken::new())
        .await
        .unwrap();

    let gap = final_state.gap_report.expect("gap report");
    assert!(gap
        .missing_tools
        .iter()
        .any(|m| m.name == "financial_data_lookup"));
    assert!(final_state.report_doc_id.is_none());

    let now = chrono::Utc::now();
    let docs = fixture
        .store
        .temporal_query(now - chrono::Duration::minutes(1), now, None)
        .await
        .unwrap();
    assert!(docs.is_empty(), "no document persisted on gap");
}

/// Sources accumulate across iterations in insertion order; the formatter
/// deduplicates by URL with first occurrence winning.
#[tokio::test]
async fn sources_accumulate_across_iterations_and_dedup_in_report() {
    let fixture = Fixture::new();
    fixture.model.push_text("plan");
    // Two searching iterations: same URLs returned twice.
    fixture.script_search_iteration("first draft", 0.6);
    fixture.script_critique(0.3);
    fixture.model.push_text("refined");
    fixture.script_search_iteration("final draft", 0.9);
    fixture.script_critique(0.95);

    let graph = build_research_graph(fixture.deps()).unwrap();
    let state = ResearchState::new("capital of France", USER, 5, 0.8);
    let final_state = graph
        .invoke(state, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(final_state.iteration_count, 2);
    assert_eq!(final_state.sources.len(), 4, "append-only across iterations");
    let markdown = final_state.report_markdown.unwrap();
    assert_eq!(
        markdown.matches("https://example.com/paris").count(),
        1,
        "deduplicated by URL in the report"
    );
}

/// Cancellation before the run starts discards everything.
#[tokio::test]
async fn cancelled_run_persists_nothing() {
    let fixture = Fixture::new();
    let graph = build_research_graph(fixture.deps()).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = graph
        .invoke(ResearchState::new("topic", USER, 5, 0.8), &cancel)
        .await
        .expect_err("cancelled");
    assert!(matches!(err, spindle::AgentError::Cancelled));

    let now = chrono::Utc::now();
    let docs = fixture
        .store
        .temporal_query(now - chrono::Duration::minutes(1), now, None)
        .await
        .unwrap();
    assert!(docs.is_empty());
}
