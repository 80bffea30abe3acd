//! Trace completeness: a finished run produces a `workflow.step` root with
//! graph, node, agent, and memory spans beneath it (in-memory exporter).

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use spindle::approval::ApprovalCoordinator;
use spindle::config::EngineConfig;
use spindle::llm::{MockModel, ModelClient};
use spindle::memory::InMemoryMemory;
use spindle::orchestrator::{Orchestrator, RunOutcome, RunRequest};
use spindle::telemetry::{self, TelemetryConfig, MEMORY_ENDPOINT};
use spindle::tool_source::{StaticToolSource, ToolDescriptor, ToolRegistry, ToolSource};

const USER: &str = "00000000-0000-0000-0000-000000000001";

#[tokio::test]
async fn finished_run_emits_the_span_hierarchy() {
    let guard = telemetry::init(&TelemetryConfig {
        endpoint: Some(MEMORY_ENDPOINT.to_string()),
        service_name: "spindle-test".to_string(),
        sampling_rate: 1.0,
    })
    .unwrap();

    let model = Arc::new(MockModel::new());
    model.push_text("plan");
    model.push_structured(json!({"capabilities": ["web_search"]}));
    model.push_structured(json!({
        "answer": "",
        "reasoning": "searching",
        "confidence": 0.5,
        "tool_requests": [{"tool_name": "web_search", "parameters": {"query": "q"}}]
    }));
    model.push_structured(json!({
        "answer": "Paris is the capital of France.",
        "reasoning": "done",
        "confidence": 0.9,
        "tool_requests": []
    }));
    model.push_structured(json!({"quality_score": 0.95, "critique": "good", "gaps": []}));

    let source = StaticToolSource::new().with_tool(
        ToolDescriptor {
            name: "web_search".into(),
            description: None,
            input_schema: json!({"type": "object"}),
            output_schema: None,
        },
        |_args| Ok(json!([{"title": "Paris", "url": "https://example.com/p", "snippet": "s"}])),
    );
    let sources: Vec<Arc<dyn ToolSource>> = vec![Arc::new(source)];

    let orchestrator = Orchestrator::new(
        model as Arc<dyn ModelClient>,
        Arc::new(ToolRegistry::new(sources)),
        Arc::new(InMemoryMemory::new(8)),
        Arc::new(ApprovalCoordinator::new(Duration::from_secs(1))),
        EngineConfig::default(),
    );

    let outcome = orchestrator
        .run(RunRequest {
            topic: "capital of France".into(),
            user_id: USER.into(),
            traceparent: None,
        })
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Report(_)));

    guard.shutdown();
    let names = guard.finished_span_names();

    assert!(
        names.iter().any(|n| n == "workflow.step"),
        "root step span missing: {:?}",
        names
    );
    assert!(names.iter().any(|n| n == "graph.research_workflow"));
    assert!(names.iter().any(|n| n == "graph.node.plan"));
    assert!(names.iter().any(|n| n == "graph.node.research"));
    assert!(names.iter().any(|n| n == "graph.node.finish"));
    assert!(names.iter().any(|n| n == "agent.run"));
    assert!(names.iter().any(|n| n == "tool.call.web_search"));
    assert!(
        names.iter().any(|n| n.starts_with("memory.")),
        "a finished run must include memory spans: {:?}",
        names
    );
}
