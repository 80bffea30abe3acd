//! Shared fixtures: scripted model, static search tool, in-memory store.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use spindle::agent::AgentRunner;
use spindle::llm::{MockModel, ModelClient};
use spindle::memory::InMemoryMemory;
use spindle::research::ResearchGraphDeps;
use spindle::tool_source::{StaticToolSource, ToolDescriptor, ToolRegistry, ToolSource};

pub fn web_search_source() -> Arc<dyn ToolSource> {
    Arc::new(StaticToolSource::new().with_tool(
        ToolDescriptor {
            name: "web_search".into(),
            description: Some("search the web".into()),
            input_schema: json!({"type": "object", "properties": {"query": {"type": "string"}}}),
            output_schema: None,
        },
        |_args| {
            Ok(json!([
                {
                    "title": "Paris - Encyclopedia",
                    "url": "https://example.com/paris",
                    "snippet": "Paris is the capital and largest city of France."
                },
                {
                    "title": "France overview",
                    "url": "https://example.com/france",
                    "snippet": "France is a country in Western Europe."
                }
            ]))
        },
    ))
}

pub struct Fixture {
    pub model: Arc<MockModel>,
    pub registry: Arc<ToolRegistry>,
    pub store: Arc<InMemoryMemory>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_sources(vec![web_search_source()])
    }

    pub fn with_sources(sources: Vec<Arc<dyn ToolSource>>) -> Self {
        Self {
            model: Arc::new(MockModel::new()),
            registry: Arc::new(ToolRegistry::new(sources)),
            store: Arc::new(InMemoryMemory::new(8)),
        }
    }

    pub fn deps(&self) -> ResearchGraphDeps {
        let model: Arc<dyn ModelClient> = self.model.clone();
        let runner = Arc::new(AgentRunner::new(
            model.clone(),
            self.registry.clone(),
            Duration::from_secs(5),
        ));
        ResearchGraphDeps {
            model,
            runner,
            store: self.store.clone(),
        }
    }

    /// Scripts one research iteration that searches once and synthesizes.
    pub fn script_search_iteration(&self, answer: &str, confidence: f64) {
        // Gap extraction, then two proposals: search, then final.
        self.model
            .push_structured(json!({"capabilities": ["web_search"]}));
        self.model.push_structured(json!({
            "answer": "",
            "reasoning": "gathering sources",
            "confidence": 0.5,
            "tool_requests": [{"tool_name": "web_search", "parameters": {"query": "topic"}}]
        }));
        self.model.push_structured(json!({
            "answer": answer,
            "reasoning": "synthesized from search results",
            "confidence": confidence,
            "tool_requests": []
        }));
    }

    /// Scripts one research iteration with no tool use.
    pub fn script_plain_iteration(&self, answer: &str, confidence: f64) {
        self.model
            .push_structured(json!({"capabilities": ["web_search"]}));
        self.model.push_structured(json!({
            "answer": answer,
            "reasoning": "direct synthesis",
            "confidence": confidence,
            "tool_requests": []
        }));
    }

    pub fn script_critique(&self, score: f64) {
        self.model.push_structured(json!({
            "quality_score": score,
            "critique": "assessment",
            "gaps": []
        }));
    }
}
