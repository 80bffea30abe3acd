//! Unified telemetry surface: span builders for every component and the
//! export pipeline.
//!
//! Every span carries the standard attribute set (`component`,
//! `operation.type`, `operation.success`) plus per-kind extras; the span
//! hierarchy is workflow.step → graph.research_workflow → graph.node.* →
//! agent.run → tool.call.* / memory.*. Components build spans only through
//! this module; a second telemetry surface is a design smell.
//!
//! Export: [`init`] installs a `tracing` subscriber. With an OTLP endpoint
//! configured, spans bridge through `tracing-opentelemetry` into an OTLP
//! (gRPC) batch exporter. The literal endpoint [`MEMORY_ENDPOINT`] installs
//! an in-memory exporter instead, exposed on the returned [`Telemetry`]
//! guard for test assertions. Without an endpoint only the fmt layer runs.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{InMemorySpanExporter, Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tracing::field::Empty;
use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Endpoint value selecting the in-memory exporter (tests).
pub const MEMORY_ENDPOINT: &str = "memory";

const TRACER_NAME: &str = "spindle";

/// Export configuration, taken from
/// [`EngineConfig`](crate::config::EngineConfig).
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// OTLP endpoint, [`MEMORY_ENDPOINT`], or `None` for fmt-only.
    pub endpoint: Option<String>,
    pub service_name: String,
    /// 1.0 = sample everything (this phase's default).
    pub sampling_rate: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            service_name: TRACER_NAME.to_string(),
            sampling_rate: 1.0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("telemetry init failed: {0}")]
    Init(String),
}

/// Guard over the installed pipeline. Call [`Telemetry::shutdown`] to flush
/// on the way out; in `memory` mode the exporter is exposed for assertions.
pub struct Telemetry {
    provider: Option<SdkTracerProvider>,
    memory_exporter: Option<InMemorySpanExporter>,
}

impl Telemetry {
    /// The in-memory exporter, when the endpoint was [`MEMORY_ENDPOINT`].
    pub fn memory_exporter(&self) -> Option<&InMemorySpanExporter> {
        self.memory_exporter.as_ref()
    }

    /// Names of finished spans captured by the in-memory exporter.
    pub fn finished_span_names(&self) -> Vec<String> {
        self.memory_exporter
            .as_ref()
            .and_then(|exporter| exporter.get_finished_spans().ok())
            .map(|spans| spans.into_iter().map(|s| s.name.to_string()).collect())
            .unwrap_or_default()
    }

    pub fn shutdown(&self) {
        if let Some(ref provider) = self.provider {
            let _ = provider.shutdown();
        }
    }
}

/// Installs the tracing pipeline once per process.
///
/// A subscriber that is already installed (tests initialize repeatedly) is
/// left in place; the returned guard still owns the provider built here.
pub fn init(config: &TelemetryConfig) -> Result<Telemetry, TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .build();
    let sampler = if (config.sampling_rate - 1.0).abs() < f64::EPSILON {
        Sampler::AlwaysOn
    } else {
        Sampler::TraceIdRatioBased(config.sampling_rate)
    };

    match config.endpoint.as_deref() {
        None => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .try_init();
            Ok(Telemetry {
                provider: None,
                memory_exporter: None,
            })
        }
        Some(MEMORY_ENDPOINT) => {
            let exporter = InMemorySpanExporter::default();
            let provider = SdkTracerProvider::builder()
                .with_simple_exporter(exporter.clone())
                .with_sampler(sampler)
                .with_resource(resource)
                .build();
            let tracer = provider.tracer(TRACER_NAME);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init();
            Ok(Telemetry {
                provider: Some(provider),
                memory_exporter: Some(exporter),
            })
        }
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()
                .map_err(|e| TelemetryError::Init(e.to_string()))?;
            let provider = SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_sampler(sampler)
                .with_resource(resource)
                .build();
            let tracer = provider.tracer(TRACER_NAME);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init();
            Ok(Telemetry {
                provider: Some(provider),
                memory_exporter: None,
            })
        }
    }
}

/// Root span of one orchestrator step. `traceparent` is the optional W3C
/// context token handed in by the workflow engine; it is recorded so the
/// collector can chain the trace.
pub fn workflow_step_span(traceparent: Option<&str>) -> Span {
    tracing::info_span!(
        "workflow.step",
        component = "workflow",
        operation.type = "step",
        traceparent = traceparent.unwrap_or(""),
        operation.success = Empty,
    )
}

/// One graph run.
pub fn graph_span() -> Span {
    tracing::info_span!(
        "graph.research_workflow",
        component = "graph",
        operation.type = "graph_run",
        operation.success = Empty,
    )
}

/// One node execution. Nodes record `iteration_count` / `status` on the
/// current span themselves.
pub fn node_span(node_id: &str) -> Span {
    tracing::info_span!(
        "graph.node",
        otel.name = %format!("graph.node.{}", node_id),
        component = "graph",
        operation.type = "node",
        node_id = node_id,
        iteration_count = Empty,
        status = Empty,
        operation.success = Empty,
    )
}

/// One routing decision out of a conditional edge.
pub fn edge_span(from: &str, next_node: &str) -> Span {
    tracing::info_span!(
        "graph.edge.route",
        component = "graph",
        operation.type = "edge",
        from = from,
        next_node = next_node,
        operation.success = true,
    )
}

/// One agent turn.
pub fn agent_span(model_id: &str) -> Span {
    tracing::info_span!(
        "agent.run",
        component = "agent",
        operation.type = "agent_turn",
        model = model_id,
        confidence = Empty,
        tool_call_count = Empty,
        operation.success = Empty,
    )
}

/// One tool invocation.
pub fn tool_span(tool_name: &str) -> Span {
    tracing::info_span!(
        "tool.call",
        otel.name = %format!("tool.call.{}", tool_name),
        component = "tool",
        operation.type = "tool_call",
        tool_name = tool_name,
        duration_ms = Empty,
        result_count = Empty,
        operation.success = Empty,
    )
}

/// One memory operation.
pub fn memory_span(operation: &str, backend: &str) -> Span {
    tracing::info_span!(
        "memory.op",
        otel.name = %format!("memory.{}", operation),
        component = "memory",
        operation.type = operation,
        backend = backend,
        result_count = Empty,
        operation.success = Empty,
    )
}

pub fn record_success(span: &Span, success: bool) {
    span.record("operation.success", success);
}

pub fn record_result_count(span: &Span, count: usize) {
    span.record("result_count", count as i64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_endpoint_installs_in_memory_exporter() {
        let telemetry = init(&TelemetryConfig {
            endpoint: Some(MEMORY_ENDPOINT.to_string()),
            service_name: "spindle-test".to_string(),
            sampling_rate: 1.0,
        })
        .unwrap();
        assert!(telemetry.memory_exporter().is_some());
        telemetry.shutdown();
    }

    #[test]
    fn no_endpoint_builds_no_provider() {
        let telemetry = init(&TelemetryConfig::default()).unwrap();
        assert!(telemetry.memory_exporter().is_none());
        telemetry.shutdown();
    }

    #[test]
    fn span_builders_do_not_panic_without_subscriber() {
        let span = node_span("plan");
        record_success(&span, true);
        let span = memory_span("store_document", "in-memory");
        record_result_count(&span, 3);
        let _ = agent_span("mock");
        let _ = tool_span("web_search");
        let _ = edge_span("critique", "finish");
        let _ = workflow_step_span(Some("00-abc-def-01"));
        let _ = graph_span();
    }
}
