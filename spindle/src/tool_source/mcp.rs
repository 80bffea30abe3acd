//! MCP-backed [`ToolSource`]: discovers and calls tools on an MCP server
//! over a stdio child process or streamable HTTP.
//!
//! Maps `tools/list` to [`ToolDescriptor`]s and `tools/call` to a JSON
//! value (structured content when the server provides it, text otherwise).
//! The server's tools-changed notification is surfaced by the embedding
//! runtime calling [`ToolRegistry::notify_tools_changed`](super::ToolRegistry::notify_tools_changed);
//! this source itself holds no cache.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use rmcp::{
    model::{CallToolRequestParams, ClientCapabilities, Implementation, InitializeRequestParams},
    service::ServerSink,
    transport::{child_process::TokioChildProcess, StreamableHttpClientTransport},
    ServiceExt,
};
use tokio::task::JoinHandle;

use super::{ToolDescriptor, ToolSource, ToolSourceError};

/// Tool source backed by one MCP server.
///
/// Use [`McpToolSource::stdio`] to spawn a local server process or
/// [`McpToolSource::http`] for a remote streamable-HTTP server.
///
/// **Interaction**: Registered into a
/// [`ToolRegistry`](super::ToolRegistry); one fresh connection per
/// orchestrator step (no cross-run session reuse).
pub struct McpToolSource {
    sink: ServerSink,
    /// Background task keeping the client service alive.
    _service_handle: Arc<JoinHandle<()>>,
}

impl McpToolSource {
    fn client_info() -> InitializeRequestParams {
        InitializeRequestParams {
            meta: None,
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "spindle".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
        }
    }

    /// Spawns `command args…` as a local MCP server and initializes over stdio.
    pub async fn stdio(
        command: impl Into<String>,
        args: &[&str],
    ) -> Result<Self, ToolSourceError> {
        let command = command.into();
        let mut cmd = tokio::process::Command::new(&command);
        cmd.args(args);
        let transport = TokioChildProcess::new(cmd).map_err(|e| {
            ToolSourceError::Transport(format!("spawn {} failed: {}", command, e))
        })?;

        let service = Self::client_info()
            .serve(transport)
            .await
            .map_err(|e| ToolSourceError::Transport(format!("initialize failed: {}", e)))?;
        let sink = service.peer().clone();
        let handle = tokio::spawn(async move {
            let _ = service.waiting().await;
        });
        Ok(Self {
            sink,
            _service_handle: Arc::new(handle),
        })
    }

    /// Connects to a streamable-HTTP MCP server at `url`.
    pub async fn http(url: impl Into<String>) -> Result<Self, ToolSourceError> {
        let url = url.into();
        let transport = StreamableHttpClientTransport::from_uri(url.as_str());
        let service = Self::client_info()
            .serve(transport)
            .await
            .map_err(|e| ToolSourceError::Transport(format!("connect {} failed: {}", url, e)))?;
        let sink = service.peer().clone();
        let handle = tokio::spawn(async move {
            let _ = service.waiting().await;
        });
        Ok(Self {
            sink,
            _service_handle: Arc::new(handle),
        })
    }
}

#[async_trait]
impl ToolSource for McpToolSource {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolSourceError> {
        let result = self
            .sink
            .list_tools(Default::default())
            .await
            .map_err(|e| ToolSourceError::Transport(format!("tools/list failed: {}", e)))?;
        Ok(result
            .tools
            .into_iter()
            .map(|tool| ToolDescriptor {
                name: tool.name.to_string(),
                description: tool.description.map(|d| d.to_string()),
                input_schema: Value::Object((*tool.input_schema).clone()),
                output_schema: tool
                    .output_schema
                    .map(|schema| Value::Object((*schema).clone())),
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolSourceError> {
        let params = CallToolRequestParams {
            meta: None,
            name: name.to_string().into(),
            arguments: arguments.as_object().cloned(),
            task: None,
        };
        let result = self
            .sink
            .call_tool(params)
            .await
            .map_err(|e| ToolSourceError::Transport(format!("tools/call failed: {}", e)))?;

        let text_parts: Vec<String> = result
            .content
            .iter()
            .filter_map(|block| block.as_text().map(|t| t.text.clone()))
            .collect();
        let text = text_parts.join("\n");

        if result.is_error.unwrap_or(false) {
            let detail = if text.is_empty() {
                "tool returned error".to_string()
            } else {
                text
            };
            return Err(ToolSourceError::Protocol(detail));
        }

        if let Some(structured) = result.structured_content {
            return Ok(structured);
        }
        if text.is_empty() {
            return Err(ToolSourceError::Protocol(
                "no text or structured content in tools/call response".to_string(),
            ));
        }
        // Servers often return JSON in a text block; keep the raw string when
        // it is not valid JSON.
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}
