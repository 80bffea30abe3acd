//! Tool discovery and invocation.
//!
//! Tools are never compiled into the engine: they are discovered at runtime
//! through a [`ToolSource`] (MCP servers, in-process memory tools) and
//! addressed by name. The [`ToolRegistry`] aggregates sources and caches the
//! discovered list until a tools-changed notification; the [`GapDetector`]
//! decides whether a task can honestly be attempted with the tools at hand.
//!
//! A [`ToolGapReport`] is a first-class successful outcome, not an error:
//! refusing with a structured gap beats fabricating tool output.

mod gap;
mod mcp;
mod memory_tools;
mod registry;
mod static_source;

pub use gap::{GapDetector, MissingTool, ToolGapReport};
pub use mcp::McpToolSource;
pub use memory_tools::MemoryToolSource;
pub use registry::ToolRegistry;
pub use static_source::StaticToolSource;

use async_trait::async_trait;
use serde_json::Value;

/// One discovered tool: unique name plus schemas.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
    pub output_schema: Option<Value>,
}

/// Error from tool discovery or invocation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ToolSourceError {
    /// Transport failure (process, socket, serialization).
    #[error("tool transport error: {0}")]
    Transport(String),

    /// The server answered with a protocol-level error.
    #[error("tool protocol error: {0}")]
    Protocol(String),

    /// No registered source exposes a tool of this name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// A source of tools: list what is available, call one by name.
///
/// **Interaction**: Implemented by [`McpToolSource`] (runtime discovery),
/// [`MemoryToolSource`] (bound memory tools), and [`StaticToolSource`]
/// (tests). Aggregated behind [`ToolRegistry`].
#[async_trait]
pub trait ToolSource: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolSourceError>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolSourceError>;
}
