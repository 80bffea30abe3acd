//! Fixed in-process tool source: descriptors plus closures. Used by tests
//! and local development where no MCP server is running.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{ToolDescriptor, ToolSource, ToolSourceError};

type Handler = Arc<dyn Fn(Value) -> Result<Value, ToolSourceError> + Send + Sync>;

/// A [`ToolSource`] with a fixed tool set and synchronous handlers.
#[derive(Default)]
pub struct StaticToolSource {
    tools: Vec<ToolDescriptor>,
    handlers: HashMap<String, Handler>,
}

impl StaticToolSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one tool with its handler. Builder-style.
    pub fn with_tool<F>(mut self, descriptor: ToolDescriptor, handler: F) -> Self
    where
        F: Fn(Value) -> Result<Value, ToolSourceError> + Send + Sync + 'static,
    {
        self.handlers
            .insert(descriptor.name.clone(), Arc::new(handler));
        self.tools.push(descriptor);
        self
    }
}

#[async_trait]
impl ToolSource for StaticToolSource {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolSourceError> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolSourceError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| ToolSourceError::UnknownTool(name.to_string()))?;
        handler(arguments)
    }
}
