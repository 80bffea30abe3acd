//! Bound memory tools: `search_memory` and `store_memory` over a
//! [`MemoryStore`] handle.
//!
//! Always registered when the agent carries a memory handle. The embedder is
//! the external collaborator that turns query/content text into vectors; the
//! store itself never embeds.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::memory::{Embedder, MemoryStore};

use super::{ToolDescriptor, ToolSource, ToolSourceError};

pub const SEARCH_MEMORY: &str = "search_memory";
pub const STORE_MEMORY: &str = "store_memory";

const SEARCH_TOP_K: u32 = 5;

/// In-process tool source exposing the memory store to the agent.
pub struct MemoryToolSource {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
}

impl MemoryToolSource {
    pub fn new(store: Arc<dyn MemoryStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ToolSourceError> {
        let vectors = self
            .embedder
            .embed(&[text])
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| ToolSourceError::Transport("embedder returned no vector".into()))
    }

    async fn search_memory(&self, arguments: Value) -> Result<Value, ToolSourceError> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolSourceError::Protocol("search_memory requires query".into()))?;
        let embedding = self.embed_one(query).await?;
        let documents = self
            .store
            .semantic_search(&embedding, SEARCH_TOP_K, None)
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        let results: Vec<Value> = documents
            .into_iter()
            .map(|doc| {
                json!({
                    "id": doc.id,
                    "content": doc.content,
                    "metadata": doc.metadata,
                })
            })
            .collect();
        Ok(Value::Array(results))
    }

    async fn store_memory(&self, arguments: Value) -> Result<Value, ToolSourceError> {
        let content = arguments
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolSourceError::Protocol("store_memory requires content".into()))?;
        let metadata = arguments
            .get("metadata")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        let embedding = self.embed_one(content).await?;
        let id = self
            .store
            .store_document(content, metadata, Some(embedding))
            .await
            .map_err(|e| ToolSourceError::Transport(e.to_string()))?;
        Ok(json!({"id": id}))
    }
}

#[async_trait]
impl ToolSource for MemoryToolSource {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolSourceError> {
        Ok(vec![
            ToolDescriptor {
                name: SEARCH_MEMORY.to_string(),
                description: Some("Semantic search over long-term memory".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "what to look for"}
                    },
                    "required": ["query"]
                }),
                output_schema: None,
            },
            ToolDescriptor {
                name: STORE_MEMORY.to_string(),
                description: Some("Store a fact or note in long-term memory".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "content": {"type": "string"},
                        "metadata": {"type": "object"}
                    },
                    "required": ["content"]
                }),
                output_schema: None,
            },
        ])
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolSourceError> {
        match name {
            SEARCH_MEMORY => self.search_memory(arguments).await,
            STORE_MEMORY => self.store_memory(arguments).await,
            other => Err(ToolSourceError::UnknownTool(other.to_string())),
        }
    }
}
