//! Tool registry: aggregates sources, caches discovery, routes calls.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use super::{ToolDescriptor, ToolSource, ToolSourceError};

struct CachedTools {
    descriptors: Vec<ToolDescriptor>,
    /// Normalized (lowercased) name → index into `sources`.
    by_name: HashMap<String, usize>,
}

/// Per-run registry over one or more [`ToolSource`]s.
///
/// The discovered list is cached until [`ToolRegistry::notify_tools_changed`]
/// invalidates it (the discovery protocol's tools-changed signal). Name
/// lookup is case-insensitive. When two sources expose the same name, the
/// earlier source wins.
///
/// **Interaction**: One registry per orchestrator step; the agent runner
/// resolves and dispatches every model-requested call through it.
pub struct ToolRegistry {
    sources: Vec<Arc<dyn ToolSource>>,
    cache: RwLock<Option<CachedTools>>,
}

/// Normalizes a tool or capability name for matching: lowercase, separators
/// collapsed to underscores.
pub(crate) fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

impl ToolRegistry {
    pub fn new(sources: Vec<Arc<dyn ToolSource>>) -> Self {
        Self {
            sources,
            cache: RwLock::new(None),
        }
    }

    /// All discovered tools, from cache when warm.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolSourceError> {
        {
            let cache = self.cache.read().await;
            if let Some(ref cached) = *cache {
                return Ok(cached.descriptors.clone());
            }
        }
        let mut cache = self.cache.write().await;
        // Another task may have filled the cache while we waited.
        if let Some(ref cached) = *cache {
            return Ok(cached.descriptors.clone());
        }

        let mut descriptors = Vec::new();
        let mut by_name = HashMap::new();
        for (index, source) in self.sources.iter().enumerate() {
            for descriptor in source.list_tools().await? {
                let key = normalize_name(&descriptor.name);
                if !by_name.contains_key(&key) {
                    by_name.insert(key, index);
                    descriptors.push(descriptor);
                }
            }
        }
        let out = descriptors.clone();
        *cache = Some(CachedTools {
            descriptors,
            by_name,
        });
        Ok(out)
    }

    /// Discovered tool names (original casing).
    pub async fn tool_names(&self) -> Result<Vec<String>, ToolSourceError> {
        Ok(self
            .list_tools()
            .await?
            .into_iter()
            .map(|d| d.name)
            .collect())
    }

    /// Case-insensitive membership check.
    pub async fn has_tool(&self, name: &str) -> Result<bool, ToolSourceError> {
        self.list_tools().await?;
        let cache = self.cache.read().await;
        Ok(cache
            .as_ref()
            .map(|c| c.by_name.contains_key(&normalize_name(name)))
            .unwrap_or(false))
    }

    /// Routes a call to the source that discovered the tool.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolSourceError> {
        self.list_tools().await?;
        let source_index = {
            let cache = self.cache.read().await;
            cache
                .as_ref()
                .and_then(|c| c.by_name.get(&normalize_name(name)).copied())
        };
        let Some(index) = source_index else {
            return Err(ToolSourceError::UnknownTool(name.to_string()));
        };
        self.sources[index].call_tool(name, arguments).await
    }

    /// Drops the cached tool list (discovery protocol's tools-changed signal).
    pub async fn notify_tools_changed(&self) {
        *self.cache.write().await = None;
    }
}
