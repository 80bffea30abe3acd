//! Store contract: entities, errors, and the [`MemoryStore`] trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ValidationError;

/// Default embedding dimension; must match the vector index schema.
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// `user_id` recorded on sessions created implicitly by `store_message`.
pub const AUTO_CREATED_USER: &str = "auto-created";

/// Message role. Constrained to exactly these three values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Parses a role string; anything but the three known values is rejected.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }
}

/// A conversation session. Created implicitly on first message.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Value,
}

/// A stored conversation message.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub metadata: Value,
}

/// A stored document with optional fixed-dimension embedding.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Exact-match filters over document metadata keys.
pub type MetadataFilter = BTreeMap<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Result of [`MemoryStore::health_check`]. Never an error: transient
/// backend failures are reported as `Unhealthy` with detail.
#[derive(Clone, Debug, serde::Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub backend: String,
    pub detail: Option<String>,
    pub versions: BTreeMap<String, String>,
}

/// Error from store operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Rejected before any I/O (bad role, empty content, dimension mismatch…).
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    /// Backend failure (connection loss, corrupt row). Never retried here.
    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Authoritative storage for sessions, messages, and documents.
///
/// All methods are non-blocking; implementations move blocking work onto the
/// blocking pool. Every operation emits one span with `component = "memory"`.
///
/// **Interaction**: The finish node persists reports here; the memory tool
/// source exposes `search_memory` / `store_memory` over it; the orchestrator
/// owns the handle.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Stores one message, creating the session (with
    /// [`AUTO_CREATED_USER`]) when it does not exist yet.
    ///
    /// Rejects whitespace-only content before any I/O.
    async fn store_message(
        &self,
        session_id: Uuid,
        role: Role,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<Uuid, StoreError>;

    /// Conversation history in chronological (ascending) order.
    ///
    /// Unknown sessions yield an empty list, not an error. `limit` must be
    /// positive.
    async fn get_conversation_history(
        &self,
        session_id: Uuid,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, StoreError>;

    /// Stores a document. When `embedding` is given its length must equal the
    /// configured dimension exactly; otherwise the embedding column is null
    /// and the document is invisible to semantic search.
    async fn store_document(
        &self,
        content: &str,
        metadata: Value,
        embedding: Option<Vec<f32>>,
    ) -> Result<Uuid, StoreError>;

    /// Top-k by cosine similarity descending; ties by `updated_at` descending,
    /// then `id` ascending. `top_k` must be in [1, 1000]. No matches is `[]`.
    async fn semantic_search(
        &self,
        query_embedding: &[f32],
        top_k: u32,
        filters: Option<&MetadataFilter>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Documents with `start ≤ created_at ≤ end`, ascending. `start ≤ end`
    /// required.
    async fn temporal_query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filters: Option<&MetadataFilter>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Backend liveness probe. Reports instead of throwing.
    async fn health_check(&self) -> HealthReport;
}

/// Cosine similarity; 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Shared write-side validations, applied before any I/O.
pub(crate) fn validate_content(content: &str) -> Result<(), StoreError> {
    if content.trim().is_empty() {
        return Err(ValidationError::EmptyContent.into());
    }
    Ok(())
}

pub(crate) fn validate_embedding(dimension: usize, embedding: &[f32]) -> Result<(), StoreError> {
    if embedding.len() != dimension {
        return Err(ValidationError::Dimension {
            expected: dimension,
            actual: embedding.len(),
        }
        .into());
    }
    Ok(())
}

pub(crate) fn validate_top_k(top_k: u32) -> Result<(), StoreError> {
    if top_k == 0 || top_k > 1000 {
        return Err(ValidationError::TopK(top_k).into());
    }
    Ok(())
}

pub(crate) fn validate_limit(limit: u32) -> Result<(), StoreError> {
    if limit == 0 {
        return Err(ValidationError::Limit.into());
    }
    Ok(())
}

pub(crate) fn validate_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), StoreError> {
    if start > end {
        return Err(ValidationError::DateRange.into());
    }
    Ok(())
}

/// Exact-match metadata filtering shared by both backends.
pub(crate) fn metadata_matches(metadata: &Value, filters: Option<&MetadataFilter>) -> bool {
    let Some(filters) = filters else {
        return true;
    };
    filters
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}
