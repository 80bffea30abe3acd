//! In-memory [`MemoryStore`] for tests and dev. Exact cosine scan, no
//! persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::telemetry;

use super::store::{
    cosine_similarity, metadata_matches, validate_content, validate_embedding, validate_limit,
    validate_range, validate_top_k, Document, HealthReport, HealthStatus, MemoryStore,
    MetadataFilter, Role, SessionRecord, StoreError, StoredMessage, AUTO_CREATED_USER,
};

const BACKEND: &str = "in-memory";

/// Pure in-memory store. All data is lost when the store is dropped.
///
/// **Interaction**: Drop-in `Arc<dyn MemoryStore>` twin of
/// [`SqliteVecMemory`](super::SqliteVecMemory) with identical validation and
/// ordering semantics; the integration tests run the whole engine against it.
pub struct InMemoryMemory {
    sessions: DashMap<Uuid, SessionRecord>,
    messages: DashMap<Uuid, Vec<StoredMessage>>,
    documents: DashMap<Uuid, Document>,
    dimension: usize,
}

impl InMemoryMemory {
    pub fn new(dimension: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            messages: DashMap::new(),
            documents: DashMap::new(),
            dimension,
        }
    }

    fn ensure_session(&self, session_id: Uuid, now: DateTime<Utc>) {
        match self.sessions.entry(session_id) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                entry.get_mut().updated_at = now;
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(SessionRecord {
                    id: session_id,
                    user_id: AUTO_CREATED_USER.to_string(),
                    created_at: now,
                    updated_at: now,
                    metadata: Value::Object(Default::default()),
                });
            }
        }
    }

    fn sorted_documents<F>(&self, mut keep: F) -> Vec<Document>
    where
        F: FnMut(&Document) -> bool,
    {
        let mut docs: Vec<Document> = self
            .documents
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        docs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        docs
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemory {
    async fn store_message(
        &self,
        session_id: Uuid,
        role: Role,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<Uuid, StoreError> {
        let span = telemetry::memory_span("store_message", BACKEND);
        let result = async {
            validate_content(content)?;
            let now = Utc::now();
            self.ensure_session(session_id, now);
            let message = StoredMessage {
                id: Uuid::new_v4(),
                session_id,
                role,
                content: content.to_string(),
                created_at: now,
                metadata: metadata.unwrap_or_else(|| Value::Object(Default::default())),
            };
            let id = message.id;
            self.messages.entry(session_id).or_default().push(message);
            Ok(id)
        }
        .instrument(span.clone())
        .await;
        telemetry::record_success(&span, result.is_ok());
        result
    }

    async fn get_conversation_history(
        &self,
        session_id: Uuid,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let span = telemetry::memory_span("get_conversation_history", BACKEND);
        let result = async {
            validate_limit(limit)?;
            let messages = self
                .messages
                .get(&session_id)
                .map(|entry| {
                    entry
                        .value()
                        .iter()
                        .take(limit as usize)
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            Ok(messages)
        }
        .instrument(span.clone())
        .await;
        telemetry::record_success(&span, result.is_ok());
        if let Ok(ref messages) = result {
            telemetry::record_result_count(&span, messages.len());
        }
        result
    }

    async fn store_document(
        &self,
        content: &str,
        metadata: Value,
        embedding: Option<Vec<f32>>,
    ) -> Result<Uuid, StoreError> {
        let span = telemetry::memory_span("store_document", BACKEND);
        let result = async {
            validate_content(content)?;
            if let Some(ref vector) = embedding {
                validate_embedding(self.dimension, vector)?;
            }
            let now = Utc::now();
            let doc = Document {
                id: Uuid::new_v4(),
                content: content.to_string(),
                embedding,
                metadata,
                created_at: now,
                updated_at: now,
            };
            let id = doc.id;
            self.documents.insert(id, doc);
            Ok(id)
        }
        .instrument(span.clone())
        .await;
        telemetry::record_success(&span, result.is_ok());
        result
    }

    async fn semantic_search(
        &self,
        query_embedding: &[f32],
        top_k: u32,
        filters: Option<&MetadataFilter>,
    ) -> Result<Vec<Document>, StoreError> {
        let span = telemetry::memory_span("semantic_search", BACKEND);
        let result = async {
            validate_top_k(top_k)?;
            validate_embedding(self.dimension, query_embedding)?;

            let mut candidates: Vec<(f32, Document)> = self
                .documents
                .iter()
                .filter_map(|entry| {
                    let doc = entry.value();
                    let embedding = doc.embedding.as_deref()?;
                    if !metadata_matches(&doc.metadata, filters) {
                        return None;
                    }
                    Some((cosine_similarity(query_embedding, embedding), doc.clone()))
                })
                .collect();

            candidates.sort_by(|(sim_a, a), (sim_b, b)| {
                sim_b
                    .partial_cmp(sim_a)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.updated_at.cmp(&a.updated_at))
                    .then(a.id.cmp(&b.id))
            });
            candidates.truncate(top_k as usize);
            Ok(candidates.into_iter().map(|(_, doc)| doc).collect::<Vec<_>>())
        }
        .instrument(span.clone())
        .await;
        telemetry::record_success(&span, result.is_ok());
        if let Ok(ref docs) = result {
            telemetry::record_result_count(&span, docs.len());
        }
        result
    }

    async fn temporal_query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filters: Option<&MetadataFilter>,
    ) -> Result<Vec<Document>, StoreError> {
        let span = telemetry::memory_span("temporal_query", BACKEND);
        let result = async {
            validate_range(start, end)?;
            Ok(self.sorted_documents(|doc| {
                doc.created_at >= start
                    && doc.created_at <= end
                    && metadata_matches(&doc.metadata, filters)
            }))
        }
        .instrument(span.clone())
        .await;
        telemetry::record_success(&span, result.is_ok());
        if let Ok(ref docs) = result {
            telemetry::record_result_count(&span, docs.len());
        }
        result
    }

    async fn health_check(&self) -> HealthReport {
        HealthReport {
            status: HealthStatus::Healthy,
            backend: BACKEND.to_string(),
            detail: None,
            versions: std::collections::BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn unit_vector(dimension: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        v[hot % dimension] = 1.0;
        v
    }

    #[tokio::test]
    async fn stored_message_is_last_in_history() {
        let store = InMemoryMemory::new(4);
        let session = Uuid::new_v4();
        store
            .store_message(session, Role::User, "first", None)
            .await
            .unwrap();
        store
            .store_message(session, Role::Assistant, "second", None)
            .await
            .unwrap();
        let history = store.get_conversation_history(session, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().content, "second");
    }

    #[tokio::test]
    async fn auto_created_session_uses_sentinel_user() {
        let store = InMemoryMemory::new(4);
        let session = Uuid::new_v4();
        store
            .store_message(session, Role::User, "hi", None)
            .await
            .unwrap();
        let record = store.sessions.get(&session).unwrap();
        assert_eq!(record.user_id, AUTO_CREATED_USER);
        assert!(record.created_at <= record.updated_at);
    }

    #[tokio::test]
    async fn semantic_search_filters_and_ranks() {
        let store = InMemoryMemory::new(4);
        let query = unit_vector(4, 0);
        let a = store
            .store_document("a", json!({"type": "report"}), Some(unit_vector(4, 0)))
            .await
            .unwrap();
        store
            .store_document("b", json!({"type": "note"}), Some(unit_vector(4, 0)))
            .await
            .unwrap();
        store
            .store_document("c", json!({"type": "report"}), Some(unit_vector(4, 1)))
            .await
            .unwrap();

        let mut filters = MetadataFilter::new();
        filters.insert("type".into(), json!("report"));
        let hits = store
            .semantic_search(&query, 10, Some(&filters))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, a, "exact match ranks first");
    }

    #[tokio::test]
    async fn semantic_search_without_matches_is_empty() {
        let store = InMemoryMemory::new(4);
        let hits = store
            .semantic_search(&unit_vector(4, 0), 5, None)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn top_k_zero_is_validation_error_not_empty_list() {
        let store = InMemoryMemory::new(4);
        let err = store
            .semantic_search(&unit_vector(4, 0), 0, None)
            .await
            .expect_err("top_k = 0");
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn temporal_query_is_inclusive_and_ordered() {
        let store = InMemoryMemory::new(4);
        let id = store
            .store_document("doc", json!({}), None)
            .await
            .unwrap();
        let stored = store.documents.get(&id).unwrap().created_at;

        let hits = store.temporal_query(stored, stored, None).await.unwrap();
        assert_eq!(hits.len(), 1, "bounds are inclusive");

        let err = store
            .temporal_query(stored, stored - Duration::seconds(1), None)
            .await
            .expect_err("start after end");
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
