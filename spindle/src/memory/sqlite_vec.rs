//! SQLite-backed [`MemoryStore`] with vector search via sqlite-vec.
//!
//! Dual-table design for documents: the `documents` table holds content,
//! metadata, and the embedding JSON; a `vec0` virtual table holds the vector
//! index keyed by the document's integer `seq`. The index narrows the
//! candidate set; exact cosine ordering over those candidates happens in
//! Rust. Sessions and messages are plain tables with an `ON DELETE CASCADE`
//! foreign key.
//!
//! The embedding dimension is fixed when the virtual table is first created;
//! a store opened over an existing file must be constructed with the same
//! dimension.

use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::telemetry;

use super::store::{
    cosine_similarity, metadata_matches, validate_content, validate_embedding, validate_limit,
    validate_range, validate_top_k, Document, HealthReport, HealthStatus, MemoryStore,
    MetadataFilter, Role, StoreError, StoredMessage, AUTO_CREATED_USER,
};

static SQLITE_VEC_INIT: Once = Once::new();

const BACKEND: &str = "sqlite-vec";
const VEC_TABLE: &str = "document_embeddings";

fn millis_now() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Formats a vector as JSON for sqlite-vec (e.g. "[0.1,0.2,0.3]").
fn vector_to_json(v: &[f32]) -> String {
    let parts: Vec<String> = v.iter().map(|f| f.to_string()).collect();
    format!("[{}]", parts.join(","))
}

fn storage(e: impl std::fmt::Display) -> StoreError {
    StoreError::Storage(e.to_string())
}

/// SQLite + sqlite-vec memory store.
///
/// **Interaction**: Used as `Arc<dyn MemoryStore>` by the finish node, the
/// memory tools, and the orchestrator. Each operation opens its own
/// connection on the blocking pool; the vec0 extension is registered
/// process-wide on first construction.
pub struct SqliteVecMemory {
    db_path: std::path::PathBuf,
    dimension: usize,
}

impl SqliteVecMemory {
    /// Opens (or creates) the store at `path` with the given embedding
    /// dimension. Creates the schema when missing.
    pub fn new(path: impl AsRef<Path>, dimension: usize) -> Result<Self, StoreError> {
        SQLITE_VEC_INIT.call_once(|| unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        });

        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path).map_err(storage)?;
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_messages_session_created
                ON messages(session_id, created_at);

            CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                content TEXT NOT NULL,
                embedding TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_created ON documents(created_at);
            "#,
        )
        .map_err(storage)?;

        let create_vec_sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING vec0(embedding float[{}])",
            VEC_TABLE, dimension
        );
        conn.execute(&create_vec_sql, []).map_err(storage)?;

        Ok(Self { db_path, dimension })
    }

    fn open(db_path: &Path) -> Result<rusqlite::Connection, StoreError> {
        let conn = rusqlite::Connection::open(db_path).map_err(storage)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(storage)?;
        Ok(conn)
    }

    fn row_to_document(row: &rusqlite::Row<'_>) -> Result<Document, rusqlite::Error> {
        let id: String = row.get("id")?;
        let content: String = row.get("content")?;
        let embedding_json: Option<String> = row.get("embedding")?;
        let metadata_json: String = row.get("metadata")?;
        let created_at: i64 = row.get("created_at")?;
        let updated_at: i64 = row.get("updated_at")?;
        Ok(Document {
            id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
            content,
            embedding: embedding_json.and_then(|j| serde_json::from_str(&j).ok()),
            metadata: serde_json::from_str(&metadata_json).unwrap_or(Value::Null),
            created_at: millis_to_datetime(created_at),
            updated_at: millis_to_datetime(updated_at),
        })
    }
}

#[async_trait]
impl MemoryStore for SqliteVecMemory {
    async fn store_message(
        &self,
        session_id: Uuid,
        role: Role,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<Uuid, StoreError> {
        validate_content(content)?;
        let span = telemetry::memory_span("store_message", BACKEND);

        let db_path = self.db_path.clone();
        let content = content.to_string();
        let metadata_json =
            serde_json::to_string(&metadata.unwrap_or_else(|| Value::Object(Default::default())))?;
        let message_id = Uuid::new_v4();

        let result = tokio::task::spawn_blocking(move || {
            let conn = Self::open(&db_path)?;
            let now = millis_now();
            // Implicit session: upsert keeps the original created_at/user_id.
            conn.execute(
                "INSERT INTO sessions (id, user_id, created_at, updated_at, metadata)
                 VALUES (?1, ?2, ?3, ?3, '{}')
                 ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
                params![session_id.to_string(), AUTO_CREATED_USER, now],
            )
            .map_err(storage)?;
            conn.execute(
                "INSERT INTO messages (id, session_id, role, content, created_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message_id.to_string(),
                    session_id.to_string(),
                    role.as_str(),
                    content,
                    now,
                    metadata_json
                ],
            )
            .map_err(storage)?;
            Ok::<Uuid, StoreError>(message_id)
        })
        .instrument(span.clone())
        .await
        .map_err(storage)?;

        telemetry::record_success(&span, result.is_ok());
        result
    }

    async fn get_conversation_history(
        &self,
        session_id: Uuid,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        validate_limit(limit)?;
        let span = telemetry::memory_span("get_conversation_history", BACKEND);

        let db_path = self.db_path.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = Self::open(&db_path)?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, session_id, role, content, created_at, metadata
                     FROM messages WHERE session_id = ?1
                     ORDER BY created_at ASC, rowid ASC LIMIT ?2",
                )
                .map_err(storage)?;
            let rows = stmt
                .query_map(params![session_id.to_string(), limit as i64], |row| {
                    let id: String = row.get(0)?;
                    let session: String = row.get(1)?;
                    let role: String = row.get(2)?;
                    let content: String = row.get(3)?;
                    let created_at: i64 = row.get(4)?;
                    let metadata: String = row.get(5)?;
                    Ok((id, session, role, content, created_at, metadata))
                })
                .map_err(storage)?;

            let mut out = Vec::new();
            for row in rows {
                let (id, session, role, content, created_at, metadata) = row.map_err(storage)?;
                out.push(StoredMessage {
                    id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
                    session_id: Uuid::parse_str(&session).unwrap_or_else(|_| Uuid::nil()),
                    role: Role::parse(&role).map_err(StoreError::Validation)?,
                    content,
                    created_at: millis_to_datetime(created_at),
                    metadata: serde_json::from_str(&metadata).unwrap_or(Value::Null),
                });
            }
            Ok::<Vec<StoredMessage>, StoreError>(out)
        })
        .instrument(span.clone())
        .await
        .map_err(storage)?;

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
        validate_content(content)?;
        if let Some(ref vector) = embedding {
            validate_embedding(self.dimension, vector)?;
        }
        let span = telemetry::memory_span("store_document", BACKEND);

        let db_path = self.db_path.clone();
        let content = content.to_string();
        let metadata_json = serde_json::to_string(&metadata)?;
        let doc_id = Uuid::new_v4();

        let result = tokio::task::spawn_blocking(move || {
            let conn = Self::open(&db_path)?;
            let now = millis_now();
            let embedding_json = embedding.as_deref().map(vector_to_json);
            conn.execute(
                "INSERT INTO documents (id, content, embedding, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![doc_id.to_string(), content, embedding_json, metadata_json, now],
            )
            .map_err(storage)?;
            if let Some(ref vec_json) = embedding_json {
                let seq = conn.last_insert_rowid();
                conn.execute(
                    &format!("INSERT INTO {} (rowid, embedding) VALUES (?1, ?2)", VEC_TABLE),
                    params![seq, vec_json],
                )
                .map_err(storage)?;
            }
            Ok::<Uuid, StoreError>(doc_id)
        })
        .instrument(span.clone())
        .await
        .map_err(storage)?;

        telemetry::record_success(&span, result.is_ok());
        result
    }

    async fn semantic_search(
        &self,
        query_embedding: &[f32],
        top_k: u32,
        filters: Option<&MetadataFilter>,
    ) -> Result<Vec<Document>, StoreError> {
        validate_top_k(top_k)?;
        validate_embedding(self.dimension, query_embedding)?;
        let span = telemetry::memory_span("semantic_search", BACKEND);

        let db_path = self.db_path.clone();
        let query = query_embedding.to_vec();
        let filters = filters.cloned();
        // ANN candidate pool is wider than top_k so that metadata filtering
        // and exact re-ranking still produce a full result set.
        let knn_limit = ((top_k as usize).max(50)) * 3;

        let result = tokio::task::spawn_blocking(move || {
            let conn = Self::open(&db_path)?;
            let vec_json = vector_to_json(&query);
            let knn_sql = format!(
                "SELECT rowid FROM {} WHERE embedding MATCH ?1 AND k = ?2",
                VEC_TABLE
            );
            let mut stmt = conn.prepare(&knn_sql).map_err(storage)?;
            let rows = stmt
                .query_map(params![vec_json, knn_limit as i64], |row| {
                    row.get::<_, i64>(0)
                })
                .map_err(storage)?;
            let seqs: Vec<i64> = rows.collect::<Result<Vec<_>, _>>().map_err(storage)?;
            if seqs.is_empty() {
                return Ok::<Vec<Document>, StoreError>(Vec::new());
            }

            let placeholders: Vec<String> =
                (1..=seqs.len()).map(|i| format!("?{}", i)).collect();
            let doc_sql = format!(
                "SELECT id, content, embedding, metadata, created_at, updated_at
                 FROM documents WHERE seq IN ({})",
                placeholders.join(",")
            );
            let mut stmt = conn.prepare(&doc_sql).map_err(storage)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(seqs.iter()), Self::row_to_document)
                .map_err(storage)?;

            let mut candidates = Vec::new();
            for row in rows {
                let doc = row.map_err(storage)?;
                if !metadata_matches(&doc.metadata, filters.as_ref()) {
                    continue;
                }
                let similarity = doc
                    .embedding
                    .as_deref()
                    .map(|e| cosine_similarity(&query, e))
                    .unwrap_or(0.0);
                candidates.push((similarity, doc));
            }

            // Exact ordering over the examined candidates: similarity desc,
            // updated_at desc, id asc.
            candidates.sort_by(|(sim_a, a), (sim_b, b)| {
                sim_b
                    .partial_cmp(sim_a)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.updated_at.cmp(&a.updated_at))
                    .then(a.id.cmp(&b.id))
            });
            candidates.truncate(top_k as usize);
            Ok(candidates.into_iter().map(|(_, doc)| doc).collect())
        })
        .instrument(span.clone())
        .await
        .map_err(storage)?;

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
        validate_range(start, end)?;
        let span = telemetry::memory_span("temporal_query", BACKEND);

        let db_path = self.db_path.clone();
        let filters = filters.cloned();
        let start_ms = start.timestamp_millis();
        let end_ms = end.timestamp_millis();

        let result = tokio::task::spawn_blocking(move || {
            let conn = Self::open(&db_path)?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, content, embedding, metadata, created_at, updated_at
                     FROM documents WHERE created_at >= ?1 AND created_at <= ?2
                     ORDER BY created_at ASC, seq ASC",
                )
                .map_err(storage)?;
            let rows = stmt
                .query_map(params![start_ms, end_ms], Self::row_to_document)
                .map_err(storage)?;
            let mut out = Vec::new();
            for row in rows {
                let doc = row.map_err(storage)?;
                if metadata_matches(&doc.metadata, filters.as_ref()) {
                    out.push(doc);
                }
            }
            Ok::<Vec<Document>, StoreError>(out)
        })
        .instrument(span.clone())
        .await
        .map_err(storage)?;

        telemetry::record_success(&span, result.is_ok());
        if let Ok(ref docs) = result {
            telemetry::record_result_count(&span, docs.len());
        }
        result
    }

    async fn health_check(&self) -> HealthReport {
        let db_path = self.db_path.clone();
        let probe = tokio::task::spawn_blocking(move || {
            let conn = Self::open(&db_path)?;
            let vec_version: String = conn
                .query_row("SELECT vec_version()", [], |row| row.get(0))
                .map_err(storage)?;
            Ok::<String, StoreError>(vec_version)
        })
        .await;

        let mut versions = std::collections::BTreeMap::new();
        versions.insert(
            "sqlite".to_string(),
            rusqlite::version().to_string(),
        );
        match probe {
            Ok(Ok(vec_version)) => {
                versions.insert("sqlite-vec".to_string(), vec_version);
                HealthReport {
                    status: HealthStatus::Healthy,
                    backend: BACKEND.to_string(),
                    detail: None,
                    versions,
                }
            }
            Ok(Err(err)) => HealthReport {
                status: HealthStatus::Unhealthy,
                backend: BACKEND.to_string(),
                detail: Some(err.to_string()),
                versions,
            },
            Err(join_err) => HealthReport {
                status: HealthStatus::Unhealthy,
                backend: BACKEND.to_string(),
                detail: Some(join_err.to_string()),
                versions,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn unit_vector(dimension: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        v[hot % dimension] = 1.0;
        v
    }

    #[tokio::test]
    async fn store_and_search_exact_match_ranks_first() {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteVecMemory::new(file.path(), 8).unwrap();

        let target = unit_vector(8, 0);
        let other = unit_vector(8, 3);
        let doc_id = store
            .store_document("target doc", serde_json::json!({}), Some(target.clone()))
            .await
            .unwrap();
        store
            .store_document("other doc", serde_json::json!({}), Some(other))
            .await
            .unwrap();

        let hits = store.semantic_search(&target, 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, doc_id);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected_before_io() {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteVecMemory::new(file.path(), 8).unwrap();
        let err = store
            .store_document("doc", serde_json::json!({}), Some(vec![1.0, 2.0]))
            .await
            .expect_err("wrong dimension");
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn session_is_auto_created_on_first_message() {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteVecMemory::new(file.path(), 8).unwrap();
        let session_id = Uuid::new_v4();

        store
            .store_message(session_id, Role::User, "hello", None)
            .await
            .unwrap();
        let history = store
            .get_conversation_history(session_id, 10)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hello");
        assert_eq!(history[0].role, Role::User);
    }

    #[tokio::test]
    async fn unknown_session_history_is_empty_not_error() {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteVecMemory::new(file.path(), 8).unwrap();
        let history = store
            .get_conversation_history(Uuid::new_v4(), 10)
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn deleting_session_cascades_to_messages() {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteVecMemory::new(file.path(), 8).unwrap();
        let session_id = Uuid::new_v4();
        store
            .store_message(session_id, Role::User, "to be removed", None)
            .await
            .unwrap();

        // Session deletion is outside the core surface; exercise the schema
        // guarantee directly.
        let conn = SqliteVecMemory::open(&store.db_path).unwrap();
        conn.execute(
            "DELETE FROM sessions WHERE id = ?1",
            params![session_id.to_string()],
        )
        .unwrap();
        drop(conn);

        let history = store
            .get_conversation_history(session_id, 10)
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteVecMemory::new(file.path(), 8).unwrap();
        let err = store
            .store_message(Uuid::new_v4(), Role::User, "   ", None)
            .await
            .expect_err("whitespace content");
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn health_check_reports_versions() {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteVecMemory::new(file.path(), 8).unwrap();
        let report = store.health_check().await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.versions.contains_key("sqlite"));
    }
}
