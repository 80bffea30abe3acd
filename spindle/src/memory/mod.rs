//! # Memory: sessions, messages, documents, and semantic retrieval
//!
//! [`MemoryStore`] is the engine's only persistence contract. It stores
//! conversation history (sessions + messages) and research documents with
//! optional fixed-dimension embeddings, and answers three query shapes:
//! semantic (cosine similarity over embeddings), temporal (inclusive
//! `created_at` range), and metadata-filtered (exact match on metadata keys).
//!
//! ## Implementations
//!
//! | Type | Persistence | Vector index |
//! |------|-------------|--------------|
//! | [`SqliteVecMemory`] | SQLite file | sqlite-vec `vec0` table |
//! | [`InMemoryMemory`]  | In-memory   | exact cosine scan |
//!
//! Both run every blocking call under `tokio::task::spawn_blocking`; the
//! operation surface is fully async. The embedding dimension is fixed when a
//! store is constructed and validated on every write before any I/O.
//!
//! [`Embedder`] is the contract for the external collaborator that turns text
//! into vectors; the store itself never generates embeddings.

mod embedder;
mod in_memory;
mod sqlite_vec;
mod store;

pub use embedder::Embedder;
pub use in_memory::InMemoryMemory;
pub use sqlite_vec::SqliteVecMemory;
pub use store::{
    cosine_similarity, Document, HealthReport, HealthStatus, MemoryStore, MetadataFilter, Role,
    SessionRecord, StoreError, StoredMessage, AUTO_CREATED_USER, DEFAULT_EMBEDDING_DIMENSION,
};
