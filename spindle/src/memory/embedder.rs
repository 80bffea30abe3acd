//! Embedder contract. The store never generates embeddings itself; this is
//! the interface of the collaborator that does (used by the memory tools).

use async_trait::async_trait;

use super::store::StoreError;

/// Produces fixed-size float vectors from text.
///
/// One vector per input text, in order, each of length
/// [`Embedder::dimension`]. Implementations must be `Send + Sync`.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StoreError>;

    /// Vector dimension returned by [`Embedder::embed`].
    fn dimension(&self) -> usize;
}
