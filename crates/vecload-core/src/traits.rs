use async_trait::async_trait;

use crate::types::{IndexDescription, IndexDescriptor, IndexHandle, VectorItem};

/// Text → fixed-length vector. Implementations apply one pooling and
/// normalization policy to every call and are deterministic for a fixed
/// configuration.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_text(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_text(t)).collect()
    }
}

/// Narrow view of a remote vector index service.
#[async_trait]
pub trait VectorIndexClient: Send + Sync {
    async fn list_indexes(&self) -> anyhow::Result<Vec<String>>;

    /// `Ok(None)` when no index carries `name`.
    async fn describe_index(&self, name: &str) -> anyhow::Result<Option<IndexDescription>>;

    /// Creates the index and returns once the service reports it ready.
    async fn create_index(&self, descriptor: &IndexDescriptor) -> anyhow::Result<IndexDescription>;

    /// Blocks until an existing index reports ready.
    async fn wait_until_ready(&self, name: &str) -> anyhow::Result<IndexDescription>;

    /// Deletes the index and returns once the name is gone from the service.
    async fn delete_index(&self, name: &str) -> anyhow::Result<()>;

    /// Writes `items` in a single call. Returns the number of upserted items.
    async fn upsert(&self, index: &IndexHandle, items: &[VectorItem]) -> anyhow::Result<usize>;
}
