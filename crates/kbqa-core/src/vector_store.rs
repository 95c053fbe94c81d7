//! Vector index and embedding traits

use async_trait::async_trait;

use crate::{Result, SearchHit, VectorRecord};

/// Dense embedding capability.
///
/// Writes and queries against one collection must go through the same embedder;
/// `dimension` is what the stores check to enforce that.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed many texts in one call, preserving input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of every vector this embedder produces
    fn dimension(&self) -> usize;

    /// Identifier of the embedding model configuration
    fn model_id(&self) -> &str;
}

/// Trait for vector indexes (in-process store, Qdrant, ...)
///
/// Implementations own the query-side embedding and must make each record
/// upsert atomic: a concurrent reader sees either the old record or the new one.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace records by id
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Top-`k` records for a query text, best first
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>>;

    /// Number of stored records
    async fn count(&self) -> Result<usize>;

    /// Drop every record and recreate the empty collection
    async fn reset_collection(&self) -> Result<()>;

    /// Vector length the collection was created with
    fn dimension(&self) -> usize;
}
