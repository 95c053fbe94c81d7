//! Stable-identity incremental writer over a vector index

use std::collections::HashMap;
use std::sync::Arc;

use kbqa_core::{Chunk, Embedder, Error, Result, StableId, VectorIndex, VectorRecord};

/// Writes chunks under their [`StableId`], so re-ingesting the same sources
/// replaces records instead of duplicating them.
pub struct ChunkStore<V: VectorIndex + ?Sized = dyn VectorIndex> {
    index: Arc<V>,
    embedder: Arc<dyn Embedder>,
}

impl<V: VectorIndex + ?Sized> ChunkStore<V> {
    /// Fails when the embedder and the index disagree on vector length
    pub fn new(index: Arc<V>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if index.dimension() != embedder.dimension() {
            return Err(Error::Configuration(format!(
                "Embedder '{}' produces {}-dimensional vectors but the index expects {}",
                embedder.model_id(),
                embedder.dimension(),
                index.dimension()
            )));
        }
        Ok(Self { index, embedder })
    }

    pub fn index(&self) -> &Arc<V> {
        &self.index
    }

    /// Embed and write `chunks`; returns the ids written, in first-seen order.
    ///
    /// Chunks sharing an id within one call are written once, the last one wins.
    pub async fn upsert(&self, chunks: Vec<Chunk>) -> Result<Vec<StableId>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let mut order: Vec<StableId> = Vec::new();
        let mut latest: HashMap<StableId, Chunk> = HashMap::new();
        for chunk in chunks {
            let id = chunk.stable_id();
            if latest.insert(id.clone(), chunk).is_none() {
                order.push(id);
            }
        }

        let mut unique: Vec<(StableId, Chunk)> = Vec::with_capacity(order.len());
        for id in &order {
            if let Some(chunk) = latest.remove(id) {
                unique.push((id.clone(), chunk));
            }
        }

        let texts: Vec<String> = unique.iter().map(|(_, c)| c.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != unique.len() {
            return Err(Error::Embedding(format!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                unique.len()
            )));
        }

        let dimension = self.index.dimension();
        let mut records = Vec::with_capacity(unique.len());
        for ((id, chunk), vector) in unique.into_iter().zip(vectors) {
            if vector.len() != dimension {
                return Err(Error::Configuration(format!(
                    "Embedding dimension mismatch: index expects {}, embedder returned {}",
                    dimension,
                    vector.len()
                )));
            }
            records.push(VectorRecord { id, vector, chunk });
        }

        self.index.upsert(records).await?;
        tracing::info!(written = order.len(), "upserted chunks");
        Ok(order)
    }

    /// Stored record count; 0 when the index cannot report it
    pub async fn count(&self) -> usize {
        match self.index.count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "vector index count failed");
                0
            }
        }
    }

    /// Destroy and recreate the backing collection
    pub async fn reset(&self) -> Result<()> {
        self.index.reset_collection().await?;
        tracing::info!("vector collection reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::vector_store::LocalVectorStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        inner: HashEmbedder,
        batch_calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed_batch(texts).await
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            self.inner.embed_query(text).await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn model_id(&self) -> &str {
            "counting"
        }
    }

    struct BrokenIndex;

    #[async_trait]
    impl VectorIndex for BrokenIndex {
        async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<()> {
            Err(Error::VectorStore("down".to_string()))
        }
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<kbqa_core::SearchHit>> {
            Err(Error::VectorStore("down".to_string()))
        }
        async fn count(&self) -> Result<usize> {
            Err(Error::VectorStore("down".to_string()))
        }
        async fn reset_collection(&self) -> Result<()> {
            Ok(())
        }
        fn dimension(&self) -> usize {
            32
        }
    }

    fn chunks() -> Vec<Chunk> {
        vec![
            Chunk::new("Garbled circuits enable secure two-party computation.", "gc.pdf")
                .with_page(1)
                .with_start_index(0),
            Chunk::new("Oblivious transfer is a building block of Yao's protocol.", "gc.pdf")
                .with_page(1)
                .with_start_index(800),
        ]
    }

    fn setup() -> (ChunkStore, Arc<CountingEmbedder>) {
        let embedder = Arc::new(CountingEmbedder {
            inner: HashEmbedder::new(64),
            batch_calls: AtomicUsize::new(0),
        });
        let index: Arc<dyn VectorIndex> = Arc::new(LocalVectorStore::in_memory(embedder.clone()));
        (ChunkStore::new(index, embedder.clone()).unwrap(), embedder)
    }

    #[tokio::test]
    async fn test_repeated_ingestion_is_idempotent() {
        let (store, _) = setup();
        let first = store.upsert(chunks()).await.unwrap();
        let second = store.upsert(chunks()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test]
    async fn test_embeds_in_one_batch() {
        let (store, embedder) = setup();
        store.upsert(chunks()).await.unwrap();
        assert_eq!(embedder.batch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_upsert_skips_embedder() {
        let (store, embedder) = setup();
        assert!(store.upsert(Vec::new()).await.unwrap().is_empty());
        assert_eq!(embedder.batch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicates_in_batch_written_once() {
        let (store, _) = setup();
        let mut batch = chunks();
        batch.push(batch[0].clone());
        let ids = store.upsert(batch).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test]
    async fn test_changed_content_leaves_stale_record() {
        let (store, _) = setup();
        store.upsert(chunks()).await.unwrap();

        let mut edited = chunks();
        edited[0].content.push_str(" Revised.");
        store.upsert(edited).await.unwrap();
        assert_eq!(store.count().await, 3);

        store.reset().await.unwrap();
        assert_eq!(store.count().await, 0);
    }

    #[test]
    fn test_dimension_mismatch_rejected_at_construction() {
        let index: Arc<dyn VectorIndex> = Arc::new(BrokenIndex);
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
        let err = ChunkStore::new(index, embedder).err().unwrap();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_count_swallows_index_errors() {
        let index: Arc<dyn VectorIndex> = Arc::new(BrokenIndex);
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
        let store = ChunkStore::new(index, embedder).unwrap();
        assert_eq!(store.count().await, 0);
    }
}
