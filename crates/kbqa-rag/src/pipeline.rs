//! Index building and the citation-context retrieval tool

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use kbqa_core::{Ingestor, Result, VectorIndex};

use crate::chunk_store::ChunkStore;
use crate::context::render_citations;
use crate::retrieval::RetrievalMerger;

/// Reply of [`RetrievalTool::run`] when nothing was found
pub const NO_PASSAGES: &str = "（未检索到相关片段）";

/// What `build_index` did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexReport {
    /// The collection already had records and no rebuild was requested
    Skipped { existing: usize },
    /// Ingestion produced no chunks
    NothingToIndex,
    Indexed { written: usize },
}

/// Ingest documents into a [`ChunkStore`]
pub struct IndexBuilder<I: Ingestor + ?Sized, V: VectorIndex + ?Sized = dyn VectorIndex> {
    ingestor: Arc<I>,
    store: Arc<ChunkStore<V>>,
}

impl<I: Ingestor + ?Sized, V: VectorIndex + ?Sized> IndexBuilder<I, V> {
    pub fn new(ingestor: Arc<I>, store: Arc<ChunkStore<V>>) -> Self {
        Self { ingestor, store }
    }

    /// `reset` rebuilds from scratch; otherwise `skip_if_exists` leaves a non-empty index alone
    pub async fn build_index(
        &self,
        paths: &[PathBuf],
        reset: bool,
        skip_if_exists: bool,
    ) -> Result<IndexReport> {
        if reset {
            self.store.reset().await?;
        } else if skip_if_exists {
            let existing = self.store.count().await;
            if existing > 0 {
                tracing::info!(existing, "index already populated, skipping rebuild");
                return Ok(IndexReport::Skipped { existing });
            }
        }

        let chunks = self.ingestor.ingest(paths).await?;
        if chunks.is_empty() {
            tracing::info!("no chunks to index");
            return Ok(IndexReport::NothingToIndex);
        }

        let ids = self.store.upsert(chunks).await?;
        tracing::info!(written = ids.len(), "index built");
        Ok(IndexReport::Indexed { written: ids.len() })
    }
}

/// Merged retrieval rendered as citation context, ready to paste into a prompt
pub struct RetrievalTool<V: VectorIndex + ?Sized = dyn VectorIndex> {
    retriever: Arc<RetrievalMerger<V>>,
    k: usize,
    max_chars: usize,
}

impl<V: VectorIndex + ?Sized> RetrievalTool<V> {
    pub fn new(retriever: Arc<RetrievalMerger<V>>) -> Self {
        Self {
            retriever,
            k: 5,
            max_chars: 7000,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k.max(1);
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn name(&self) -> &'static str {
        "rag_retrieve"
    }

    pub async fn run(&self, query: &str) -> String {
        let chunks = self.retriever.retrieve(query, self.k).await;
        if chunks.is_empty() {
            return NO_PASSAGES.to_string();
        }
        render_citations(&chunks, self.max_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::query_expander::QueryExpander;
    use crate::vector_store::LocalVectorStore;
    use async_trait::async_trait;
    use kbqa_core::{Chunk, Embedder};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedIngestor {
        chunks: Vec<Chunk>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Ingestor for FixedIngestor {
        async fn ingest(&self, _paths: &[PathBuf]) -> Result<Vec<Chunk>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.chunks.clone())
        }
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            Chunk::new("Secret sharing splits a value into shares held by different parties.", "ss.pdf")
                .with_page(1)
                .with_start_index(0),
            Chunk::new("Homomorphic encryption allows computation on encrypted data.", "he.pdf")
                .with_page(4)
                .with_start_index(0),
        ]
    }

    fn setup(
        chunks: Vec<Chunk>,
    ) -> (IndexBuilder<FixedIngestor>, Arc<FixedIngestor>, Arc<ChunkStore>) {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(128));
        let index: Arc<dyn VectorIndex> = Arc::new(LocalVectorStore::in_memory(embedder.clone()));
        let store = Arc::new(ChunkStore::new(index, embedder).unwrap());
        let ingestor = Arc::new(FixedIngestor {
            chunks,
            calls: AtomicUsize::new(0),
        });
        (IndexBuilder::new(ingestor.clone(), store.clone()), ingestor, store)
    }

    #[tokio::test]
    async fn test_build_then_skip() {
        let (builder, ingestor, store) = setup(corpus());

        let report = builder.build_index(&[], false, true).await.unwrap();
        assert_eq!(report, IndexReport::Indexed { written: 2 });

        let report = builder.build_index(&[], false, true).await.unwrap();
        assert_eq!(report, IndexReport::Skipped { existing: 2 });
        assert_eq!(ingestor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test]
    async fn test_forced_rebuild_is_idempotent() {
        let (builder, _, store) = setup(corpus());
        builder.build_index(&[], false, false).await.unwrap();
        builder.build_index(&[], false, false).await.unwrap();
        assert_eq!(store.count().await, 2);

        builder.build_index(&[], true, true).await.unwrap();
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test]
    async fn test_nothing_to_index() {
        let (builder, _, _) = setup(Vec::new());
        let report = builder.build_index(&[], false, true).await.unwrap();
        assert_eq!(report, IndexReport::NothingToIndex);
        insta::assert_snapshot!(serde_json::to_string(&report).unwrap(), @r#"{"status":"nothing_to_index"}"#);
    }

    #[tokio::test]
    async fn test_retrieval_tool_renders_citations() {
        let (builder, _, store) = setup(corpus());
        builder.build_index(&[], false, true).await.unwrap();

        let retriever = Arc::new(RetrievalMerger::new(store.index().clone(), QueryExpander::default()));
        let tool = RetrievalTool::new(retriever).with_k(1);

        let context = tool.run("secret sharing").await;
        assert!(context.starts_with("[1] source=ss.pdf page=1\nSecret sharing splits"));
    }

    #[tokio::test]
    async fn test_retrieval_tool_empty_index() {
        let (_, _, store) = setup(Vec::new());
        let retriever = Arc::new(RetrievalMerger::new(store.index().clone(), QueryExpander::default()));
        assert_eq!(RetrievalTool::new(retriever).run("anything").await, NO_PASSAGES);
    }
}
