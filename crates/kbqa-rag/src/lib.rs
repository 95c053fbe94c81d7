//! Adaptive retrieval-and-answer engine for KBQA
//!
//! This crate provides the chunk store, query expansion, merged retrieval and
//! the round-based answer loop, plus the vector indexes, embedders and
//! document ingestor they run on.

mod answer_loop;
mod chunk_store;
mod config;
mod context;
mod decision;
mod embedding;
mod ingest;
mod pipeline;
pub mod prompts;
mod qdrant_store;
mod query_expander;
mod retrieval;
mod vector_store;


pub use answer_loop::{AnswerLoop, AnswerOptions, AnswerTrace, Outcome};
pub use chunk_store::ChunkStore;
pub use config::{RagConfig, VectorBackend};
pub use context::{render_citations, render_context, truncate_chars, ContextBudget};
pub use decision::{parse_decision, Decision};
pub use embedding::{EmbeddingProvider, HashEmbedder};
pub use ingest::{html_to_text, markdown_to_text, DocumentIngestor, TextSplitter};
pub use pipeline::{IndexBuilder, IndexReport, RetrievalTool, NO_PASSAGES};
pub use qdrant_store::{point_id, QdrantVectorStore};
pub use query_expander::{default_rules, QueryExpander, SynonymRule};
pub use retrieval::{merge_unique, RetrievalMerger};
pub use vector_store::LocalVectorStore;

// Re-export core types for convenience
pub use kbqa_core::{
    Chunk, CompletionService, Embedder, Error, IngestConfig, Ingestor, Result, SearchHit,
    StableId, VectorIndex, VectorRecord,
};
