//! Ingestor trait and configuration

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{Chunk, Result};

/// Configuration for document loading and chunking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Pages shorter than this after cleaning are dropped
    pub min_page_chars: usize,
    /// Chunks shorter than this are dropped as noise
    pub min_chunk_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            min_page_chars: 20,
            min_chunk_chars: 200,
        }
    }
}

/// Turns source paths into cleaned, filtered chunks ready for indexing
#[async_trait]
pub trait Ingestor: Send + Sync {
    async fn ingest(&self, paths: &[PathBuf]) -> Result<Vec<Chunk>>;
}
