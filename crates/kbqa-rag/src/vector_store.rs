//! In-process vector index with optional JSON persistence

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use kbqa_core::{Chunk, Embedder, Error, Result, SearchHit, StableId, VectorIndex, VectorRecord};

use crate::embedding::cosine_similarity;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    vector: Vec<f32>,
    chunk: Chunk,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    embedding_dimension: usize,
    embedding_model: String,
    records: Vec<VectorRecord>,
}

/// Local vector store: a `HashMap` of records behind a lock.
///
/// When opened with a path, every mutation rewrites the file through a
/// temporary file and a rename, so readers of the file never see a partial write.
/// A mutation whose write fails leaves the in-memory records untouched.
pub struct LocalVectorStore {
    records: RwLock<HashMap<StableId, StoredRecord>>,
    embedder: Arc<dyn Embedder>,
    path: Option<PathBuf>,
    score_threshold: Option<f32>,
}

impl LocalVectorStore {
    /// Create an empty store that lives only in memory
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            embedder,
            path: None,
            score_threshold: None,
        }
    }

    /// Open (or create) a store persisted at `path`
    pub fn open(path: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut records = HashMap::new();

        if path.exists() {
            let content = fs::read_to_string(&path)?;
            let stored: StoreFile = serde_json::from_str(&content)?;
            if stored.embedding_dimension != embedder.dimension() {
                return Err(Error::Configuration(format!(
                    "{} was built with {}-dimensional embeddings ({}), but the configured embedder produces {}",
                    path.display(),
                    stored.embedding_dimension,
                    stored.embedding_model,
                    embedder.dimension()
                )));
            }
            for record in stored.records {
                records.insert(
                    record.id,
                    StoredRecord {
                        vector: record.vector,
                        chunk: record.chunk,
                    },
                );
            }
            tracing::info!(
                path = %path.display(),
                records = records.len(),
                "loaded local vector store"
            );
        }

        Ok(Self {
            records: RwLock::new(records),
            embedder,
            path: Some(path),
            score_threshold: None,
        })
    }

    /// Drop hits whose similarity is below `threshold`
    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn save(&self, records: &HashMap<StableId, StoredRecord>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut sorted: Vec<VectorRecord> = records
            .iter()
            .map(|(id, record)| VectorRecord {
                id: id.clone(),
                vector: record.vector.clone(),
                chunk: record.chunk.clone(),
            })
            .collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));

        let store_file = StoreFile {
            embedding_dimension: self.embedder.dimension(),
            embedding_model: self.embedder.model_id().to_string(),
            records: sorted,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer(&mut tmp, &store_file)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    fn lock_error<T>(e: std::sync::PoisonError<T>) -> Error {
        Error::VectorStore(format!("Lock error: {}", e))
    }
}

#[async_trait]
impl VectorIndex for LocalVectorStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        let dimension = self.embedder.dimension();
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dimension) {
            return Err(Error::Configuration(format!(
                "Record {} has a {}-dimensional vector, collection expects {}",
                bad.id,
                bad.vector.len(),
                dimension
            )));
        }

        let mut docs = self.records.write().map_err(Self::lock_error)?;
        let mut updated = docs.clone();
        for record in records {
            updated.insert(
                record.id,
                StoredRecord {
                    vector: record.vector,
                    chunk: record.chunk,
                },
            );
        }
        // Memory only changes once the file holds the same records
        self.save(&updated)?;
        *docs = updated;
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed_query(query).await?;

        let docs = self.records.read().map_err(Self::lock_error)?;
        let mut scored: Vec<(&StableId, f32, &StoredRecord)> = docs
            .iter()
            .map(|(id, record)| (id, cosine_similarity(&query_vector, &record.vector), record))
            .filter(|(_, score, _)| match self.score_threshold {
                Some(threshold) => *score >= threshold,
                None => true,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, score, record)| SearchHit {
                chunk: record.chunk.clone(),
                score,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let docs = self.records.read().map_err(Self::lock_error)?;
        Ok(docs.len())
    }

    async fn reset_collection(&self) -> Result<()> {
        let mut docs = self.records.write().map_err(Self::lock_error)?;
        self.save(&HashMap::new())?;
        docs.clear();
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.embedder.dimension()
    }
}
