//! Qdrant-backed vector index

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfig;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, DeleteCollectionBuilder, Distance, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use kbqa_core::{Chunk, Embedder, Error, Result, SearchHit, StableId, VectorIndex, VectorRecord};

const PAYLOAD_ID: &str = "stable_id";
const PAYLOAD_CONTENT: &str = "content";
const PAYLOAD_SOURCE: &str = "source";
const PAYLOAD_PAGE: &str = "page";
const PAYLOAD_START: &str = "start_index";

/// Vector index stored in a Qdrant collection
pub struct QdrantVectorStore {
    client: Qdrant,
    collection_name: String,
    embedder: Arc<dyn Embedder>,
}

fn qdrant_error(e: qdrant_client::QdrantError) -> Error {
    Error::VectorStore(e.to_string())
}

/// Qdrant point ids must be UUIDs or integers; derive one from the stable id
pub fn point_id(id: &StableId) -> String {
    Uuid::from_bytes(md5::compute(id.as_str().as_bytes()).0).to_string()
}

impl QdrantVectorStore {
    /// Connect and make sure the collection exists with the embedder's dimension
    pub async fn connect(
        url: &str,
        collection_name: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| Error::Configuration(format!("Invalid Qdrant URL {}: {}", url, e)))?;

        let store = Self {
            client,
            collection_name: collection_name.to_string(),
            embedder,
        };
        store.ensure_collection().await?;
        Ok(store)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection_name)
            .await
            .map_err(qdrant_error)?;

        if !exists {
            return self.create_collection().await;
        }

        let info = self
            .client
            .collection_info(&self.collection_name)
            .await
            .map_err(qdrant_error)?;
        let size = info
            .result
            .and_then(|i| i.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|c| match c {
                VectorsConfig::Params(params) => Some(params.size),
                _ => None,
            });

        match size {
            Some(size) if size as usize != self.embedder.dimension() => {
                Err(Error::Configuration(format!(
                    "Qdrant collection '{}' has {}-dimensional vectors, \
                     the configured embedder produces {}",
                    self.collection_name,
                    size,
                    self.embedder.dimension()
                )))
            }
            _ => Ok(()),
        }
    }

    async fn create_collection(&self) -> Result<()> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection_name).vectors_config(
                    VectorParamsBuilder::new(self.embedder.dimension() as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(qdrant_error)?;
        tracing::info!(collection = %self.collection_name, "created Qdrant collection");
        Ok(())
    }

    fn to_point(record: VectorRecord) -> PointStruct {
        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert(PAYLOAD_ID.to_string(), Value::from(record.id.to_string()));
        payload.insert(PAYLOAD_CONTENT.to_string(), Value::from(record.chunk.content));
        payload.insert(PAYLOAD_SOURCE.to_string(), Value::from(record.chunk.source));
        if let Some(page) = record.chunk.page {
            payload.insert(PAYLOAD_PAGE.to_string(), Value::from(page as i64));
        }
        if let Some(start) = record.chunk.start_index {
            payload.insert(PAYLOAD_START.to_string(), Value::from(start as i64));
        }

        PointStruct::new(point_id(&record.id), record.vector, payload)
    }
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> String {
    match payload.get(key) {
        Some(Value {
            kind: Some(Kind::StringValue(s)),
        }) => s.clone(),
        _ => String::new(),
    }
}

fn payload_int(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
    match payload.get(key) {
        Some(Value {
            kind: Some(Kind::IntegerValue(n)),
        }) => Some(*n),
        _ => None,
    }
}

fn chunk_from_payload(payload: &HashMap<String, Value>) -> Chunk {
    Chunk {
        content: payload_str(payload, PAYLOAD_CONTENT),
        source: payload_str(payload, PAYLOAD_SOURCE),
        page: payload_int(payload, PAYLOAD_PAGE).and_then(|p| u32::try_from(p).ok()),
        start_index: payload_int(payload, PAYLOAD_START).and_then(|s| usize::try_from(s).ok()),
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let points: Vec<PointStruct> = records.into_iter().map(Self::to_point).collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection_name, points).wait(true))
            .await
            .map_err(qdrant_error)?;
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed_query(query).await?;

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection_name, vector, k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(qdrant_error)?;

        Ok(response
            .result
            .into_iter()
            .map(|point| SearchHit {
                chunk: chunk_from_payload(&point.payload),
                score: point.score,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection_name).exact(true))
            .await
            .map_err(qdrant_error)?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn reset_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection_name)
            .await
            .map_err(qdrant_error)?;
        if exists {
            self.client
                .delete_collection(DeleteCollectionBuilder::new(&self.collection_name))
                .await
                .map_err(qdrant_error)?;
        }
        self.create_collection().await
    }

    fn dimension(&self) -> usize {
        self.embedder.dimension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_stable_uuid() {
        let id = Chunk::new("Yao's protocol", "gc.pdf").with_page(2).stable_id();
        let a = point_id(&id);
        assert_eq!(a, point_id(&id));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_payload_round_trip() {
        let chunk = Chunk::new("Yao's protocol", "gc.pdf").with_page(2).with_start_index(40);
        let record = VectorRecord {
            id: chunk.stable_id(),
            vector: vec![0.0; 4],
            chunk: chunk.clone(),
        };
        let point = QdrantVectorStore::to_point(record);
        assert_eq!(chunk_from_payload(&point.payload), chunk);
        assert_eq!(payload_str(&point.payload, PAYLOAD_ID), chunk.stable_id().to_string());
    }

    #[test]
    fn test_missing_page_stays_empty() {
        let chunk = Chunk::new("notes", "notes.txt");
        let record = VectorRecord {
            id: chunk.stable_id(),
            vector: vec![0.0; 4],
            chunk: chunk.clone(),
        };
        let point = QdrantVectorStore::to_point(record);
        assert_eq!(chunk_from_payload(&point.payload).page, None);
    }
}
