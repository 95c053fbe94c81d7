//! OpenAI-compatible embeddings client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;

use kbqa_core::{Embedder, Error, Result};

use crate::config::EmbeddingConfig;

const REQUEST_BATCH_SIZE: usize = 64;

/// Embedder backed by a remote `/embeddings` endpoint
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    request_timeout: Duration,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig, request_timeout: Duration) -> Result<Self> {
        let base_url = config.base_url.clone().ok_or_else(|| {
            Error::Configuration(format!(
                "Embedding model '{}' needs EMBEDDING_BASE_URL",
                config.model
            ))
        })?;
        let api_key = config.api_key.clone().ok_or_else(|| {
            Error::Configuration(format!(
                "Embedding model '{}' needs EMBEDDING_API_KEY",
                config.model
            ))
        })?;

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            request_timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let send = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let response = match timeout(self.request_timeout, send).await {
            Ok(result) => result.map_err(|e| Error::Network(e.to_string()))?,
            Err(_) => return Err(Error::Timeout("Embedding request timed out".to_string())),
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Embedding(format!(
                "Embedding request failed with status {}: {}",
                status, error_text
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(e.to_string()))?;

        order_embeddings(parsed.data, texts.len(), self.dimension)
    }
}

/// Restore input order and enforce the configured dimension
fn order_embeddings(
    mut data: Vec<EmbeddingData>,
    expected: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(Error::Embedding(format!(
            "Expected {} embeddings, received {}",
            expected,
            data.len()
        )));
    }

    data.sort_by_key(|d| d.index);

    data.into_iter()
        .map(|d| {
            if d.embedding.len() != dimension {
                Err(Error::Configuration(format!(
                    "Embedding dimension mismatch: configured {}, model returned {}",
                    dimension,
                    d.embedding.len()
                )))
            } else {
                Ok(d.embedding)
            }
        })
        .collect()
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(REQUEST_BATCH_SIZE) {
            vectors.extend(self.request(batch).await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Embedding("Empty embedding response".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
