//! Embedding backends: the offline hash embedder and the memoizing provider

use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use kbqa_core::{Embedder, Result};
use kbqa_llm::{EmbeddingConfig, HttpEmbedder};

const BIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic bag-of-features embedder that needs no model download.
///
/// Latin words and digits form tokens; every CJK character is a token of its
/// own. Unigrams and adjacent-token bigrams are hashed (md5) into a fixed
/// number of buckets and the result is L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            model_id: format!("{}-{}", kbqa_llm::LOCAL_HASH_MODEL, dimension.max(1)),
        }
    }

    fn bucket(&self, feature: &str) -> usize {
        let digest = md5::compute(feature.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.0[..8]);
        (u64::from_le_bytes(head) % self.dimension as u64) as usize
    }

    /// Embed synchronously; the async trait methods delegate here
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let mut vector = vec![0.0f32; self.dimension];

        for token in &tokens {
            vector[self.bucket(token)] += 1.0;
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            vector[self.bucket(&bigram)] += BIGRAM_WEIGHT;
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in vector.iter_mut() {
                *value /= magnitude;
            }
        }
        vector
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{AC00}'..='\u{D7AF}')
}

/// Lowercased word and CJK-character tokens
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    for c in text.chars() {
        if is_cjk(c) {
            if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
            tokens.push(c.to_string());
        } else if c.is_alphanumeric() {
            word.extend(c.to_lowercase());
        } else if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Builds the configured embedder on first use and hands out the same handle afterwards
pub struct EmbeddingProvider {
    config: EmbeddingConfig,
    request_timeout: Duration,
    embedder: OnceLock<Arc<dyn Embedder>>,
}

impl EmbeddingProvider {
    pub fn new(config: EmbeddingConfig, request_timeout: Duration) -> Self {
        Self {
            config,
            request_timeout,
            embedder: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    pub fn get(&self) -> Result<Arc<dyn Embedder>> {
        if let Some(embedder) = self.embedder.get() {
            return Ok(embedder.clone());
        }

        let built: Arc<dyn Embedder> = if self.config.is_local() {
            Arc::new(HashEmbedder::new(self.config.dimension))
        } else {
            Arc::new(HttpEmbedder::new(&self.config, self.request_timeout)?)
        };
        tracing::debug!(
            model = %built.model_id(),
            dimension = built.dimension(),
            "embedder initialized"
        );

        // A concurrent caller may have won the race; keep whichever landed first
        let _ = self.embedder.set(built.clone());
        Ok(self.embedder.get().cloned().unwrap_or(built))
    }
}

/// Cosine similarity, 0.0 for mismatched lengths or zero vectors
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_mixed_script() {
        assert_eq!(
            tokenize("什么是Garbled Circuit？"),
            vec!["什", "么", "是", "garbled", "circuit"]
        );
    }

    #[test]
    fn test_tokenize_splits_punctuation() {
        assert_eq!(tokenize("two-party, OT."), vec!["two", "party", "ot"]);
    }

    #[test]
    fn test_embedding_is_normalized_and_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("secure two-party computation");
        let b = embedder.embed("secure two-party computation");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(16);
        assert!(embedder.embed("  ... ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_shared_words_score_higher() {
        let embedder = HashEmbedder::new(512);
        let doc = embedder.embed("Garbled circuits enable secure two-party computation.");
        let related = embedder.embed("secure computation");
        let unrelated = embedder.embed("tropical fruit harvest");
        assert!(cosine_similarity(&doc, &related) > cosine_similarity(&doc, &unrelated));
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_provider_memoizes_embedder() {
        let provider = EmbeddingProvider::new(EmbeddingConfig::default(), Duration::from_secs(5));
        let first = provider.get().unwrap();
        let second = provider.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.dimension(), 384);
    }

    #[test]
    fn test_provider_remote_without_endpoint_fails() {
        let config = EmbeddingConfig {
            model: "bge-m3".to_string(),
            dimension: 1024,
            base_url: None,
            api_key: None,
        };
        let provider = EmbeddingProvider::new(config, Duration::from_secs(5));
        assert!(provider.get().err().unwrap().is_configuration());
    }
}
