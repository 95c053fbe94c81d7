//! Common types used across the KBQA system

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of leading content characters that take part in a [`RetrievalKey`]
pub const RETRIEVAL_KEY_PREFIX_CHARS: usize = 80;

/// A retrievable unit of source text plus its position in the source.
///
/// Chunks arrive from the ingestor already cleaned and filtered; nothing downstream
/// re-validates content quality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub source: String,
    pub page: Option<u32>,
    pub start_index: Option<usize>,
}

impl Chunk {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            page: None,
            start_index: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_start_index(mut self, start_index: usize) -> Self {
        self.start_index = Some(start_index);
        self
    }

    /// Hex md5 of the content bytes
    pub fn content_hash(&self) -> String {
        format!("{:x}", md5::compute(self.content.as_bytes()))
    }

    /// Deterministic id over `(source, page, start_index, content hash)`
    pub fn stable_id(&self) -> StableId {
        StableId(format!(
            "{}#p{}#s{}#{}",
            self.source,
            opt_to_string(self.page),
            opt_to_string(self.start_index),
            self.content_hash()
        ))
    }

    /// Dedup key used when merging alias query results
    pub fn retrieval_key(&self) -> RetrievalKey {
        RetrievalKey {
            source: self.source.clone(),
            page: self.page,
            start_index: self.start_index,
            content_prefix: self
                .content
                .chars()
                .take(RETRIEVAL_KEY_PREFIX_CHARS)
                .collect(),
        }
    }

    /// Page label for prompts and listings; empty when the source has no pages
    pub fn page_label(&self) -> String {
        opt_to_string(self.page)
    }
}

fn opt_to_string<T: fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Identifier of a stored chunk. Identical inputs always produce the same id,
/// which is what makes re-ingestion an idempotent upsert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(String);

impl StableId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for StableId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RetrievalKey {
    pub source: String,
    pub page: Option<u32>,
    pub start_index: Option<usize>,
    pub content_prefix: String,
}

/// One ranked result of a vector index search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// A record handed to [`crate::VectorIndex::upsert`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: StableId,
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Chunk {
        Chunk::new("Garbled circuits enable secure two-party computation.", "docs/gc.pdf")
            .with_page(3)
            .with_start_index(120)
    }

    #[test]
    fn test_stable_id_is_deterministic() {
        assert_eq!(sample().stable_id(), sample().stable_id());
    }

    #[test]
    fn test_stable_id_layout() {
        let chunk = sample();
        let id = chunk.stable_id();
        assert!(id.as_str().starts_with("docs/gc.pdf#p3#s120#"));
        assert!(id.as_str().ends_with(&chunk.content_hash()));
    }

    #[test]
    fn test_stable_id_snapshot() {
        insta::assert_snapshot!(
            sample().stable_id().to_string(),
            @"docs/gc.pdf#p3#s120#4edbc88ea75ccadae2b7fa0feda17b53"
        );
    }

    #[test]
    fn test_stable_id_empty_coordinates() {
        let chunk = Chunk::new("plain text chunk", "notes.txt");
        let id = chunk.stable_id();
        assert!(id.as_str().starts_with("notes.txt#p#s#"));
    }

    #[test]
    fn test_stable_id_changes_with_content() {
        let mut changed = sample();
        changed.content.push_str(" Updated.");
        assert_ne!(sample().stable_id(), changed.stable_id());
    }

    #[test]
    fn test_retrieval_key_uses_char_prefix() {
        let content: String = "混".repeat(100);
        let chunk = Chunk::new(content, "zh.pdf");
        let key = chunk.retrieval_key();
        assert_eq!(key.content_prefix.chars().count(), RETRIEVAL_KEY_PREFIX_CHARS);
    }

    #[test]
    fn test_retrieval_key_ignores_tail() {
        let head = "x".repeat(RETRIEVAL_KEY_PREFIX_CHARS);
        let a = Chunk::new(format!("{head} first tail"), "a.pdf").with_page(1);
        let b = Chunk::new(format!("{head} second tail"), "a.pdf").with_page(1);
        assert_eq!(a.retrieval_key(), b.retrieval_key());
        assert_ne!(a.stable_id(), b.stable_id());
    }
}
