//! HTTP completion and embedding clients for KBQA
//!
//! This crate provides the OpenAI-compatible implementations of the
//! `CompletionService` and `Embedder` traits.

mod client;
mod config;
mod embeddings;

#[cfg(test)]
mod tests;

pub use client::ChatClient;
pub use config::{parse_var, EmbeddingConfig, LlmConfig, LOCAL_HASH_MODEL};
pub use embeddings::HttpEmbedder;

// Re-export core types for convenience
pub use kbqa_core::{CompletionService, Embedder, Error, GenerationConfig, GenerationResult, Result};
