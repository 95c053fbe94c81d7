//! Core traits and types for KBQA
//!
//! This crate defines the fundamental traits and types used across the KBQA system.
//! It provides capability-facing interfaces for completion services, embedders,
//! vector indexes and ingestors, making the answer engine test-friendly and extensible.

pub mod error;
pub mod ingest;
pub mod llm;
pub mod types;
pub mod vector_store;

pub use error::{Error, Result};
pub use ingest::{IngestConfig, Ingestor};
pub use llm::{CompletionService, GenerationConfig, GenerationResult};
pub use types::*;
pub use vector_store::{Embedder, VectorIndex};
