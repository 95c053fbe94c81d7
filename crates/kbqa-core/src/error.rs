//! Error types for the KBQA engine

use thiserror::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the KBQA system
#[derive(Error, Debug)]
pub enum Error {
    /// Fatal at construction: missing credentials, embedding dimension mismatch.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Whether this error must abort startup instead of degrading an answer
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
