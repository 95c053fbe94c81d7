//! Client configuration loaded from the environment

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use kbqa_core::{Error, Result};

/// Embedding model name that selects the built-in offline hash embedder
pub const LOCAL_HASH_MODEL: &str = "local-hash";

const DEFAULT_MODEL: &str = "deepseek-chat";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Configuration for the chat completion client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Create configuration from environment variables (and `.env`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = first_set(&lookup, &["KBQA_API_KEY", "DEEPSEEK_API_KEY"]).ok_or_else(|| {
            Error::Configuration(
                "KBQA_API_KEY or DEEPSEEK_API_KEY environment variable not found".to_string(),
            )
        })?;

        let base_url =
            first_set(&lookup, &["KBQA_BASE_URL", "DEEPSEEK_BASE_URL"]).ok_or_else(|| {
                Error::Configuration(
                    "KBQA_BASE_URL or DEEPSEEK_BASE_URL environment variable not found"
                        .to_string(),
                )
            })?;

        let model = first_set(&lookup, &["KBQA_MODEL", "DEEPSEEK_MODEL", "LLM_MODEL"])
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let timeout_secs =
            parse_var(&lookup, "KBQA_LLM_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            api_key,
            base_url,
            model,
            timeout_secs,
        })
    }

    /// Create configuration with explicit values
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which embedding function backs the vector index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: LOCAL_HASH_MODEL.to_string(),
            dimension: DEFAULT_EMBEDDING_DIM,
            base_url: None,
            api_key: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Remote models fall back to the chat endpoint credentials when no
    /// embedding-specific ones are set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let model = first_set(&lookup, &["EMBEDDING_MODEL"])
            .unwrap_or_else(|| LOCAL_HASH_MODEL.to_string());
        let dimension = parse_var(&lookup, "EMBEDDING_DIM")?.unwrap_or(DEFAULT_EMBEDDING_DIM);
        if dimension == 0 {
            return Err(Error::Configuration(
                "EMBEDDING_DIM must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            model,
            dimension,
            base_url: first_set(
                &lookup,
                &["EMBEDDING_BASE_URL", "KBQA_BASE_URL", "DEEPSEEK_BASE_URL"],
            ),
            api_key: first_set(&lookup, &["EMBEDDING_API_KEY", "KBQA_API_KEY", "DEEPSEEK_API_KEY"]),
        })
    }

    pub fn is_local(&self) -> bool {
        self.model == LOCAL_HASH_MODEL
    }
}

fn first_set(lookup: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| lookup(*key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Parse an optional numeric variable; a present but malformed value is a configuration error
pub fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match first_set(lookup, &[key]) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            Error::Configuration(format!("{} has an invalid value: {}", key, raw))
        }),
    }
}
