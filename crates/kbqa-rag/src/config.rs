//! Retrieval and answer-loop settings

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use kbqa_core::{Error, Result};
use kbqa_llm::parse_var;

use crate::answer_loop::AnswerOptions;
use crate::context::ContextBudget;

/// Which vector index implementation to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Local,
    Qdrant,
}

impl std::str::FromStr for VectorBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "qdrant" => Ok(Self::Qdrant),
            other => Err(Error::Configuration(format!(
                "Unknown vector backend '{}', expected 'local' or 'qdrant'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub backend: VectorBackend,
    pub store_path: PathBuf,
    pub qdrant_url: String,
    pub collection: String,
    pub top_k: usize,
    pub max_rounds: usize,
    pub max_context_chars: usize,
    pub snippet_chars: usize,
    pub call_timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Local,
            store_path: PathBuf::from("./kbqa_store.json"),
            qdrant_url: "http://localhost:6334".to_string(),
            collection: "rag_collection".to_string(),
            top_k: 3,
            max_rounds: 3,
            max_context_chars: 6000,
            snippet_chars: 1200,
            call_timeout_secs: 60,
        }
    }
}

impl RagConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend = match text("KBQA_VECTOR_BACKEND") {
            Some(raw) => raw.parse()?,
            None => defaults.backend,
        };

        Ok(Self {
            backend,
            store_path: text("KBQA_STORE_PATH").map(PathBuf::from).unwrap_or(defaults.store_path),
            qdrant_url: text("QDRANT_URL").unwrap_or(defaults.qdrant_url),
            collection: text("KBQA_COLLECTION").unwrap_or(defaults.collection),
            top_k: parse_var(&lookup, "KBQA_TOP_K")?.unwrap_or(defaults.top_k),
            max_rounds: parse_var(&lookup, "KBQA_MAX_ROUNDS")?.unwrap_or(defaults.max_rounds),
            max_context_chars: parse_var(&lookup, "KBQA_MAX_CONTEXT_CHARS")?
                .unwrap_or(defaults.max_context_chars),
            snippet_chars: parse_var(&lookup, "KBQA_SNIPPET_CHARS")?
                .unwrap_or(defaults.snippet_chars),
            call_timeout_secs: parse_var(&lookup, "KBQA_CALL_TIMEOUT_SECS")?
                .unwrap_or(defaults.call_timeout_secs),
        })
    }

    pub fn budget(&self) -> ContextBudget {
        ContextBudget {
            snippet_chars: self.snippet_chars,
            max_chars: self.max_context_chars,
        }
    }

    pub fn answer_options(&self) -> AnswerOptions {
        AnswerOptions {
            k: self.top_k,
            max_rounds: self.max_rounds,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}
