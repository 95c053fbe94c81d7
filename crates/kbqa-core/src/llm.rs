//! Completion service trait and generation types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Result;

/// Sampling and transport settings for a chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model_id: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_id: "deepseek-chat".to_string(),
            max_tokens: 2048,
            temperature: 1.0,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Result of a text generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    pub model_id: String,
    pub tokens_used: Option<u32>,
}

/// Text generation capability used by the answer loop.
///
/// The loop only ever needs prompt in, text out. Chat-style versus plain
/// completion backends are a detail of the implementing adapter.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Complete a prompt and return the generated text
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Get the model ID being used
    fn model_id(&self) -> &str;
}
