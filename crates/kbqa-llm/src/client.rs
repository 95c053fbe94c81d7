//! OpenAI-compatible chat completion client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;

use kbqa_core::{CompletionService, Error, GenerationConfig, GenerationResult, Result};

use crate::config::LlmConfig;

/// Chat completion client for DeepSeek and other OpenAI-compatible endpoints
pub struct ChatClient {
    config: LlmConfig,
    generation: GenerationConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage {
    pub(crate) role: String,
    pub(crate) content: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    pub(crate) model: String,
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) temperature: f32,
    pub(crate) max_tokens: u32,
    pub(crate) top_p: f32,
    pub(crate) frequency_penalty: f32,
    pub(crate) presence_penalty: f32,
    pub(crate) stream: bool,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

impl ChatClient {
    /// Create a new chat client from configuration
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::Configuration("API key must not be empty".to_string()));
        }
        if config.base_url.trim().is_empty() {
            return Err(Error::Configuration("Base URL must not be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout() + Duration::from_secs(5))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        let generation = GenerationConfig {
            model_id: config.model.clone(),
            timeout: config.timeout(),
            ..Default::default()
        };

        Ok(Self {
            config,
            generation,
            client,
        })
    }

    /// Create a new chat client from environment variables
    pub fn from_env() -> Result<Self> {
        let config = LlmConfig::from_env()?;
        Self::new(config)
    }

    /// Set the model to use for generation
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.generation.model_id = model_id.into();
        self
    }

    /// Replace the sampling settings used by `complete`
    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation
    }

    /// Generate with explicit settings, bounded by `config.timeout`
    pub async fn generate_with_config(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationResult> {
        let generation_future = self.perform_generation(prompt, config);

        match timeout(config.timeout, generation_future).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "Chat completion exceeded {:?}",
                config.timeout
            ))),
        }
    }

    pub(crate) fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    pub(crate) fn build_request(prompt: &str, config: &GenerationConfig) -> ChatRequest {
        ChatRequest {
            model: config.model_id.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            frequency_penalty: config.frequency_penalty,
            presence_penalty: config.presence_penalty,
            stream: false,
        }
    }

    /// Perform the actual generation request
    async fn perform_generation(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationResult> {
        let request_body = Self::build_request(prompt, config);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Configuration(format!(
                "Chat endpoint rejected the credentials with status {}",
                status
            )));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::LlmProvider(format!(
                "Chat request failed with status {}: {}",
                status, error_text
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(e.to_string()))?;

        let text = parse_choice_text(body.choices)?;
        tracing::debug!(
            model = %config.model_id,
            chars = text.chars().count(),
            "chat completion received"
        );

        Ok(GenerationResult {
            text,
            model_id: config.model_id.clone(),
            tokens_used: body.usage.and_then(|u| u.total_tokens),
        })
    }
}

fn parse_choice_text(choices: Vec<Choice>) -> Result<String> {
    choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| Error::LlmProvider("Chat response contained no choices".to_string()))
}

#[async_trait]
impl CompletionService for ChatClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let result = self.generate_with_config(prompt, &self.generation).await?;
        Ok(result.text)
    }

    fn model_id(&self) -> &str {
        &self.generation.model_id
    }
}
