//! Ollama chat API client
//!
//! Implements [`ModelBackend`] against a local or remote Ollama server using
//! the streaming `/api/chat` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Serialize;

use crate::llm::client::{LlmError, ModelBackend};
use crate::llm::streaming::{FragmentStream, decode_chat_stream};
use crate::llm::types::Message;

/// Default Ollama server address
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Environment variable Ollama itself uses for the server address
const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";

/// Configuration for the Ollama client
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    /// Whole-request deadline; `None` lets a generation run as long as it needs
    pub timeout: Option<Duration>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
        }
    }
}

impl OllamaConfig {
    /// Create a config for a specific server
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            ..Default::default()
        }
    }

    /// Use `OLLAMA_HOST` when set, otherwise `fallback`
    pub fn from_env_or(fallback: &str) -> Self {
        match std::env::var(OLLAMA_HOST_ENV) {
            Ok(host) if !host.trim().is_empty() => Self::with_base_url(host),
            _ => Self::with_base_url(fallback),
        }
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `0.0.0.0:11434` and `http://host:11434/` both become usable base URLs
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.config.base_url)
    }

    fn build_request<'a>(&self, model: &'a str, history: &'a [Message]) -> ChatRequest<'a> {
        ChatRequest {
            model,
            messages: history,
            stream: true,
        }
    }
}

#[async_trait]
impl ModelBackend for OllamaClient {
    async fn generate(&self, model: &str, history: &[Message]) -> Result<FragmentStream, LlmError> {
        debug!("generate: model={} messages={}", model, history.len());
        let body = self.build_request(model, history);

        let response = self.client.post(self.chat_url()).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(decode_chat_stream(response.bytes_stream()))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}
