//! Ollama local server client.

use async_trait::async_trait;

use super::transformers;
use crate::config::ProviderConfig;
use crate::error::LlmError;
use crate::providers::{http, resolve_model, validate_required, with_system_prompt};
use crate::streaming::{JsonLineDecoder, normalize_ndjson};
use crate::traits::{ChunkStream, ProviderClient};
use crate::types::{Capabilities, ChatMessage, Completion, CompletionOptions};

pub const PROVIDER_ID: &str = "ollama";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2";

pub fn default_config() -> ProviderConfig {
    ProviderConfig::new(DEFAULT_BASE_URL, DEFAULT_MODEL)
}

pub fn default_capabilities() -> Capabilities {
    Capabilities::new()
        .with_streaming()
        .with_max_context_length(8_192)
        .with_formats(["text"])
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: ProviderConfig,
    http_client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: ProviderConfig, http_client: reqwest::Client) -> Self {
        Self { config, http_client }
    }

    /// Local servers need no credential; a key, if set, is sent as bearer
    /// for reverse proxies.
    fn headers(&self) -> Result<reqwest::header::HeaderMap, LlmError> {
        match self.config.api_key() {
            Some(key) => http::bearer_headers(key),
            None => Ok(http::json_headers()),
        }
    }

    async fn fetch_tags(&self, deadline: std::time::Duration) -> Result<Vec<String>, LlmError> {
        let url = self.config.endpoint("api/tags");
        let value = http::get_json(&self.http_client, PROVIDER_ID, &url, self.headers()?, deadline).await?;
        transformers::parse_tags(value)
    }
}

#[async_trait]
impl ProviderClient for OllamaClient {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn capabilities(&self) -> Capabilities {
        default_capabilities()
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn validate(&self) -> Result<(), LlmError> {
        validate_required(PROVIDER_ID, &self.config)
    }

    async fn list_models(&self) -> Vec<String> {
        self.fetch_tags(self.config.timeout()).await.unwrap_or_else(|e| {
            tracing::debug!(provider = PROVIDER_ID, error = %e, "model listing unavailable");
            Vec::new()
        })
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        let model = resolve_model(&self.config, options);
        let messages = with_system_prompt(messages, options);
        let body = transformers::build_chat_body(&model, &messages, options, false)?;
        let url = self.config.endpoint("api/chat");
        let value = http::post_json(&self.http_client, PROVIDER_ID, &url, self.headers()?, &body, self.config.timeout()).await?;
        let mut completion = transformers::parse_chat_response(value)?;
        if completion.usage.is_none() {
            completion.usage = Some(self.estimate_usage(&messages, &completion.text));
        }
        completion.model.get_or_insert(model);
        Ok(completion)
    }

    async fn complete_streaming(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<ChunkStream, LlmError> {
        let model = resolve_model(&self.config, &options);
        let messages = with_system_prompt(&messages, &options);
        let body = transformers::build_chat_body(&model, &messages, &options, true)?;
        let url = self.config.endpoint("api/chat");
        let bytes = http::post_stream(&self.http_client, PROVIDER_ID, &url, self.headers()?, &body, self.config.timeout()).await?;
        Ok(normalize_ndjson(
            bytes,
            JsonLineDecoder::ndjson("ollama-ndjson", transformers::map_stream_record),
        ))
    }

    async fn test_connection(&self) -> Result<(), LlmError> {
        self.fetch_tags(self.config.probe_timeout()).await.map(|_| ())
    }

    fn history_window(&self) -> Option<usize> {
        Some(20)
    }
}
