//! `OpenAI` Client Implementation
//!
//! Chat Completions client. Also serves any backend exposing the same
//! `/chat/completions` + `/models` surface (see [`crate::providers::deepseek`]).

use async_trait::async_trait;

use super::{streaming, transformers};
use crate::config::ProviderConfig;
use crate::error::LlmError;
use crate::providers::{http, pricing, require_api_key, resolve_model, validate_required, with_system_prompt};
use crate::streaming::normalize_sse;
use crate::traits::{ChunkStream, ProviderClient};
use crate::types::{Capabilities, ChatMessage, Completion, CompletionOptions, Usage};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub fn default_config() -> ProviderConfig {
    ProviderConfig::new(DEFAULT_BASE_URL, DEFAULT_MODEL)
}

pub fn default_capabilities() -> Capabilities {
    Capabilities::new()
        .with_streaming()
        .with_function_calling()
        .with_vision()
        .with_max_context_length(128_000)
        .with_formats(["text", "image"])
}

#[derive(Clone)]
pub struct OpenAiClient {
    provider_id: String,
    config: ProviderConfig,
    capabilities: Capabilities,
    history_window: usize,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("provider_id", &self.provider_id)
            .field("base_url", &self.config.base_url)
            .field("default_model", &self.config.default_model)
            .field("has_api_key", &self.config.has_api_key())
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(config: ProviderConfig, http_client: reqwest::Client) -> Self {
        Self {
            provider_id: "openai".to_string(),
            config,
            capabilities: default_capabilities(),
            history_window: 40,
            http_client,
        }
    }

    /// Rebind this client to another registry id (OpenAI-compatible vendors).
    pub fn with_provider_id(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = provider_id.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn headers(&self) -> Result<reqwest::header::HeaderMap, LlmError> {
        http::bearer_headers(require_api_key(&self.provider_id, &self.config)?)
    }

    async fn fetch_models(&self, deadline: std::time::Duration) -> Result<Vec<String>, LlmError> {
        let headers = self.headers()?;
        let url = self.config.endpoint("models");
        let value = http::get_json(&self.http_client, &self.provider_id, &url, headers, deadline).await?;
        transformers::parse_model_list(value)
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn is_configured(&self) -> bool {
        self.config.has_api_key()
    }

    fn validate(&self) -> Result<(), LlmError> {
        validate_required(&self.provider_id, &self.config)
    }

    async fn list_models(&self) -> Vec<String> {
        match self.fetch_models(self.config.timeout()).await {
            Ok(models) => models,
            Err(e) => {
                tracing::debug!(provider = %self.provider_id, error = %e, "model listing unavailable");
                Vec::new()
            }
        }
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        let headers = self.headers()?;
        let model = resolve_model(&self.config, options);
        let messages = with_system_prompt(messages, options);
        let body = transformers::build_chat_body(&model, &messages, options, false)?;
        let url = self.config.endpoint("chat/completions");
        let value = http::post_json(&self.http_client, &self.provider_id, &url, headers, &body, self.config.timeout()).await?;
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
        let headers = self.headers()?;
        let model = resolve_model(&self.config, &options);
        let messages = with_system_prompt(&messages, &options);
        let body = transformers::build_chat_body(&model, &messages, &options, true)?;
        let url = self.config.endpoint("chat/completions");
        let bytes = http::post_stream(&self.http_client, &self.provider_id, &url, headers, &body, self.config.timeout()).await?;
        Ok(normalize_sse(bytes, streaming::decoder()))
    }

    async fn test_connection(&self) -> Result<(), LlmError> {
        self.fetch_models(self.config.probe_timeout()).await.map(|_| ())
    }

    fn cost(&self, model: &str, usage: &Usage) -> f64 {
        pricing::cost_for(&self.provider_id, model, usage)
    }

    fn history_window(&self) -> Option<usize> {
        Some(self.history_window)
    }
}
