//! Anthropic Messages API client.

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use super::transformers;
use crate::config::ProviderConfig;
use crate::error::LlmError;
use crate::providers::{http, pricing, require_api_key, resolve_model, validate_required};
use crate::streaming::{TypedEventDecoder, normalize_sse};
use crate::traits::{ChunkStream, ProviderClient};
use crate::types::{Capabilities, ChatMessage, Completion, CompletionOptions, Usage};

pub const PROVIDER_ID: &str = "anthropic";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

pub fn default_config() -> ProviderConfig {
    ProviderConfig::new(DEFAULT_BASE_URL, DEFAULT_MODEL).with_api_version(DEFAULT_API_VERSION)
}

pub fn default_capabilities() -> Capabilities {
    Capabilities::new()
        .with_streaming()
        .with_function_calling()
        .with_vision()
        .with_max_context_length(200_000)
        .with_formats(["text", "image", "pdf"])
}

#[derive(Clone)]
pub struct AnthropicClient {
    config: ProviderConfig,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.config.base_url)
            .field("default_model", &self.config.default_model)
            .field("has_api_key", &self.config.has_api_key())
            .finish()
    }
}

impl AnthropicClient {
    pub fn new(config: ProviderConfig, http_client: reqwest::Client) -> Self {
        Self { config, http_client }
    }

    fn headers(&self) -> Result<HeaderMap, LlmError> {
        let key = require_api_key(PROVIDER_ID, &self.config)?;
        let mut headers = http::json_headers();
        http::insert_header(&mut headers, "x-api-key", key)?;
        http::insert_header(
            &mut headers,
            "anthropic-version",
            self.config.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION),
        )?;
        Ok(headers)
    }

    async fn fetch_models(&self, deadline: std::time::Duration) -> Result<Vec<String>, LlmError> {
        let headers = self.headers()?;
        let url = self.config.endpoint("models");
        let value = http::get_json(&self.http_client, PROVIDER_ID, &url, headers, deadline).await?;
        transformers::parse_model_list(value)
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn capabilities(&self) -> Capabilities {
        default_capabilities()
    }

    fn is_configured(&self) -> bool {
        self.config.has_api_key()
    }

    fn validate(&self) -> Result<(), LlmError> {
        validate_required(PROVIDER_ID, &self.config)
    }

    async fn list_models(&self) -> Vec<String> {
        self.fetch_models(self.config.timeout()).await.unwrap_or_else(|e| {
            tracing::debug!(provider = PROVIDER_ID, error = %e, "model listing unavailable");
            Vec::new()
        })
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        let headers = self.headers()?;
        let model = resolve_model(&self.config, options);
        let body = transformers::build_messages_body(&model, messages, options, false)?;
        let url = self.config.endpoint("messages");
        let value = http::post_json(&self.http_client, PROVIDER_ID, &url, headers, &body, self.config.timeout()).await?;
        let mut completion = transformers::parse_messages_response(value)?;
        if completion.usage.is_none() {
            completion.usage = Some(self.estimate_usage(messages, &completion.text));
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
        let body = transformers::build_messages_body(&model, &messages, &options, true)?;
        let url = self.config.endpoint("messages");
        let bytes = http::post_stream(&self.http_client, PROVIDER_ID, &url, headers, &body, self.config.timeout()).await?;
        Ok(normalize_sse(bytes, TypedEventDecoder::new()))
    }

    async fn test_connection(&self) -> Result<(), LlmError> {
        self.fetch_models(self.config.probe_timeout()).await.map(|_| ())
    }

    fn cost(&self, model: &str, usage: &Usage) -> f64 {
        pricing::cost_for(PROVIDER_ID, model, usage)
    }

    fn history_window(&self) -> Option<usize> {
        Some(40)
    }
}
