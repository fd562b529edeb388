//! Gemini `generateContent` client.

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use super::transformers;
use crate::config::ProviderConfig;
use crate::error::LlmError;
use crate::providers::{http, pricing, require_api_key, resolve_model, validate_required};
use crate::streaming::{JsonArrayDecoder, normalize_byte_stream};
use crate::traits::{ChunkStream, ProviderClient};
use crate::types::{Capabilities, ChatMessage, Completion, CompletionOptions, Usage};

pub const PROVIDER_ID: &str = "gemini";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

pub fn default_config() -> ProviderConfig {
    ProviderConfig::new(DEFAULT_BASE_URL, DEFAULT_MODEL)
}

pub fn default_capabilities() -> Capabilities {
    Capabilities::new()
        .with_streaming()
        .with_function_calling()
        .with_vision()
        .with_max_context_length(1_048_576)
        .with_formats(["text", "image", "audio", "video", "pdf"])
}

#[derive(Clone)]
pub struct GeminiClient {
    config: ProviderConfig,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.config.base_url)
            .field("default_model", &self.config.default_model)
            .field("has_api_key", &self.config.has_api_key())
            .finish()
    }
}

impl GeminiClient {
    pub fn new(config: ProviderConfig, http_client: reqwest::Client) -> Self {
        Self { config, http_client }
    }

    fn headers(&self) -> Result<HeaderMap, LlmError> {
        let key = require_api_key(PROVIDER_ID, &self.config)?;
        let mut headers = http::json_headers();
        http::insert_header(&mut headers, "x-goog-api-key", key)?;
        Ok(headers)
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        self.config.endpoint(&format!("models/{model}:{method}"))
    }

    async fn fetch_models(&self, deadline: std::time::Duration) -> Result<Vec<String>, LlmError> {
        let headers = self.headers()?;
        let url = self.config.endpoint("models");
        let value = http::get_json(&self.http_client, PROVIDER_ID, &url, headers, deadline).await?;
        transformers::parse_model_list(value)
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
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
        let body = transformers::build_generate_body(messages, options)?;
        let url = self.model_url(&model, "generateContent");
        let value = http::post_json(&self.http_client, PROVIDER_ID, &url, headers, &body, self.config.timeout()).await?;
        let mut completion = transformers::parse_generate_response(value)?;
        if completion.usage.is_none() {
            completion.usage = Some(self.estimate_usage(messages, &completion.text));
        }
        completion.model.get_or_insert(model);
        Ok(completion)
    }

    /// `streamGenerateContent` without `alt=sse` returns one JSON array that
    /// grows element by element.
    async fn complete_streaming(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<ChunkStream, LlmError> {
        let headers = self.headers()?;
        let model = resolve_model(&self.config, &options);
        let body = transformers::build_generate_body(&messages, &options)?;
        let url = self.model_url(&model, "streamGenerateContent");
        let bytes = http::post_stream(&self.http_client, PROVIDER_ID, &url, headers, &body, self.config.timeout()).await?;
        Ok(normalize_byte_stream(
            bytes,
            JsonArrayDecoder::new("gemini-array", transformers::map_stream_element),
        ))
    }

    async fn test_connection(&self) -> Result<(), LlmError> {
        self.fetch_models(self.config.probe_timeout()).await.map(|_| ())
    }

    fn cost(&self, model: &str, usage: &Usage) -> f64 {
        pricing::cost_for(PROVIDER_ID, model, usage)
    }

    fn history_window(&self) -> Option<usize> {
        Some(60)
    }
}
