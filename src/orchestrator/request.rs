//! Request records and caller-side handles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::LlmError;
use crate::registry::SelectionRequirements;
use crate::types::{Capability, Completion, CompletionOptions, StreamChunk};

/// Per-request routing and sampling options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestOptions {
    /// Bare model id or `provider:model`.
    pub model: Option<String>,
    /// Pins the request to one provider. No substitution happens if it is
    /// unavailable.
    pub provider_id: Option<String>,
    pub streaming: bool,
    pub required_capabilities: Vec<Capability>,
    pub preferred_providers: Vec<String>,
    pub exclude_providers: Vec<String>,
    pub exclude_unhealthy: bool,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.required_capabilities.push(capability);
        self
    }

    pub fn with_preferred(mut self, provider_id: impl Into<String>) -> Self {
        self.preferred_providers.push(provider_id.into());
        self
    }

    pub fn with_excluded(mut self, provider_id: impl Into<String>) -> Self {
        self.exclude_providers.push(provider_id.into());
        self
    }

    pub fn excluding_unhealthy(mut self) -> Self {
        self.exclude_unhealthy = true;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub(crate) fn requirements(&self) -> SelectionRequirements {
        SelectionRequirements {
            capabilities: self.required_capabilities.clone(),
            preferred_providers: self.preferred_providers.clone(),
            exclude_providers: self.exclude_providers.clone(),
            exclude_unhealthy: self.exclude_unhealthy,
        }
    }

    pub(crate) fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            model: self.model.clone(),
            system: self.system.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub id: String,
    pub chat_id: String,
    pub message: String,
    pub options: RequestOptions,
    pub created_at: DateTime<Utc>,
    /// Dispatches made so far, retries included.
    pub attempts: u32,
}

impl Request {
    pub(crate) fn new(chat_id: impl Into<String>, message: impl Into<String>, options: RequestOptions) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.into(),
            message: message.into(),
            options,
            created_at: Utc::now(),
            attempts: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RequestState {
    Queued,
    Selecting,
    Executing { provider_id: String },
    Completed { provider_id: String },
    Failed { kind: String },
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Successful result of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub request_id: String,
    pub chat_id: String,
    pub provider_id: String,
    pub completion: Completion,
    pub elapsed_ms: u64,
    pub cost: f64,
}

/// Caller side of a submitted request.
///
/// Chunks arrive on a bounded channel; a caller that stops reading applies
/// backpressure to the provider stream. Non-streaming requests deliver one
/// finished chunk.
#[derive(Debug)]
pub struct RequestHandle {
    id: String,
    chunks: mpsc::Receiver<StreamChunk>,
    result: oneshot::Receiver<Result<RequestOutcome, LlmError>>,
}

impl RequestHandle {
    pub(crate) fn new(
        id: String,
        chunks: mpsc::Receiver<StreamChunk>,
        result: oneshot::Receiver<Result<RequestOutcome, LlmError>>,
    ) -> Self {
        Self { id, chunks, result }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next chunk, or `None` once the request has stopped producing.
    pub async fn next_chunk(&mut self) -> Option<StreamChunk> {
        self.chunks.recv().await
    }

    /// Drain remaining chunks and wait for the terminal result.
    pub async fn wait(mut self) -> Result<RequestOutcome, LlmError> {
        while self.chunks.recv().await.is_some() {}
        self.result
            .await
            .unwrap_or_else(|_| Err(LlmError::InternalError("request task ended without a result".into())))
    }

    /// Collect every chunk, then the terminal result.
    pub async fn collect(mut self) -> (Vec<StreamChunk>, Result<RequestOutcome, LlmError>) {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.chunks.recv().await {
            chunks.push(chunk);
        }
        let result = self
            .result
            .await
            .unwrap_or_else(|_| Err(LlmError::InternalError("request task ended without a result".into())));
        (chunks, result)
    }
}

/// Result of [`super::RequestOrchestrator::select_model`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSelection {
    pub provider_id: Option<String>,
    pub model: String,
}

impl ModelSelection {
    /// Split `provider:model` on the first colon when the prefix passes
    /// `is_provider`; otherwise the whole reference is a bare model id.
    pub fn parse(model_ref: &str, is_provider: impl Fn(&str) -> bool) -> Result<Self, LlmError> {
        let model_ref = model_ref.trim();
        if model_ref.is_empty() {
            return Err(LlmError::ConfigurationError("model reference is empty".into()));
        }
        if let Some((prefix, model)) = model_ref.split_once(':')
            && is_provider(prefix)
        {
            if model.is_empty() {
                return Err(LlmError::ConfigurationError(format!(
                    "model reference '{model_ref}' names no model"
                )));
            }
            return Ok(Self {
                provider_id: Some(prefix.to_string()),
                model: model.to_string(),
            });
        }
        Ok(Self {
            provider_id: None,
            model: model_ref.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_refs_split_only_on_known_providers() {
        let known = |p: &str| p == "openai" || p == "ollama";
        let sel = ModelSelection::parse("openai:gpt-4o", known).unwrap();
        assert_eq!(sel.provider_id.as_deref(), Some("openai"));
        assert_eq!(sel.model, "gpt-4o");

        let sel = ModelSelection::parse("llama3.2:latest", known).unwrap();
        assert_eq!(sel.provider_id, None);
        assert_eq!(sel.model, "llama3.2:latest");

        let sel = ModelSelection::parse("ollama:llama3.2:latest", known).unwrap();
        assert_eq!(sel.provider_id.as_deref(), Some("ollama"));
        assert_eq!(sel.model, "llama3.2:latest");

        assert!(ModelSelection::parse("  ", known).is_err());
        assert!(ModelSelection::parse("openai:", known).is_err());
    }

    #[test]
    fn options_map_to_requirements() {
        let opts = RequestOptions::new()
            .with_capability(Capability::Vision)
            .with_excluded("a")
            .excluding_unhealthy();
        let req = opts.requirements();
        assert_eq!(req.capabilities, vec![Capability::Vision]);
        assert_eq!(req.exclude_providers, vec!["a"]);
        assert!(req.exclude_unhealthy);
    }
}
