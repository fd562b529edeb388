//! Provider clients
//!
//! One module per backend, each implementing [`crate::traits::ProviderClient`]
//! directly. `deepseek` reuses the OpenAI client against its compatible API.

pub mod http;
pub mod pricing;

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "openai")]
pub mod deepseek;
#[cfg(feature = "google")]
pub mod gemini;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

use crate::config::ProviderConfig;
use crate::error::LlmError;
use crate::types::{ChatMessage, CompletionOptions, MessageRole};

/// Required-field check shared by every client's `validate`.
pub(crate) fn validate_required(provider_id: &str, config: &ProviderConfig) -> Result<(), LlmError> {
    if config.base_url.trim().is_empty() {
        return Err(LlmError::ConfigurationError(format!(
            "{provider_id}: base_url is required"
        )));
    }
    if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
        return Err(LlmError::ConfigurationError(format!(
            "{provider_id}: base_url must be an http(s) URL, got '{}'",
            config.base_url
        )));
    }
    if config.default_model.trim().is_empty() {
        return Err(LlmError::ConfigurationError(format!(
            "{provider_id}: default_model is required"
        )));
    }
    Ok(())
}

/// Credential for hosted backends, or `MissingCredential` before any I/O.
pub(crate) fn require_api_key<'a>(provider_id: &str, config: &'a ProviderConfig) -> Result<&'a str, LlmError> {
    config
        .api_key()
        .ok_or_else(|| LlmError::MissingCredential(provider_id.to_string()))
}

pub(crate) fn resolve_model(config: &ProviderConfig, options: &CompletionOptions) -> String {
    options
        .model
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(&config.default_model)
        .to_string()
}

/// Messages with `options.system` prepended as a system turn, for backends
/// that take the system prompt inline.
pub(crate) fn with_system_prompt(messages: &[ChatMessage], options: &CompletionOptions) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = options.system.as_deref().filter(|s| !s.is_empty()) {
        out.push(ChatMessage::system(system));
    }
    out.extend_from_slice(messages);
    out
}

/// Split system turns out for backends with a dedicated system field.
/// `options.system` comes first, followed by any inline system messages.
pub(crate) fn split_system<'a>(
    messages: &'a [ChatMessage],
    options: &CompletionOptions,
) -> (Option<String>, Vec<&'a ChatMessage>) {
    let mut system: Vec<&str> = options.system.as_deref().filter(|s| !s.is_empty()).into_iter().collect();
    let mut rest = Vec::with_capacity(messages.len());
    for m in messages {
        if m.role == MessageRole::System {
            system.push(&m.content);
        } else {
            rest.push(m);
        }
    }
    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, rest)
}
