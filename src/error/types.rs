//! Core error types
//!
//! `LlmError` is the single closed error enumeration returned by every public
//! operation. Callers are expected to match on it (or on [`ErrorCategory`])
//! because the orchestrator and the UI react differently to each kind.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed error enumeration for the orchestration core.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Missing or invalid configuration. Never retried.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A hosted provider was asked to do work without a credential.
    #[error("Missing API key for provider '{0}'")]
    MissingCredential(String),

    /// A selection referenced a provider id that was never registered.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Selection criteria matched zero candidates. Terminal.
    #[error("No route: {0}")]
    NoRoute(String),

    /// Upstream rejected the credential (HTTP 401).
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Upstream does not know the requested model (HTTP 404).
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Upstream rate limit (HTTP 429).
    #[error("Rate limit exceeded: {0}")]
    RateLimitError(String),

    /// Any other non-success upstream status.
    #[error("API error {code}: {message}")]
    ApiError {
        code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Deadline exceeded.
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// Could not reach the upstream host.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Generic transport failure.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// A single malformed stream record.
    #[error("Stream parse error: {0}")]
    StreamParseError(String),

    /// A malformed non-streaming response body.
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Coarse classification of an [`LlmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    Routing,
    Authentication,
    NotFound,
    RateLimit,
    Client,
    Server,
    Timeout,
    Network,
    Parsing,
    Internal,
}

impl LlmError {
    /// Build an upstream error from a status code, mapping the well-known
    /// statuses onto their dedicated variants.
    pub fn api_error(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            401 => Self::AuthenticationError(message),
            404 => Self::ModelNotFound(message),
            429 => Self::RateLimitError(message),
            _ => Self::ApiError {
                code,
                message,
                details: None,
            },
        }
    }

    pub fn api_error_with_details(
        code: u16,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        match Self::api_error(code, message) {
            Self::ApiError { code, message, .. } => Self::ApiError {
                code,
                message,
                details: Some(details),
            },
            other => other,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigurationError(_) | Self::MissingCredential(_) => {
                ErrorCategory::Configuration
            }
            Self::UnknownProvider(_) | Self::NoRoute(_) => ErrorCategory::Routing,
            Self::AuthenticationError(_) => ErrorCategory::Authentication,
            Self::ModelNotFound(_) => ErrorCategory::NotFound,
            Self::RateLimitError(_) => ErrorCategory::RateLimit,
            Self::ApiError { code, .. } if *code >= 500 => ErrorCategory::Server,
            Self::ApiError { .. } => ErrorCategory::Client,
            Self::TimeoutError(_) => ErrorCategory::Timeout,
            Self::ConnectionError(_) | Self::HttpError(_) => ErrorCategory::Network,
            Self::StreamParseError(_) | Self::ParseError(_) => ErrorCategory::Parsing,
            Self::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// HTTP status carried by upstream errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::AuthenticationError(_) => Some(401),
            Self::ModelNotFound(_) => Some(404),
            Self::RateLimitError(_) => Some(429),
            Self::ApiError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Only timeouts and network-class failures are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Timeout | ErrorCategory::Network
        )
    }

    /// Errors produced before any work is queued: bad configuration and
    /// failed routing.
    pub fn is_terminal_before_dispatch(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Configuration | ErrorCategory::Routing
        )
    }
}
