//! User-facing error helpers and upstream HTTP classification.

use reqwest::header::HeaderMap;

use super::types::{ErrorCategory, LlmError};

impl LlmError {
    /// Short human-readable message suitable for a notification toast.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingCredential(provider) => {
                format!("No API key configured for {provider}")
            }
            Self::ConfigurationError(msg) => format!("Configuration problem: {msg}"),
            Self::UnknownProvider(provider) => format!("Unknown provider '{provider}'"),
            Self::NoRoute(_) => {
                "No configured provider can handle this request".to_string()
            }
            Self::AuthenticationError(_) => "Invalid API key".to_string(),
            Self::ModelNotFound(_) => "Model not found".to_string(),
            Self::RateLimitError(_) => "Rate limit exceeded, try again later".to_string(),
            Self::ApiError { code, .. } if *code >= 500 => {
                format!("Provider service error ({code}), try again later")
            }
            Self::ApiError { code, message, .. } => format!("Request rejected ({code}): {message}"),
            Self::TimeoutError(_) => "Request timed out".to_string(),
            Self::ConnectionError(_) | Self::HttpError(_) => {
                "Network error, check your connection".to_string()
            }
            Self::StreamParseError(_) | Self::ParseError(_) => {
                "Received an unreadable response from the provider".to_string()
            }
            Self::InternalError(_) => "Internal error".to_string(),
        }
    }

    /// Stable machine-readable kind used in notification events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigurationError(_) => "configuration",
            Self::MissingCredential(_) => "missing_credential",
            Self::UnknownProvider(_) => "unknown_provider",
            Self::NoRoute(_) => "no_route",
            Self::AuthenticationError(_) => "invalid_credential",
            Self::ModelNotFound(_) => "model_not_found",
            Self::RateLimitError(_) => "rate_limited",
            Self::ApiError { .. } => "upstream_http",
            Self::TimeoutError(_) => "timeout",
            Self::ConnectionError(_) | Self::HttpError(_) => "network",
            Self::StreamParseError(_) => "stream_parse",
            Self::ParseError(_) => "parse",
            Self::InternalError(_) => "internal",
        }
    }
}

/// Pull the vendor's error message out of a JSON error body.
///
/// Handles `{"error": {"message": ..}}` (OpenAI, Anthropic, Gemini) and
/// `{"error": "..."}` (Ollama).
pub fn extract_upstream_message(body_text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body_text).ok()?;
    let error = value.get("error")?;
    if let Some(msg) = error.get("message").and_then(|m| m.as_str()) {
        return Some(msg.to_string());
    }
    error.as_str().map(str::to_string)
}

/// Classify a non-success upstream response.
pub fn classify_http_error(
    provider_id: &str,
    status: u16,
    body_text: &str,
    headers: &HeaderMap,
) -> LlmError {
    let message = extract_upstream_message(body_text)
        .unwrap_or_else(|| body_text.chars().take(200).collect::<String>());

    match status {
        429 => {
            let retry_after = headers
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            LlmError::RateLimitError(format!(
                "provider={provider_id} retry_after={retry_after} {message}"
            ))
        }
        401 => LlmError::AuthenticationError(format!("provider={provider_id} {message}")),
        404 => LlmError::ModelNotFound(format!("provider={provider_id} {message}")),
        _ => {
            let details = serde_json::from_str::<serde_json::Value>(body_text).ok();
            LlmError::ApiError {
                code: status,
                message: format!("provider={provider_id} {message}"),
                details,
            }
        }
    }
}

/// Whether errors of this category should count against provider health.
pub fn affects_health(err: &LlmError) -> bool {
    !matches!(
        err.category(),
        ErrorCategory::Routing | ErrorCategory::Parsing
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_statuses_and_extracts_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        let err = classify_http_error("openai", 401, body, &HeaderMap::new());
        match &err {
            LlmError::AuthenticationError(msg) => {
                assert!(msg.contains("Incorrect API key provided"))
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(err.user_message(), "Invalid API key");

        let mut headers = HeaderMap::new();
        headers.insert("retry-after", "12".parse().unwrap());
        let err = classify_http_error("anthropic", 429, "{}", &headers);
        match err {
            LlmError::RateLimitError(msg) => assert!(msg.contains("retry_after=12")),
            other => panic!("unexpected: {other:?}"),
        }

        let err = classify_http_error("ollama", 404, r#"{"error":"model 'x' not found"}"#, &HeaderMap::new());
        match err {
            LlmError::ModelNotFound(msg) => assert!(msg.contains("model 'x' not found")),
            other => panic!("unexpected: {other:?}"),
        }

        let err = classify_http_error("gemini", 500, "oops", &HeaderMap::new());
        assert_eq!(err.status_code(), Some(500));
    }

    #[test]
    fn user_messages_are_distinct_per_kind() {
        let msgs = [
            LlmError::api_error(401, "").user_message(),
            LlmError::api_error(404, "").user_message(),
            LlmError::api_error(429, "").user_message(),
            LlmError::TimeoutError(String::new()).user_message(),
            LlmError::NoRoute(String::new()).user_message(),
        ];
        for (i, a) in msgs.iter().enumerate() {
            for b in msgs.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
        assert_eq!(
            LlmError::api_error(429, "").user_message(),
            "Rate limit exceeded, try again later"
        );
    }
}
