//! Chat Completions SSE records.

use serde::Deserialize;
use serde_json::Value;

use super::transformers::WireUsage;
use crate::error::{LlmError, extract_upstream_message};
use crate::streaming::{JsonLineDecoder, StreamDelta};
use crate::types::Usage;

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<Delta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Map one `data:` record. The final usage-only record has an empty
/// `choices` array.
pub fn map_record(value: &Value) -> Result<Option<StreamDelta>, LlmError> {
    if value.get("error").is_some() {
        let message = extract_upstream_message(&value.to_string())
            .unwrap_or_else(|| "stream error".to_string());
        return Err(LlmError::api_error(500, message));
    }
    let event: StreamEvent = serde_json::from_value(value.clone())
        .map_err(|e| LlmError::StreamParseError(e.to_string()))?;
    let mut delta = StreamDelta {
        usage: event.usage.map(Usage::from),
        ..Default::default()
    };
    if let Some(choice) = event.choices.into_iter().next() {
        delta.text = choice.delta.and_then(|d| d.content).unwrap_or_default();
        delta.finish_reason = choice.finish_reason;
    }
    Ok((!delta.is_empty()).then_some(delta))
}

pub fn decoder() -> JsonLineDecoder {
    JsonLineDecoder::sse("openai-sse", "[DONE]", map_record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_content_finish_and_usage_records() {
        let d = map_record(&json!({"choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}))
            .unwrap()
            .unwrap();
        assert_eq!(d.text, "Hi");

        let d = map_record(&json!({"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}))
            .unwrap()
            .unwrap();
        assert_eq!(d.finish_reason.as_deref(), Some("stop"));

        let d = map_record(&json!({"choices":[],"usage":{"prompt_tokens":4,"completion_tokens":2,"total_tokens":6}}))
            .unwrap()
            .unwrap();
        assert_eq!(d.usage, Some(Usage::new(4, 2)));

        assert!(map_record(&json!({"choices":[{"delta":{"role":"assistant"}}]})).unwrap().is_none());
    }

    #[test]
    fn in_band_error_object_is_an_error() {
        let err = map_record(&json!({"error":{"message":"overloaded"}})).unwrap_err();
        assert!(matches!(err, LlmError::ApiError { code: 500, .. }));
    }
}
