//! `/api/chat` request/response mapping.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;
use crate::streaming::StreamDelta;
use crate::types::{ChatMessage, Completion, CompletionOptions, Usage};

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ModelOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ModelOptions>,
}

pub fn build_chat_body(
    model: &str,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    stream: bool,
) -> Result<Value, LlmError> {
    let model_options = (options.temperature.is_some() || options.max_tokens.is_some()).then(|| ModelOptions {
        temperature: options.temperature,
        num_predict: options.max_tokens,
    });
    let body = ChatRequest {
        model,
        messages: messages
            .iter()
            .map(|m| WireMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect(),
        stream,
        options: model_options,
    };
    Ok(serde_json::to_value(body)?)
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

/// Shared by the single response and every NDJSON stream record.
#[derive(Debug, Deserialize)]
struct ChatRecord {
    model: Option<String>,
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
    error: Option<String>,
}

impl ChatRecord {
    fn usage(&self) -> Option<Usage> {
        if self.prompt_eval_count.is_none() && self.eval_count.is_none() {
            return None;
        }
        Some(Usage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        ))
    }
}

pub fn parse_chat_response(value: Value) -> Result<Completion, LlmError> {
    let record: ChatRecord = serde_json::from_value(value)
        .map_err(|e| LlmError::ParseError(format!("unexpected ollama chat shape: {e}")))?;
    if let Some(error) = record.error {
        return Err(LlmError::api_error(500, error));
    }
    let usage = record.usage();
    Ok(Completion {
        text: record.message.map(|m| m.content).unwrap_or_default(),
        model: record.model,
        usage,
        finish_reason: record.done_reason,
    })
}

/// Map one NDJSON record. The final record has `done: true` and carries the
/// eval counters.
pub fn map_stream_record(value: &Value) -> Result<Option<StreamDelta>, LlmError> {
    let record: ChatRecord =
        serde_json::from_value(value.clone()).map_err(|e| LlmError::StreamParseError(e.to_string()))?;
    if let Some(error) = record.error {
        return Err(LlmError::api_error(500, error));
    }
    let usage = record.usage();
    let delta = StreamDelta {
        text: record.message.map(|m| m.content).unwrap_or_default(),
        usage,
        finish_reason: record.done_reason,
        done: record.done,
    };
    Ok((!delta.is_empty()).then_some(delta))
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    models: Vec<TagEntry>,
}

pub fn parse_tags(value: Value) -> Result<Vec<String>, LlmError> {
    let tags: TagList = serde_json::from_value(value)?;
    Ok(tags.models.into_iter().map(|m| m.name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn final_record_is_done_with_usage() {
        let d = map_stream_record(&json!({
            "model": "llama3.2", "message": {"role": "assistant", "content": ""},
            "done": true, "done_reason": "stop", "prompt_eval_count": 26, "eval_count": 9
        }))
        .unwrap()
        .unwrap();
        assert!(d.done);
        assert_eq!(d.usage, Some(Usage::new(26, 9)));
        assert_eq!(d.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn error_record_is_an_error() {
        assert!(map_stream_record(&json!({"error": "model 'x' not found"})).is_err());
    }

    #[test]
    fn options_only_when_set() {
        let body = build_chat_body("llama3.2", &[ChatMessage::user("hi")], &CompletionOptions::default(), true).unwrap();
        assert!(body.get("options").is_none());
        let body = build_chat_body(
            "llama3.2",
            &[ChatMessage::user("hi")],
            &CompletionOptions::default().with_max_tokens(10),
            false,
        )
        .unwrap();
        assert_eq!(body["options"]["num_predict"], json!(10));
    }
}
