//! Messages API request/response mapping.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;
use crate::providers::split_system;
use crate::types::{ChatMessage, Completion, CompletionOptions, MessageRole, Usage};

/// The Messages API requires `max_tokens` on every request.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

pub fn build_messages_body(
    model: &str,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    stream: bool,
) -> Result<Value, LlmError> {
    let (system, turns) = split_system(messages, options);
    let body = MessagesRequest {
        model,
        max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages: turns
            .into_iter()
            .map(|m| WireMessage {
                role: if m.role == MessageRole::Assistant { "assistant" } else { "user" },
                content: &m.content,
            })
            .collect(),
        system,
        temperature: options.temperature,
        stream,
    };
    Ok(serde_json::to_value(body)?)
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<WireUsage>,
}

pub fn parse_messages_response(value: Value) -> Result<Completion, LlmError> {
    let body: MessagesResponse = serde_json::from_value(value)
        .map_err(|e| LlmError::ParseError(format!("unexpected messages response shape: {e}")))?;
    let text = body
        .content
        .iter()
        .filter(|b| b.kind == "text")
        .map(|b| b.text.as_str())
        .collect::<String>();
    Ok(Completion {
        text,
        model: body.model,
        usage: body.usage.map(|u| Usage::new(u.input_tokens, u.output_tokens)),
        finish_reason: body.stop_reason,
    })
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

pub fn parse_model_list(value: Value) -> Result<Vec<String>, LlmError> {
    let list: ModelList = serde_json::from_value(value)?;
    Ok(list.data.into_iter().map(|m| m.id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn system_turns_move_to_system_field() {
        let body = build_messages_body(
            "claude-3-5-haiku-latest",
            &[ChatMessage::system("terse"), ChatMessage::user("hi")],
            &CompletionOptions::default(),
            false,
        )
        .unwrap();
        assert_eq!(body["system"], json!("terse"));
        assert_eq!(body["max_tokens"], json!(4096));
        assert_eq!(body["messages"], json!([{"role": "user", "content": "hi"}]));
    }

    #[test]
    fn joins_text_blocks() {
        let c = parse_messages_response(json!({
            "model": "claude-3-5-haiku-latest",
            "content": [{"type": "text", "text": "Hel"}, {"type": "tool_use", "id": "t"}, {"type": "text", "text": "lo"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 2}
        }))
        .unwrap();
        assert_eq!(c.text, "Hello");
        assert_eq!(c.finish_reason.as_deref(), Some("end_turn"));
        assert_eq!(c.usage, Some(Usage::new(10, 2)));
    }
}
