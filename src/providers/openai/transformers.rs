//! Chat Completions request/response mapping.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;
use crate::types::{ChatMessage, Completion, CompletionOptions, Usage};

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

pub fn build_chat_body(
    model: &str,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    stream: bool,
) -> Result<Value, LlmError> {
    let body = ChatRequestBody {
        model,
        messages: messages
            .iter()
            .map(|m| WireMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect(),
        stream,
        stream_options: stream.then_some(StreamOptions { include_usage: true }),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
    };
    Ok(serde_json::to_value(body)?)
}

#[derive(Debug, Deserialize)]
pub(super) struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        let mut usage = Usage::new(u.prompt_tokens, u.completion_tokens);
        usage.total_tokens = usage.total_tokens.max(u.total_tokens);
        usage
    }
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ResponseChoice>,
    usage: Option<WireUsage>,
}

pub fn parse_chat_response(value: Value) -> Result<Completion, LlmError> {
    let body: ChatResponseBody = serde_json::from_value(value)
        .map_err(|e| LlmError::ParseError(format!("unexpected chat completion shape: {e}")))?;
    let Some(choice) = body.choices.into_iter().next() else {
        return Err(LlmError::ParseError("chat completion has no choices".to_string()));
    };
    Ok(Completion {
        text: choice.message.content.unwrap_or_default(),
        model: body.model,
        usage: body.usage.map(Usage::from),
        finish_reason: choice.finish_reason,
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
