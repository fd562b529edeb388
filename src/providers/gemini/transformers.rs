//! `generateContent` request/response mapping.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LlmError, extract_upstream_message};
use crate::providers::split_system;
use crate::streaming::StreamDelta;
use crate::types::{ChatMessage, Completion, CompletionOptions, MessageRole, Usage};

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

pub fn build_generate_body(messages: &[ChatMessage], options: &CompletionOptions) -> Result<Value, LlmError> {
    let (system, turns) = split_system(messages, options);
    let generation_config = (options.temperature.is_some() || options.max_tokens.is_some()).then(|| {
        GenerationConfig {
            temperature: options.temperature,
            max_output_tokens: options.max_tokens,
        }
    });
    let body = GenerateRequest {
        contents: turns
            .into_iter()
            .map(|m| Content {
                role: Some(if m.role == MessageRole::Assistant { "model" } else { "user" }),
                parts: vec![Part { text: m.content.clone() }],
            })
            .collect(),
        system_instruction: system.map(|text| Content {
            role: None,
            parts: vec![Part { text }],
        }),
        generation_config,
    };
    Ok(serde_json::to_value(body)?)
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl From<UsageMetadata> for Usage {
    fn from(u: UsageMetadata) -> Self {
        let mut usage = Usage::new(u.prompt_token_count, u.candidates_token_count);
        usage.total_tokens = usage.total_tokens.max(u.total_token_count);
        usage
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

impl GenerateResponse {
    fn into_parts(self) -> (String, Option<String>, Option<Usage>, Option<String>) {
        let (text, finish) = match self.candidates.into_iter().next() {
            Some(c) => (
                c.content
                    .map(|content| content.parts.into_iter().map(|p| p.text).collect::<String>())
                    .unwrap_or_default(),
                c.finish_reason,
            ),
            None => (String::new(), None),
        };
        (text, finish, self.usage_metadata.map(Usage::from), self.model_version)
    }
}

pub fn parse_generate_response(value: Value) -> Result<Completion, LlmError> {
    let body: GenerateResponse = serde_json::from_value(value)
        .map_err(|e| LlmError::ParseError(format!("unexpected generateContent shape: {e}")))?;
    let (text, finish_reason, usage, model) = body.into_parts();
    Ok(Completion {
        text,
        model,
        usage,
        finish_reason,
    })
}

/// One element of the `streamGenerateContent` array.
pub fn map_stream_element(value: &Value) -> Result<Option<StreamDelta>, LlmError> {
    if value.get("error").is_some() {
        let message = extract_upstream_message(&value.to_string()).unwrap_or_else(|| "stream error".to_string());
        let code = value.pointer("/error/code").and_then(Value::as_u64).unwrap_or(500) as u16;
        return Err(LlmError::api_error(code, message));
    }
    let body: GenerateResponse =
        serde_json::from_value(value.clone()).map_err(|e| LlmError::StreamParseError(e.to_string()))?;
    let (text, finish_reason, usage, _) = body.into_parts();
    let delta = StreamDelta {
        text,
        usage,
        finish_reason,
        done: false,
    };
    Ok((!delta.is_empty()).then_some(delta))
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

pub fn parse_model_list(value: Value) -> Result<Vec<String>, LlmError> {
    let list: ModelList = serde_json::from_value(value)?;
    Ok(list
        .models
        .into_iter()
        .map(|m| m.name.strip_prefix("models/").map(str::to_string).unwrap_or(m.name))
        .collect())
}
