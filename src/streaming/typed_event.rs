//! Typed-event decoder
//!
//! SSE event payloads carrying a `type` discriminator
//! (`message_start`, `content_block_delta`, `message_delta`, `message_stop`,
//! `error`, `ping`). The finish reason arrives on `message_delta` but is only
//! surfaced when `message_stop` closes the stream.

use serde_json::Value;

use super::decoder::{RecordDecoder, StreamDelta, log_skipped};
use crate::error::LlmError;
use crate::types::Usage;

#[derive(Debug, Default)]
pub struct TypedEventDecoder {
    stop_reason: Option<String>,
    usage: Option<Usage>,
    stopped: bool,
    skipped: usize,
}

impl TypedEventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn merge_usage(&mut self, usage: &Value) {
        let prompt = token_count(usage, "input_tokens");
        let completion = token_count(usage, "output_tokens");
        if prompt == 0 && completion == 0 {
            return;
        }
        self.usage
            .get_or_insert_with(Usage::default)
            .merge(&Usage::new(prompt, completion));
    }

    fn process(&mut self, payload: &str, out: &mut Vec<Result<StreamDelta, LlmError>>) {
        // The SSE `event:` name duplicates the `type` field of the payload.
        let payload = payload.trim();
        if payload.is_empty() {
            return;
        }
        let event: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                self.skip(&e.to_string(), payload);
                return;
            }
        };

        match event.get("type").and_then(Value::as_str) {
            Some("message_start") => {
                if let Some(usage) = event.pointer("/message/usage") {
                    self.merge_usage(usage);
                }
            }
            Some("content_block_delta") => {
                if let Some(text) = event.pointer("/delta/text").and_then(Value::as_str)
                    && !text.is_empty()
                {
                    out.push(Ok(StreamDelta::text(text)));
                }
            }
            Some("message_delta") => {
                if let Some(reason) = event.pointer("/delta/stop_reason").and_then(Value::as_str) {
                    self.stop_reason = Some(reason.to_string());
                }
                if let Some(usage) = event.get("usage") {
                    self.merge_usage(usage);
                }
            }
            Some("message_stop") => {
                self.stopped = true;
                out.push(Ok(StreamDelta {
                    usage: self.usage,
                    finish_reason: self.stop_reason.take(),
                    done: true,
                    ..Default::default()
                }));
            }
            Some("error") => out.push(Err(in_band_error(&event))),
            Some(_) => {}
            None => self.skip("event without a type field", payload),
        }
    }

    fn skip(&mut self, reason: &str, raw: &str) {
        self.skipped += 1;
        log_skipped("typed-event", reason, raw);
    }
}

/// Token counts beyond `u32` saturate.
fn token_count(usage: &Value, field: &str) -> u32 {
    usage
        .get(field)
        .and_then(Value::as_u64)
        .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
}

/// Map an in-band `{"type":"error","error":{"type":..,"message":..}}` event.
fn in_band_error(event: &Value) -> LlmError {
    let kind = event.pointer("/error/type").and_then(Value::as_str).unwrap_or("");
    let message = event
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or("stream error")
        .to_string();
    match kind {
        "authentication_error" => LlmError::AuthenticationError(message),
        "not_found_error" => LlmError::ModelNotFound(message),
        "rate_limit_error" => LlmError::RateLimitError(message),
        "overloaded_error" => LlmError::api_error(529, message),
        "invalid_request_error" => LlmError::api_error(400, message),
        _ => LlmError::api_error(500, message),
    }
}

impl RecordDecoder for TypedEventDecoder {
    fn format(&self) -> &'static str {
        "typed-event"
    }

    fn decode(&mut self, payload: &str) -> Vec<Result<StreamDelta, LlmError>> {
        let mut out = Vec::new();
        self.process(payload, &mut out);
        out
    }

    fn finish(&mut self) -> Vec<Result<StreamDelta, LlmError>> {
        let mut out = Vec::new();
        // Closed without message_stop: hand over what we know so the
        // synthesized terminal chunk can carry it.
        if !self.stopped && (self.stop_reason.is_some() || self.usage.is_some()) {
            out.push(Ok(StreamDelta {
                usage: self.usage,
                finish_reason: self.stop_reason.take(),
                ..Default::default()
            }));
        }
        out
    }

    fn skipped_records(&self) -> usize {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENTS: [&str; 6] = [
        r#"{"type":"message_start","message":{"id":"msg_1","usage":{"input_tokens":12,"output_tokens":1}}}"#,
        r#"{"type":"ping"}"#,
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":" there"}}"#,
        r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":5}}"#,
        r#"{"type":"message_stop"}"#,
    ];

    fn decode_all(d: &mut TypedEventDecoder, events: &[&str]) -> Vec<StreamDelta> {
        events
            .iter()
            .flat_map(|e| d.decode(e))
            .map(Result::unwrap)
            .collect()
    }

    #[test]
    fn stop_reason_is_held_until_message_stop() {
        let mut d = TypedEventDecoder::new();
        let first = decode_all(&mut d, &EVENTS[..5]);
        assert_eq!(first, vec![StreamDelta::text("Hi"), StreamDelta::text(" there")]);

        let rest = decode_all(&mut d, &EVENTS[5..]);
        assert_eq!(rest.len(), 1);
        assert!(rest[0].done);
        assert_eq!(rest[0].finish_reason.as_deref(), Some("end_turn"));
        assert_eq!(rest[0].usage, Some(Usage::new(12, 5)));
        assert!(d.finish().is_empty());
    }

    #[test]
    fn error_events_surface_as_errors() {
        let mut d = TypedEventDecoder::new();
        let out = d.decode(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#);
        assert!(matches!(&out[0], Err(LlmError::ApiError { code: 529, .. })));
    }

    #[test]
    fn pending_stop_reason_is_flushed_on_bare_close() {
        let mut d = TypedEventDecoder::new();
        assert!(d.decode(r#"{"type":"message_delta","delta":{"stop_reason":"max_tokens"}}"#).is_empty());
        let out = d.finish();
        let delta = out[0].as_ref().unwrap();
        assert!(!delta.done);
        assert_eq!(delta.finish_reason.as_deref(), Some("max_tokens"));
    }

    #[test]
    fn oversized_token_counts_saturate() {
        let mut d = TypedEventDecoder::new();
        d.decode(r#"{"type":"message_start","message":{"usage":{"input_tokens":5000000000,"output_tokens":0}}}"#);
        d.decode(r#"{"type":"message_delta","delta":{},"usage":{"output_tokens":4294967295}}"#);
        let out = decode_all(&mut d, &[r#"{"type":"message_stop"}"#]);
        let usage = out[0].usage.unwrap();
        assert_eq!(usage.prompt_tokens, u32::MAX);
        assert_eq!(usage.completion_tokens, u32::MAX);
        assert_eq!(usage.total_tokens, u32::MAX);
    }

    #[test]
    fn untyped_payload_is_skipped() {
        let mut d = TypedEventDecoder::new();
        assert!(d.decode(r#"{"delta":{"text":"x"}}"#).is_empty());
        assert!(d.decode("not json").is_empty());
        assert_eq!(d.skipped_records(), 2);
    }
}
