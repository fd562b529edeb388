//! Delta-JSON-line decoder
//!
//! One JSON document per record: the `data` of an SSE event (with an
//! optional sentinel such as `[DONE]`) or one line of newline-delimited JSON.

use super::decoder::{RecordDecoder, RecordMapper, StreamDelta, log_skipped};
use crate::error::LlmError;

pub struct JsonLineDecoder {
    label: &'static str,
    sentinel: Option<&'static str>,
    mapper: RecordMapper,
    skipped: usize,
}

impl JsonLineDecoder {
    /// SSE event payloads terminated by `sentinel`.
    pub fn sse(label: &'static str, sentinel: &'static str, mapper: RecordMapper) -> Self {
        Self {
            label,
            sentinel: Some(sentinel),
            mapper,
            skipped: 0,
        }
    }

    /// Plain newline-delimited JSON with no sentinel line.
    pub fn ndjson(label: &'static str, mapper: RecordMapper) -> Self {
        Self {
            label,
            sentinel: None,
            mapper,
            skipped: 0,
        }
    }

    fn skip(&mut self, reason: &str, raw: &str) {
        self.skipped += 1;
        log_skipped(self.label, reason, raw);
    }
}

impl RecordDecoder for JsonLineDecoder {
    fn format(&self) -> &'static str {
        self.label
    }

    fn decode(&mut self, payload: &str) -> Vec<Result<StreamDelta, LlmError>> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Vec::new();
        }
        if self.sentinel == Some(payload) {
            return vec![Ok(StreamDelta::done())];
        }
        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) => match (self.mapper)(&value) {
                Ok(Some(delta)) => vec![Ok(delta)],
                Ok(None) => Vec::new(),
                Err(LlmError::StreamParseError(reason)) => {
                    self.skip(&reason, payload);
                    Vec::new()
                }
                Err(e) => vec![Err(e)],
            },
            Err(e) => {
                self.skip(&e.to_string(), payload);
                Vec::new()
            }
        }
    }

    fn skipped_records(&self) -> usize {
        self.skipped
    }
}
