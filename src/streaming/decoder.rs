//! Decoder contract shared by every incremental wire format.

use crate::error::LlmError;
use crate::types::Usage;

/// One interpreted record from a vendor stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamDelta {
    pub text: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
    /// The stream signalled explicit completion.
    pub done: bool,
}

impl StreamDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.usage.is_none() && self.finish_reason.is_none() && !self.done
    }
}

/// Interprets one framed record payload.
///
/// Framing (SSE events, newline-delimited lines) happens upstream in
/// [`crate::streaming::framing`]; a decoder only sees complete payloads. A
/// malformed record is logged and skipped; `Err` items are reserved for
/// failures the upstream reported in-band.
pub trait RecordDecoder: Send {
    /// Wire format label used in logs.
    fn format(&self) -> &'static str;

    fn decode(&mut self, payload: &str) -> Vec<Result<StreamDelta, LlmError>>;

    /// Transport closed. Hand over any state still held back.
    fn finish(&mut self) -> Vec<Result<StreamDelta, LlmError>> {
        Vec::new()
    }

    /// Number of malformed records skipped so far.
    fn skipped_records(&self) -> usize;
}

/// Turns raw transport reads into interpreted records, for formats with no
/// line or event framing to lean on.
///
/// Implementations must tolerate record boundaries that fall anywhere inside
/// a read, including inside a multi-byte UTF-8 sequence.
pub trait StreamDecoder: Send {
    fn format(&self) -> &'static str;

    fn feed(&mut self, bytes: &[u8]) -> Vec<Result<StreamDelta, LlmError>>;

    /// Transport closed. Flush whatever partial record is still buffered.
    fn finish(&mut self) -> Vec<Result<StreamDelta, LlmError>>;

    fn skipped_records(&self) -> usize;
}

/// Maps one parsed JSON record to a delta. `Ok(None)` ignores the record.
pub type RecordMapper = fn(&serde_json::Value) -> Result<Option<StreamDelta>, LlmError>;

/// Log a malformed record with a bounded excerpt.
pub(crate) fn log_skipped(format: &'static str, reason: &str, record: &str) {
    tracing::warn!(
        format,
        error = %LlmError::StreamParseError(reason.to_string()),
        record = %record.chars().take(200).collect::<String>(),
        "skipping malformed stream record"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_or_finish_reason_alone_is_not_empty() {
        assert!(StreamDelta::default().is_empty());
        assert!(StreamDelta::text("").is_empty());
        assert!(!StreamDelta::done().is_empty());
        let delta = StreamDelta {
            usage: Some(crate::types::Usage::new(1, 0)),
            ..Default::default()
        };
        assert!(!delta.is_empty());
    }
}
