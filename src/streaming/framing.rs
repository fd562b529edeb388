//! Record framing over raw response bodies.
//!
//! SSE bodies are split into events by `eventsource-stream`; newline-delimited
//! JSON is split into lines by `tokio_util`'s [`LinesCodec`]. Both yield the
//! record payload as text, and both hand transport errors back unchanged so a
//! stall or reset keeps its original [`LlmError`] variant.

use std::pin::Pin;

use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;

use crate::error::LlmError;
use crate::types::ByteStream;

/// Framed record payloads. `Err(StreamParseError)` marks an unreadable frame
/// that the consumer may skip; any other error ends the stream.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// The `data` field of each SSE event.
pub fn sse_records(bytes: ByteStream) -> RecordStream {
    Box::pin(bytes.eventsource().map(|item| match item {
        Ok(event) => Ok(event.data),
        Err(EventStreamError::Transport(e)) => Err(e),
        Err(e) => Err(LlmError::StreamParseError(e.to_string())),
    }))
}

/// One line per record, without its terminator. A trailing line without a
/// newline is still delivered when the body ends.
pub fn ndjson_records(bytes: ByteStream) -> RecordStream {
    let reader = StreamReader::new(bytes.map(|read| read.map_err(std::io::Error::other)));
    Box::pin(FramedRead::new(reader, LinesCodec::new()).map(|line| {
        line.map_err(|e| match e {
            LinesCodecError::Io(io) => recover_transport_error(io),
            other @ LinesCodecError::MaxLineLengthExceeded => LlmError::StreamParseError(other.to_string()),
        })
    }))
}

fn recover_transport_error(err: std::io::Error) -> LlmError {
    if err.kind() == std::io::ErrorKind::InvalidData {
        return LlmError::StreamParseError(err.to_string());
    }
    let kind = err.kind();
    match err.into_inner().map(|inner| inner.downcast::<LlmError>()) {
        Some(Ok(original)) => *original,
        Some(Err(other)) => LlmError::ConnectionError(other.to_string()),
        None => LlmError::ConnectionError(format!("stream read failed: {kind}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn reads(parts: Vec<&'static str>) -> ByteStream {
        Box::pin(futures::stream::iter(
            parts.into_iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))),
        ))
    }

    async fn collect(records: RecordStream) -> Vec<Result<String, LlmError>> {
        records.collect().await
    }

    #[tokio::test]
    async fn sse_events_are_reassembled_across_reads() {
        let out = collect(sse_records(reads(vec![
            "data: {\"t\":\"He",
            "llo\"}\n\n: keep-alive\n\nevent: delta\nid: 7\ndata: {\"t\":\" wo",
            "rld\"}\r\n\r\ndata: [DO",
            "NE]\n\n",
        ])))
        .await;
        let payloads: Vec<_> = out.into_iter().map(Result::unwrap).filter(|p| !p.is_empty()).collect();
        assert_eq!(payloads, ["{\"t\":\"Hello\"}", "{\"t\":\" world\"}", "[DONE]"]);
    }

    #[tokio::test]
    async fn sse_transport_error_keeps_its_variant() {
        let bytes: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: {}\n\n")),
            Err(LlmError::TimeoutError("stalled".into())),
        ]));
        let out = collect(sse_records(bytes)).await;
        assert_eq!(out[0].as_deref().unwrap(), "{}");
        assert!(matches!(out.last(), Some(Err(LlmError::TimeoutError(_)))));
    }

    #[tokio::test]
    async fn ndjson_lines_split_mid_character_and_flush_the_tail() {
        let body = "{\"t\":\"é\"}\r\n{\"t\":\"b\"}".as_bytes();
        let (a, b) = body.split_at(7);
        let bytes: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::copy_from_slice(a)),
            Ok(Bytes::copy_from_slice(b)),
        ]));
        let out: Vec<_> = collect(ndjson_records(bytes)).await.into_iter().map(Result::unwrap).collect();
        assert_eq!(out, ["{\"t\":\"é\"}", "{\"t\":\"b\"}"]);
    }

    #[tokio::test]
    async fn ndjson_transport_error_keeps_its_variant() {
        let bytes: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"{\"t\":\"a\"}\n")),
            Err(LlmError::TimeoutError("stalled".into())),
        ]));
        let out = collect(ndjson_records(bytes)).await;
        assert_eq!(out[0].as_deref().unwrap(), "{\"t\":\"a\"}");
        assert!(matches!(out[1], Err(LlmError::TimeoutError(_))));
    }
}
