//! Stream normalization
//!
//! Turns decoded deltas into [`StreamChunk`]s with the accumulated text.
//! Exactly one chunk with `finished == true` is produced per stream: either
//! when the decoder reports completion or, if the transport closes first, a
//! synthesized one.

use futures::StreamExt;

use super::decoder::{RecordDecoder, StreamDecoder, StreamDelta};
use super::framing::{RecordStream, ndjson_records, sse_records};
use crate::error::LlmError;
use crate::types::{ByteStream, ChunkStream, StreamChunk, Usage};

pub struct StreamNormalizer {
    format: &'static str,
    full_text: String,
    usage: Option<Usage>,
    finish_reason: Option<String>,
    finished: bool,
}

impl StreamNormalizer {
    pub fn new(format: &'static str) -> Self {
        Self {
            format,
            full_text: String::new(),
            usage: None,
            finish_reason: None,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// Fold decoded deltas into chunks. Stops at the first terminal delta or
    /// error.
    pub fn absorb(&mut self, deltas: Vec<Result<StreamDelta, LlmError>>) -> Vec<Result<StreamChunk, LlmError>> {
        let mut out = Vec::new();
        if self.finished {
            if !deltas.is_empty() {
                tracing::debug!(format = self.format, "ignoring records after stream completion");
            }
            return out;
        }
        for delta in deltas {
            let delta = match delta {
                Ok(d) => d,
                Err(e) => {
                    self.finished = true;
                    out.push(Err(e));
                    break;
                }
            };
            if let Some(usage) = delta.usage {
                self.usage.get_or_insert_with(Usage::default).merge(&usage);
            }
            if delta.finish_reason.is_some() {
                self.finish_reason = delta.finish_reason;
            }
            if !delta.text.is_empty() {
                self.full_text.push_str(&delta.text);
                out.push(Ok(StreamChunk {
                    delta_text: delta.text,
                    full_text_so_far: self.full_text.clone(),
                    finished: false,
                    usage: None,
                    finish_reason: None,
                }));
            }
            if delta.done {
                out.push(Ok(self.terminal()));
                break;
            }
        }
        out
    }

    /// Transport closed. `flushed` is whatever the decoder still held back.
    /// Always ends with a terminal chunk unless one was already produced or
    /// an upstream error ended the stream.
    pub fn close(&mut self, flushed: Vec<Result<StreamDelta, LlmError>>, skipped: usize) -> Vec<Result<StreamChunk, LlmError>> {
        if self.finished {
            return Vec::new();
        }
        let mut out = self.absorb(flushed);
        if !self.finished {
            tracing::debug!(format = self.format, skipped, "stream closed without completion marker");
            out.push(Ok(self.terminal()));
        }
        out
    }

    fn terminal(&mut self) -> StreamChunk {
        self.finished = true;
        StreamChunk {
            delta_text: String::new(),
            full_text_so_far: self.full_text.clone(),
            finished: true,
            usage: self.usage,
            finish_reason: self.finish_reason.clone(),
        }
    }
}

/// SSE body whose event payloads `decoder` interprets.
pub fn normalize_sse<D>(bytes: ByteStream, decoder: D) -> ChunkStream
where
    D: RecordDecoder + 'static,
{
    normalize_records(sse_records(bytes), decoder)
}

/// Newline-delimited JSON body.
pub fn normalize_ndjson<D>(bytes: ByteStream, decoder: D) -> ChunkStream
where
    D: RecordDecoder + 'static,
{
    normalize_records(ndjson_records(bytes), decoder)
}

/// Drive framed records through `decoder`, producing normalized chunks.
///
/// The record stream is dropped as soon as the terminal chunk or an error has
/// been yielded, which releases the underlying connection.
pub fn normalize_records<D>(mut records: RecordStream, mut decoder: D) -> ChunkStream
where
    D: RecordDecoder + 'static,
{
    Box::pin(async_stream::stream! {
        let mut normalizer = StreamNormalizer::new(decoder.format());
        let mut unreadable = 0usize;
        while let Some(record) = records.next().await {
            match record {
                Ok(payload) => {
                    for item in normalizer.absorb(decoder.decode(&payload)) {
                        yield item;
                    }
                    if normalizer.is_finished() {
                        return;
                    }
                }
                Err(LlmError::StreamParseError(reason)) => {
                    unreadable += 1;
                    tracing::warn!(format = decoder.format(), error = %reason, "skipping unreadable stream frame");
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        let skipped = decoder.skipped_records() + unreadable;
        for item in normalizer.close(decoder.finish(), skipped) {
            yield item;
        }
    })
}

/// Drive raw reads through a byte-level `decoder`.
pub fn normalize_byte_stream<D>(mut bytes: ByteStream, mut decoder: D) -> ChunkStream
where
    D: StreamDecoder + 'static,
{
    Box::pin(async_stream::stream! {
        let mut normalizer = StreamNormalizer::new(decoder.format());
        while let Some(read) = bytes.next().await {
            match read {
                Ok(data) => {
                    for item in normalizer.absorb(decoder.feed(&data)) {
                        yield item;
                    }
                    if normalizer.is_finished() {
                        return;
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        let skipped = decoder.skipped_records();
        for item in normalizer.close(decoder.finish(), skipped) {
            yield item;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::{JsonArrayDecoder, JsonLineDecoder};
    use bytes::Bytes;
    use serde_json::Value;

    fn mapper(v: &Value) -> Result<Option<StreamDelta>, LlmError> {
        if let Some(msg) = v.get("err").and_then(Value::as_str) {
            return Err(LlmError::api_error(500, msg));
        }
        Ok(Some(StreamDelta {
            text: v.get("t").and_then(Value::as_str).unwrap_or_default().to_string(),
            finish_reason: v.get("f").and_then(Value::as_str).map(str::to_string),
            ..Default::default()
        }))
    }

    fn byte_stream(reads: Vec<&'static str>) -> ByteStream {
        Box::pin(futures::stream::iter(
            reads.into_iter().map(|r| Ok(Bytes::from_static(r.as_bytes()))),
        ))
    }

    async fn collect(reads: Vec<&'static str>) -> Vec<Result<StreamChunk, LlmError>> {
        let decoder = JsonLineDecoder::sse("test", "[DONE]", mapper);
        normalize_sse(byte_stream(reads), decoder).collect().await
    }

    #[tokio::test]
    async fn one_terminal_chunk_with_full_text() {
        let out = collect(vec![
            "data: {\"t\":\"Hel\"}\n\ndata: {\"t\":\"lo\"}\n",
            "\ndata: {\"t\":\"\",\"f\":\"stop\"}\n\ndata: [DONE]\n\n",
            "data: {\"t\":\"after done\"}\n\n",
        ])
        .await;
        let chunks: Vec<_> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().filter(|c| c.finished).count(), 1);
        let last = chunks.last().unwrap();
        assert!(last.finished);
        assert_eq!(last.full_text_so_far, "Hello");
        assert_eq!(last.finish_reason.as_deref(), Some("stop"));
        let concat: String = chunks.iter().map(|c| c.delta_text.as_str()).collect();
        assert_eq!(concat, last.full_text_so_far);
    }

    #[tokio::test]
    async fn bare_close_synthesizes_terminal() {
        let out = collect(vec!["data: {\"t\":\"partial\"}\n\n"]).await;
        let chunks: Vec<_> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].finished);
        assert_eq!(chunks[1].full_text_so_far, "partial");
    }

    #[tokio::test]
    async fn empty_stream_still_finishes() {
        let chunks: Vec<_> = collect(vec![]).await.into_iter().map(Result::unwrap).collect();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].finished);
        assert!(chunks[0].full_text_so_far.is_empty());
    }

    #[tokio::test]
    async fn in_band_error_ends_stream_without_terminal() {
        let out = collect(vec!["data: {\"t\":\"a\"}\n\ndata: {\"err\":\"boom\"}\n\ndata: {\"t\":\"b\"}\n\n"]).await;
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(matches!(out[1], Err(LlmError::ApiError { code: 500, .. })));
    }

    #[tokio::test]
    async fn transport_error_is_forwarded() {
        let bytes: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"t\":\"a\"}\n\n")),
            Err(LlmError::ConnectionError("reset".into())),
        ]));
        let out: Vec<_> = normalize_sse(bytes, JsonLineDecoder::sse("test", "[DONE]", mapper))
            .collect()
            .await;
        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], Err(LlmError::ConnectionError(_))));
    }

    #[tokio::test]
    async fn ndjson_tail_without_newline_is_not_lost() {
        let out: Vec<_> = normalize_ndjson(
            byte_stream(vec!["{\"t\":\"a\"}\n{\"t\":", "\"b\",\"f\":\"stop\"}"]),
            JsonLineDecoder::ndjson("test", mapper),
        )
        .collect()
        .await;
        let chunks: Vec<_> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].full_text_so_far, "ab");
        assert_eq!(chunks[2].finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn byte_level_decoder_finishes_on_array_close() {
        let out: Vec<_> = normalize_byte_stream(
            byte_stream(vec!["[{\"t\":\"x\"},", "{\"t\":\"y\"}]", "trailing"]),
            JsonArrayDecoder::new("test", mapper),
        )
        .collect()
        .await;
        let chunks: Vec<_> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(chunks.len(), 3);
        assert!(chunks[2].finished);
        assert_eq!(chunks[2].full_text_so_far, "xy");
    }
}
