//! Streaming
//!
//! Record framing, incremental decoders for the vendor wire formats, and the
//! normalizer that turns any of them into a uniform
//! [`crate::types::StreamChunk`] sequence.
//!
//! - [`JsonLineDecoder`]: SSE event payloads or newline-delimited JSON
//! - [`TypedEventDecoder`]: SSE events discriminated by a `type` field
//! - [`JsonArrayDecoder`]: one JSON array streamed element by element

pub mod decoder;
pub mod framing;
pub mod json_array;
pub mod json_lines;
pub mod normalizer;
pub mod typed_event;

pub use decoder::{RecordDecoder, RecordMapper, StreamDecoder, StreamDelta};
pub use framing::{RecordStream, ndjson_records, sse_records};
pub use json_array::JsonArrayDecoder;
pub use json_lines::JsonLineDecoder;
pub use normalizer::{StreamNormalizer, normalize_byte_stream, normalize_ndjson, normalize_records, normalize_sse};
pub use typed_event::TypedEventDecoder;
