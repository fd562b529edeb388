//! Normalized streaming types

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use super::chat::Usage;
use crate::error::LlmError;

/// One normalized streaming increment.
///
/// Exactly one chunk per request carries `finished == true`; on that chunk
/// `full_text_so_far` equals the concatenation of every prior `delta_text`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta_text: String,
    pub full_text_so_far: String,
    pub finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Boxed stream of normalized chunks returned by every provider client.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LlmError>> + Send>>;

/// Boxed raw byte stream handed to the normalizer.
pub type ByteStream =
    Pin<Box<dyn Stream<Item = Result<bytes::Bytes, LlmError>> + Send>>;
