//! Anthropic provider
//!
//! Messages API with typed SSE events; see [`crate::streaming::TypedEventDecoder`].

pub mod client;
pub mod transformers;

pub use client::{AnthropicClient, default_capabilities, default_config};
