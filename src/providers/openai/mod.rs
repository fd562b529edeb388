//! `OpenAI` provider
//!
//! Chat Completions over SSE (`data:` lines terminated by `[DONE]`).

pub mod client;
pub mod streaming;
pub mod transformers;

pub use client::{OpenAiClient, default_capabilities, default_config};
