//! Ollama provider
//!
//! Local server streaming newline-delimited JSON. Always considered
//! configured; no credential is required.

pub mod client;
pub mod transformers;

pub use client::{OllamaClient, default_capabilities, default_config};
