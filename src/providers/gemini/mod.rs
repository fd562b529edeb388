//! Google Gemini provider

pub mod client;
pub mod transformers;

pub use client::{GeminiClient, default_capabilities, default_config};
