//! # chatrelay - provider-agnostic LLM request orchestration
//!
//! Sends chat messages to one of several interchangeable LLM backends
//! without the caller knowing which one serves the request.
//!
//! ## Components
//!
//! - **[`registry::ProviderRegistry`]**: registrations, per-provider config, live
//!   instances with rolling metrics, health and the capability index.
//! - **[`orchestrator::RequestOrchestrator`]**: FIFO queue under a concurrency
//!   ceiling, provider selection, streaming fan-out and per-chat history.
//! - **[`traits::ProviderClient`]**: the contract every backend implements
//!   (`openai`, `deepseek`, `anthropic`, `gemini`, `ollama` are bundled).
//! - **[`streaming`]**: decoders for SSE/NDJSON lines, typed events and
//!   bracketed JSON arrays, normalized into one [`types::StreamChunk`] shape.
//! - **[`health::HealthMonitor`]**: optional periodic connectivity prober.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatrelay::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), LlmError> {
//!     let config = CoreConfig::from_json_str(
//!         r#"{"providers": {"openai": {"apiKey": "sk-..."}}, "default_provider": "openai"}"#,
//!     )?;
//!     let ctx = CoreContext::from_config(&config)?;
//!     let orchestrator = RequestOrchestrator::new(ctx, config.orchestrator.clone())?;
//!
//!     let mut handle = orchestrator.submit("chat-1", "Hello!", RequestOptions::new().streaming())?;
//!     while let Some(chunk) = handle.next_chunk().await {
//!         print!("{}", chunk.delta_text);
//!     }
//!     let outcome = handle.wait().await?;
//!     println!("\nserved by {}", outcome.provider_id);
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod health;
pub mod observability;
pub mod orchestrator;
pub mod providers;
pub mod registry;
pub mod retry;
pub mod settings;
pub mod streaming;
pub mod traits;
pub mod types;

/// Provider ids compiled into this build.
pub fn enabled_providers() -> Vec<String> {
    registry::builtin::builtin_registrations()
        .into_iter()
        .map(|r| r.provider_id)
        .collect()
}

pub mod prelude {
    pub use crate::config::{
        CoreConfig, HealthMonitorConfig, OrchestratorConfig, ProviderConfig, ProviderConfigPatch,
    };
    pub use crate::context::CoreContext;
    pub use crate::error::{ErrorCategory, LlmError};
    pub use crate::events::{CoreEvent, EventBus, ProviderEvent, RequestEvent};
    pub use crate::health::{HealthMonitor, HealthMonitorHandle};
    pub use crate::orchestrator::{
        ModelSelection, RequestHandle, RequestOptions, RequestOrchestrator, RequestOutcome,
        RequestState, SystemStatus,
    };
    pub use crate::registry::{
        BuildContext, ProviderMetadata, ProviderRegistration, ProviderRegistry,
        SelectionRequirements, SupportLevel,
    };
    pub use crate::settings::{MemorySettingsStore, SettingsStore};
    pub use crate::traits::{ChunkStream, ProviderClient};
    pub use crate::types::{
        Capabilities, Capability, ChatMessage, Completion, CompletionOptions, StreamChunk, Usage,
    };
}
