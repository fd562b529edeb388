//! Shared data types

pub mod capabilities;
pub mod chat;
pub mod metrics;
pub mod streaming;

pub use capabilities::{Capabilities, Capability};
pub use chat::{ChatMessage, Completion, CompletionOptions, MessageRole, Usage};
pub use metrics::{HealthReport, HealthStatus, ProviderMetrics};
pub use streaming::{ByteStream, ChunkStream, StreamChunk};
