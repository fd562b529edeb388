//! Lifecycle notifications
//!
//! Request and provider lifecycle events are published on a
//! [`tokio::sync::broadcast`] channel. Publishing never blocks and never
//! fails; a subscriber that falls behind observes `RecvError::Lagged`.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::{StreamChunk, Usage};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestEvent {
    Queued {
        request_id: String,
        chat_id: String,
        queue_depth: usize,
    },
    StreamingChunk {
        request_id: String,
        chat_id: String,
        chunk: StreamChunk,
    },
    Completed {
        request_id: String,
        chat_id: String,
        provider_id: String,
        model: Option<String>,
        elapsed_ms: u64,
        usage: Option<Usage>,
        cost: f64,
    },
    /// Exactly one per terminal failure. `message` is user-facing.
    Failed {
        request_id: String,
        chat_id: String,
        provider_id: Option<String>,
        kind: String,
        message: String,
    },
}

impl RequestEvent {
    pub fn request_id(&self) -> &str {
        match self {
            Self::Queued { request_id, .. }
            | Self::StreamingChunk { request_id, .. }
            | Self::Completed { request_id, .. }
            | Self::Failed { request_id, .. } => request_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    Registered {
        provider_id: String,
        replaced: bool,
    },
    Configured {
        provider_id: String,
    },
    Initialized {
        provider_id: String,
    },
    StatusChanged {
        provider_id: String,
        connected: bool,
        consecutive_failures: u32,
        error: Option<String>,
    },
    Removed {
        provider_id: String,
    },
    DefaultChanged {
        provider_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "scope", content = "event", rename_all = "snake_case")]
pub enum CoreEvent {
    Request(RequestEvent),
    Provider(ProviderEvent),
}

impl From<RequestEvent> for CoreEvent {
    fn from(e: RequestEvent) -> Self {
        Self::Request(e)
    }
}

impl From<ProviderEvent> for CoreEvent {
    fn from(e: ProviderEvent) -> Self {
        Self::Provider(e)
    }
}

/// Cloneable publish/subscribe handle.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: impl Into<CoreEvent>) {
        // No subscribers is not an error.
        let _ = self.sender.send(event.into());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
