//! Provider client contract
//!
//! Every backend implements [`ProviderClient`] directly. Clients are
//! stateless with respect to conversations; the orchestrator owns history and
//! the registry owns metrics.

use async_trait::async_trait;

use crate::error::LlmError;
use crate::types::{Capabilities, ChatMessage, Completion, CompletionOptions, Usage};

pub use crate::types::ChunkStream;

/// Fixed capability contract shared by all vendors.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Registry key this client was built for.
    fn provider_id(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Provider-specific readiness predicate. Hosted backends need a
    /// non-empty credential; local servers are always configured.
    fn is_configured(&self) -> bool;

    /// Initialization check run by the registry before an instance is
    /// published.
    fn validate(&self) -> Result<(), LlmError> {
        Ok(())
    }

    /// Model identifiers currently offered by the backend. Unreachable or
    /// uncredentialed backends yield an empty list rather than an error.
    async fn list_models(&self) -> Vec<String>;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError>;

    /// Streaming completion. The returned stream yields exactly one chunk
    /// with `finished == true` unless it ends in an error.
    async fn complete_streaming(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<ChunkStream, LlmError>;

    /// Cheap reachability probe bounded by the configured probe timeout.
    async fn test_connection(&self) -> Result<(), LlmError>;

    /// Rough token counts for backends that report no usage: one token per
    /// four characters, rounded up.
    fn estimate_usage(&self, messages: &[ChatMessage], completion: &str) -> Usage {
        let prompt_chars: usize = messages.iter().map(|m| m.content.chars().count()).sum();
        let completion_chars = completion.chars().count();
        let tokens = |chars: usize| u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX);
        Usage::new(tokens(prompt_chars), tokens(completion_chars))
    }

    /// Best-effort cost in USD. Unknown models cost nothing.
    fn cost(&self, _model: &str, _usage: &Usage) -> f64 {
        0.0
    }

    /// Number of history messages to keep for conversations routed here.
    fn history_window(&self) -> Option<usize> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreamChunk;

    struct Fixed;

    #[async_trait]
    impl ProviderClient for Fixed {
        fn provider_id(&self) -> &str {
            "fixed"
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn list_models(&self) -> Vec<String> {
            Vec::new()
        }
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<Completion, LlmError> {
            Ok(Completion::default())
        }
        async fn complete_streaming(
            &self,
            _messages: Vec<ChatMessage>,
            _options: CompletionOptions,
        ) -> Result<ChunkStream, LlmError> {
            Ok(Box::pin(futures::stream::iter(vec![Ok(StreamChunk {
                finished: true,
                ..Default::default()
            })])))
        }
        async fn test_connection(&self) -> Result<(), LlmError> {
            Ok(())
        }
    }

    #[test]
    fn default_estimate_rounds_up_quarter_chars() {
        let usage = Fixed.estimate_usage(&[ChatMessage::user("hello")], "abc");
        assert_eq!(usage, Usage::new(2, 1));
        assert_eq!(Fixed.cost("anything", &usage), 0.0);
    }
}
