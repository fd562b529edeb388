//! DeepSeek via its OpenAI-compatible endpoint.

use crate::config::ProviderConfig;
use crate::providers::openai::OpenAiClient;
use crate::types::Capabilities;

pub const PROVIDER_ID: &str = "deepseek";
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_MODEL: &str = "deepseek-chat";

pub fn default_config() -> ProviderConfig {
    ProviderConfig::new(DEFAULT_BASE_URL, DEFAULT_MODEL)
}

pub fn default_capabilities() -> Capabilities {
    Capabilities::new()
        .with_streaming()
        .with_function_calling()
        .with_max_context_length(64_000)
        .with_formats(["text"])
}

pub fn client(config: ProviderConfig, http_client: reqwest::Client) -> OpenAiClient {
    OpenAiClient::new(config, http_client)
        .with_provider_id(PROVIDER_ID)
        .with_capabilities(default_capabilities())
        .with_history_window(30)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ProviderClient;
    use crate::types::{Capability, Usage};

    #[test]
    fn preset_has_own_identity_and_prices() {
        let c = client(default_config().with_api_key("sk-ds"), reqwest::Client::new());
        assert_eq!(c.provider_id(), "deepseek");
        assert!(!c.capabilities().supports(Capability::Vision));
        assert!(c.cost("deepseek-chat", &Usage::new(1_000_000, 0)) > 0.0);
        assert!(c.is_configured());
    }
}
