//! Bundled provider registrations
//!
//! One factory per bundled backend, each behind its cargo feature.

use std::sync::Arc;

#[allow(unused_imports)]
use super::entry::{BuildContext, ProviderMetadata, ProviderRegistration, SupportLevel};
use super::ProviderRegistry;
#[allow(unused_imports)]
use crate::error::LlmError;
#[allow(unused_imports)]
use crate::traits::ProviderClient;

#[cfg(feature = "openai")]
pub fn openai() -> ProviderRegistration {
    use crate::providers::openai;
    ProviderRegistration::new(
        "openai",
        |ctx: &BuildContext| -> Result<Arc<dyn ProviderClient>, LlmError> {
            Ok(Arc::new(
                openai::OpenAiClient::new(ctx.config.clone(), ctx.http_client.clone())
                    .with_provider_id(ctx.provider_id.clone()),
            ))
        },
        openai::default_config(),
    )
    .with_metadata(
        ProviderMetadata::new("OpenAI")
            .with_tags(["hosted", "vision", "tools"])
            .with_support_level(SupportLevel::Official),
    )
}

#[cfg(feature = "openai")]
pub fn deepseek() -> ProviderRegistration {
    use crate::providers::deepseek;
    ProviderRegistration::new(
        deepseek::PROVIDER_ID,
        |ctx: &BuildContext| -> Result<Arc<dyn ProviderClient>, LlmError> {
            Ok(Arc::new(
                deepseek::client(ctx.config.clone(), ctx.http_client.clone())
                    .with_provider_id(ctx.provider_id.clone()),
            ))
        },
        deepseek::default_config(),
    )
    .with_metadata(
        ProviderMetadata::new("DeepSeek")
            .with_tags(["hosted", "openai-compatible"])
            .with_support_level(SupportLevel::Community),
    )
}

#[cfg(feature = "anthropic")]
pub fn anthropic() -> ProviderRegistration {
    use crate::providers::anthropic;
    ProviderRegistration::new(
        anthropic::client::PROVIDER_ID,
        |ctx: &BuildContext| -> Result<Arc<dyn ProviderClient>, LlmError> {
            Ok(Arc::new(anthropic::AnthropicClient::new(
                ctx.config.clone(),
                ctx.http_client.clone(),
            )))
        },
        anthropic::default_config(),
    )
    .with_metadata(
        ProviderMetadata::new("Anthropic")
            .with_tags(["hosted", "vision", "tools"])
            .with_support_level(SupportLevel::Official),
    )
}

#[cfg(feature = "google")]
pub fn gemini() -> ProviderRegistration {
    use crate::providers::gemini;
    ProviderRegistration::new(
        gemini::client::PROVIDER_ID,
        |ctx: &BuildContext| -> Result<Arc<dyn ProviderClient>, LlmError> {
            Ok(Arc::new(gemini::GeminiClient::new(
                ctx.config.clone(),
                ctx.http_client.clone(),
            )))
        },
        gemini::default_config(),
    )
    .with_metadata(
        ProviderMetadata::new("Google Gemini")
            .with_tags(["hosted", "vision", "long-context"])
            .with_support_level(SupportLevel::Official),
    )
}

#[cfg(feature = "ollama")]
pub fn ollama() -> ProviderRegistration {
    use crate::providers::ollama;
    ProviderRegistration::new(
        ollama::client::PROVIDER_ID,
        |ctx: &BuildContext| -> Result<Arc<dyn ProviderClient>, LlmError> {
            Ok(Arc::new(ollama::OllamaClient::new(
                ctx.config.clone(),
                ctx.http_client.clone(),
            )))
        },
        ollama::default_config(),
    )
    .with_metadata(
        ProviderMetadata::new("Ollama")
            .with_tags(["local"])
            .with_support_level(SupportLevel::Community),
    )
}

/// Every registration compiled into this build.
pub fn builtin_registrations() -> Vec<ProviderRegistration> {
    #[allow(unused_mut)]
    let mut out = Vec::new();
    #[cfg(feature = "openai")]
    {
        out.push(openai());
        out.push(deepseek());
    }
    #[cfg(feature = "anthropic")]
    out.push(anthropic());
    #[cfg(feature = "google")]
    out.push(gemini());
    #[cfg(feature = "ollama")]
    out.push(ollama());
    out
}

/// Register the bundled providers. Returns the ids registered.
pub fn register_builtin_providers(registry: &ProviderRegistry) -> Vec<String> {
    builtin_registrations()
        .into_iter()
        .map(|registration| {
            let id = registration.provider_id.clone();
            registry.register(registration);
            id
        })
        .collect()
}
