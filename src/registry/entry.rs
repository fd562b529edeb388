//! Registration records
//!
//! A registration pairs a provider id with the factory that builds its
//! client, the default configuration user patches merge over, and display
//! metadata. Registrations are immutable; replacing one re-registers.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::error::LlmError;
use crate::traits::ProviderClient;

/// Build-time context handed to a [`ProviderFactory`].
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub provider_id: String,
    /// Effective configuration: registration defaults with the user patch
    /// applied.
    pub config: ProviderConfig,
    /// Shared HTTP client. Factories should reuse it rather than building
    /// their own.
    pub http_client: reqwest::Client,
}

/// Constructs a client from configuration. No I/O may happen here; the
/// registry runs `ProviderClient::validate` right after.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, ctx: &BuildContext) -> Result<Arc<dyn ProviderClient>, LlmError>;
}

impl<F> ProviderFactory for F
where
    F: Fn(&BuildContext) -> Result<Arc<dyn ProviderClient>, LlmError> + Send + Sync,
{
    fn build(&self, ctx: &BuildContext) -> Result<Arc<dyn ProviderClient>, LlmError> {
        self(ctx)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportLevel {
    Official,
    #[default]
    Community,
    Experimental,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub support_level: SupportLevel,
}

impl ProviderMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_support_level(mut self, level: SupportLevel) -> Self {
        self.support_level = level;
        self
    }
}

#[derive(Clone)]
pub struct ProviderRegistration {
    pub provider_id: String,
    pub factory: Arc<dyn ProviderFactory>,
    pub default_config: ProviderConfig,
    pub metadata: ProviderMetadata,
}

impl std::fmt::Debug for ProviderRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistration")
            .field("provider_id", &self.provider_id)
            .field("default_config", &self.default_config)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl ProviderRegistration {
    pub fn new(
        provider_id: impl Into<String>,
        factory: impl ProviderFactory + 'static,
        default_config: ProviderConfig,
    ) -> Self {
        let provider_id = provider_id.into();
        Self {
            metadata: ProviderMetadata::new(provider_id.clone()),
            provider_id,
            factory: Arc::new(factory),
            default_config,
        }
    }

    pub fn with_metadata(mut self, metadata: ProviderMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}
