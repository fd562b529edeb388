//! Shared handles passed to every component at construction.

use std::sync::Arc;

use crate::config::CoreConfig;
use crate::error::LlmError;
use crate::events::EventBus;
use crate::registry::{ProviderRegistry, builtin::register_builtin_providers};

/// Registry handle plus event sink. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CoreContext {
    pub registry: Arc<ProviderRegistry>,
    pub events: EventBus,
}

impl CoreContext {
    /// Empty registry with its own event bus.
    pub fn new() -> Result<Self, LlmError> {
        let events = EventBus::new();
        let registry = Arc::new(ProviderRegistry::new(events.clone())?);
        Ok(Self { registry, events })
    }

    pub fn with_registry(registry: Arc<ProviderRegistry>) -> Self {
        let events = registry.events().clone();
        Self { registry, events }
    }

    /// Register the bundled providers, apply every configured patch and
    /// create an instance for each configured provider.
    ///
    /// A provider that fails to initialize is logged and left without an
    /// instance; its failure is visible through the registry's health map.
    pub fn from_config(config: &CoreConfig) -> Result<Self, LlmError> {
        let ctx = Self::new()?;
        register_builtin_providers(&ctx.registry);
        for (provider_id, patch) in &config.providers {
            ctx.registry.configure(provider_id, patch)?;
            if let Err(e) = ctx.registry.create_instance(provider_id) {
                tracing::warn!(provider = %provider_id, error = %e, "skipping provider that failed to initialize");
            }
        }
        if let Some(default) = &config.default_provider {
            ctx.registry.set_default_provider(default)?;
        }
        Ok(ctx)
    }
}
