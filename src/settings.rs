//! Persisted settings
//!
//! The host application owns durable storage; the core sees it only through
//! [`SettingsStore`]. Provider configuration crosses this boundary in
//! sanitized form in both directions.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::config::{ProviderConfig, ProviderConfigPatch, sanitize_json};
use crate::error::LlmError;

/// Key namespace for per-provider configuration.
pub const PROVIDER_KEY_PREFIX: &str = "providers.";

pub fn provider_settings_key(provider_id: &str) -> String {
    format!("{PROVIDER_KEY_PREFIX}{provider_id}")
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, LlmError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), LlmError>;

    /// Keys currently stored under `prefix`.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, LlmError>;
}

/// In-process store for tests and hosts without persistence.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, LlmError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), LlmError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, LlmError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Serialized, credential-free form of a provider config.
pub fn export_provider_config(config: &ProviderConfig) -> Result<Value, LlmError> {
    let mut value = serde_json::to_value(config.to_public_patch())?;
    sanitize_json(&mut value);
    Ok(value)
}

/// Parse a stored provider config. Sensitive fields are stripped before
/// parsing so a tampered store cannot inject credentials.
pub fn import_provider_patch(mut value: Value) -> Result<ProviderConfigPatch, LlmError> {
    sanitize_json(&mut value);
    serde_json::from_value(value)
        .map_err(|e| LlmError::ConfigurationError(format!("invalid stored provider config: {e}")))
}
