//! Configuration
//!
//! Explicit, typed configuration for every component. All serde-facing
//! structs reject unknown keys so a typo'd setting fails loudly instead of
//! silently passing through.

pub mod provider;
pub mod sanitize;

pub use provider::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_RETRY_ATTEMPTS, DEFAULT_TIMEOUT_MS,
    ProviderConfig, ProviderConfigPatch,
};
pub use sanitize::{SENSITIVE_FIELDS, is_sensitive_key, sanitize_json, sanitized};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::LlmError;
use crate::retry::RetryPolicy;

/// Request orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Ceiling on concurrently executing requests.
    pub max_concurrent_requests: usize,
    /// Capacity of each request's chunk channel.
    pub stream_buffer: usize,
    /// Retry policy for transient failures. `None` disables retries.
    pub retry: Option<RetryPolicy>,
    /// History window used when a provider does not declare its own.
    pub default_history_window: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 3,
            stream_buffer: 32,
            retry: None,
            default_history_window: 20,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_max_concurrent_requests(mut self, n: usize) -> Self {
        self.max_concurrent_requests = n;
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), LlmError> {
        if self.max_concurrent_requests == 0 {
            return Err(LlmError::ConfigurationError(
                "max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.stream_buffer == 0 {
            return Err(LlmError::ConfigurationError(
                "stream_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Periodic connectivity prober settings. Disabled by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthMonitorConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 300,
        }
    }
}

impl HealthMonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub orchestrator: OrchestratorConfig,
    pub health: HealthMonitorConfig,
    /// Per-provider overrides keyed by provider id.
    pub providers: BTreeMap<String, ProviderConfigPatch>,
    pub default_provider: Option<String>,
}

impl CoreConfig {
    pub fn from_json_str(s: &str) -> Result<Self, LlmError> {
        let cfg: CoreConfig = serde_json::from_str(s)
            .map_err(|e| LlmError::ConfigurationError(format!("invalid config: {e}")))?;
        cfg.orchestrator.validate()?;
        Ok(cfg)
    }
}
