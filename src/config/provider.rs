//! Per-provider configuration
//!
//! `ProviderConfig` is the fully-resolved form handed to a provider factory.
//! `ProviderConfigPatch` is the partial, serde-facing form used for user input
//! and persisted settings; merging applies `patch > defaults`.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::sanitize::sanitize_json;

pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;

/// Resolved configuration for one provider.
#[derive(Clone)]
pub struct ProviderConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub api_version: Option<String>,
    pub default_model: String,
    /// Deadline for a completion call. For streams it bounds the wait for
    /// response headers and then each silence between body reads.
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Deadline for `test_connection`; kept shorter than `timeout_ms`.
    pub probe_timeout_ms: u64,
    /// Upper bound on retries of transient failures.
    pub retry_attempts: u32,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            base_url: base_url.into(),
            api_version: None,
            default_model: default_model.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// The credential, if one is set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_ref()
            .map(|k| k.expose_secret())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.min(self.timeout_ms))
    }

    /// Base URL without a trailing slash.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Apply `patch` on top of `self`. Fields absent from the patch keep
    /// their current value.
    pub fn merged(&self, patch: &ProviderConfigPatch) -> ProviderConfig {
        let mut out = self.clone();
        if let Some(key) = &patch.api_key {
            out.api_key = Some(SecretString::from(key.clone()));
        }
        if let Some(v) = &patch.base_url {
            out.base_url = v.clone();
        }
        if let Some(v) = &patch.api_version {
            out.api_version = Some(v.clone());
        }
        if let Some(v) = &patch.default_model {
            out.default_model = v.clone();
        }
        if let Some(v) = patch.timeout_ms {
            out.timeout_ms = v;
        }
        if let Some(v) = patch.connect_timeout_ms {
            out.connect_timeout_ms = v;
        }
        if let Some(v) = patch.probe_timeout_ms {
            out.probe_timeout_ms = v;
        }
        if let Some(v) = patch.retry_attempts {
            out.retry_attempts = v;
        }
        out
    }

    /// Patch form of this config with the credential dropped. Used for
    /// persistence.
    pub fn to_public_patch(&self) -> ProviderConfigPatch {
        ProviderConfigPatch {
            api_key: None,
            base_url: Some(self.base_url.clone()),
            api_version: self.api_version.clone(),
            default_model: Some(self.default_model.clone()),
            timeout_ms: Some(self.timeout_ms),
            connect_timeout_ms: Some(self.connect_timeout_ms),
            probe_timeout_ms: Some(self.probe_timeout_ms),
            retry_attempts: Some(self.retry_attempts),
        }
    }

    /// Snapshot safe to log, export or show in a status view.
    pub fn sanitized(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "base_url": self.base_url,
            "api_version": self.api_version,
            "default_model": self.default_model,
            "timeout_ms": self.timeout_ms,
            "connect_timeout_ms": self.connect_timeout_ms,
            "probe_timeout_ms": self.probe_timeout_ms,
            "retry_attempts": self.retry_attempts,
            "has_api_key": self.has_api_key(),
        });
        sanitize_json(&mut value);
        value
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("default_model", &self.default_model)
            .field("timeout_ms", &self.timeout_ms)
            .field("retry_attempts", &self.retry_attempts)
            .finish()
    }
}

/// Partial provider configuration. Unknown keys are rejected.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfigPatch {
    /// Accepted on input, never serialized.
    #[serde(default, skip_serializing, alias = "apiKey")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "baseUrl")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "apiVersion")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "defaultModel")]
    pub default_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "timeoutMs")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "connectTimeoutMs")]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "probeTimeoutMs")]
    pub probe_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "retryAttempts")]
    pub retry_attempts: Option<u32>,
}

impl ProviderConfigPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }
}

impl fmt::Debug for ProviderConfigPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfigPatch")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("default_model", &self.default_model)
            .field("timeout_ms", &self.timeout_ms)
            .field("retry_attempts", &self.retry_attempts)
            .finish()
    }
}
