//! Read-only registry snapshots.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::entry::SupportLevel;
use crate::types::{Capabilities, HealthStatus, ProviderMetrics};

/// One provider as seen from outside the registry. `config` is sanitized.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub support_level: SupportLevel,
    pub live: bool,
    pub configured: bool,
    pub is_default: bool,
    pub config: serde_json::Value,
    pub capabilities: Option<Capabilities>,
    pub metrics: Option<ProviderMetrics>,
    pub health: Option<HealthStatus>,
    pub instance_created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub registered: usize,
    pub configured: usize,
    pub live: usize,
    pub healthy: usize,
    pub total_requests: u64,
    pub total_failures: u64,
    pub default_provider: Option<String>,
}
