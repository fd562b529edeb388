//! Provider registry
//!
//! Owns provider registrations, effective configurations, live instances with
//! their rolling metrics, health status and the capability index. All of it
//! lives behind one mutex; no lock is held across an `.await`, and instance
//! construction happens outside the lock with the result published in a
//! single critical section.

pub mod builtin;
pub mod entry;
pub mod selection;
pub mod status;

pub use entry::{BuildContext, ProviderFactory, ProviderMetadata, ProviderRegistration, SupportLevel};
pub use selection::SelectionRequirements;
pub use status::{ProviderStatus, RegistryStats};

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::{DEFAULT_CONNECT_TIMEOUT_MS, ProviderConfig, ProviderConfigPatch};
use crate::error::{LlmError, affects_health};
use crate::events::{EventBus, ProviderEvent};
use crate::providers::http::build_http_client;
use crate::settings::{
    PROVIDER_KEY_PREFIX, SettingsStore, export_provider_config, import_provider_patch,
    provider_settings_key,
};
use crate::traits::ProviderClient;
use crate::types::{Capabilities, Capability, HealthReport, HealthStatus, ProviderMetrics};
use selection::Candidate;

struct Instance {
    client: Arc<dyn ProviderClient>,
    config: ProviderConfig,
    capabilities: Capabilities,
    metrics: ProviderMetrics,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct RegistryState {
    registrations: BTreeMap<String, ProviderRegistration>,
    /// Explicitly configured providers. Absent means registration defaults.
    configs: BTreeMap<String, ProviderConfig>,
    instances: BTreeMap<String, Instance>,
    health: BTreeMap<String, HealthStatus>,
    capability_index: BTreeMap<Capability, BTreeSet<String>>,
    default_provider: Option<String>,
}

impl RegistryState {
    fn effective_config(&self, provider_id: &str) -> Option<ProviderConfig> {
        self.configs.get(provider_id).cloned().or_else(|| {
            self.registrations
                .get(provider_id)
                .map(|r| r.default_config.clone())
        })
    }

    fn unindex(&mut self, provider_id: &str) {
        for ids in self.capability_index.values_mut() {
            ids.remove(provider_id);
        }
    }

    fn index(&mut self, provider_id: &str, capabilities: &Capabilities) {
        for cap in capabilities.enabled() {
            self.capability_index
                .entry(cap)
                .or_default()
                .insert(provider_id.to_string());
        }
    }

    /// Merge a health report. Returns an event only when connectivity
    /// changed, counting the first report for a provider as a change.
    fn apply_health(&mut self, provider_id: &str, report: &HealthReport) -> Option<ProviderEvent> {
        let status = self.health.entry(provider_id.to_string()).or_default();
        let first_report = status.last_check.is_none();
        let flipped = status.apply(report);
        (flipped || first_report).then(|| ProviderEvent::StatusChanged {
            provider_id: provider_id.to_string(),
            connected: status.connected,
            consecutive_failures: status.consecutive_failures,
            error: status.last_error.clone(),
        })
    }
}

pub struct ProviderRegistry {
    state: Mutex<RegistryState>,
    events: EventBus,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ProviderRegistry")
            .field("registered", &state.registrations.keys().collect::<Vec<_>>())
            .field("live", &state.instances.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new(events: EventBus) -> Result<Self, LlmError> {
        let http_client = build_http_client(Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS))?;
        Ok(Self::with_http_client(events, http_client))
    }

    pub fn with_http_client(events: EventBus, http_client: reqwest::Client) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            events,
            http_client,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ------------------------------------------------------------------
    // Registration and configuration
    // ------------------------------------------------------------------

    /// Register (or replace) a provider type. Live instances are untouched.
    pub fn register(&self, registration: ProviderRegistration) {
        let provider_id = registration.provider_id.clone();
        let replaced = self
            .lock()
            .registrations
            .insert(provider_id.clone(), registration)
            .is_some();
        if replaced {
            tracing::warn!(provider = %provider_id, "provider re-registered; existing instance kept until recreated");
        } else {
            tracing::info!(provider = %provider_id, "provider registered");
        }
        self.events.publish(ProviderEvent::Registered {
            provider_id,
            replaced,
        });
    }

    /// Merge `patch` over the registration defaults. A running instance keeps
    /// its old config until [`Self::create_instance`] is called again.
    pub fn configure(&self, provider_id: &str, patch: &ProviderConfigPatch) -> Result<(), LlmError> {
        let sanitized = {
            let mut state = self.lock();
            let Some(registration) = state.registrations.get(provider_id) else {
                return Err(LlmError::UnknownProvider(provider_id.to_string()));
            };
            let merged = registration.default_config.merged(patch);
            let sanitized = merged.sanitized();
            state.configs.insert(provider_id.to_string(), merged);
            sanitized
        };
        tracing::info!(provider = provider_id, config = %sanitized, "provider configured");
        self.events.publish(ProviderEvent::Configured {
            provider_id: provider_id.to_string(),
        });
        Ok(())
    }

    /// Effective configuration. Contains the credential; never log it
    /// directly, use [`Self::sanitized_config`].
    pub fn config(&self, provider_id: &str) -> Option<ProviderConfig> {
        self.lock().effective_config(provider_id)
    }

    pub fn sanitized_config(&self, provider_id: &str) -> Option<serde_json::Value> {
        self.config(provider_id).map(|c| c.sanitized())
    }

    pub fn metadata(&self, provider_id: &str) -> Option<ProviderMetadata> {
        self.lock()
            .registrations
            .get(provider_id)
            .map(|r| r.metadata.clone())
    }

    pub fn registered_ids(&self) -> Vec<String> {
        self.lock().registrations.keys().cloned().collect()
    }

    pub fn is_registered(&self, provider_id: &str) -> bool {
        self.lock().registrations.contains_key(provider_id)
    }

    /// Remove a registration with its config and live instance. Health
    /// history survives.
    pub fn unregister(&self, provider_id: &str) -> bool {
        let removed = {
            let mut state = self.lock();
            let removed = state.registrations.remove(provider_id).is_some();
            state.configs.remove(provider_id);
            state.instances.remove(provider_id);
            state.unindex(provider_id);
            if state.default_provider.as_deref() == Some(provider_id) {
                state.default_provider = None;
            }
            removed
        };
        if removed {
            tracing::info!(provider = provider_id, "provider unregistered");
            self.events.publish(ProviderEvent::Removed {
                provider_id: provider_id.to_string(),
            });
        }
        removed
    }

    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    /// Build, validate and publish a client from the effective config.
    /// Replaces any previous instance wholesale; its metrics start fresh.
    pub fn create_instance(&self, provider_id: &str) -> Result<Arc<dyn ProviderClient>, LlmError> {
        let (factory, config) = {
            let state = self.lock();
            let Some(registration) = state.registrations.get(provider_id) else {
                return Err(LlmError::UnknownProvider(provider_id.to_string()));
            };
            let config = state
                .effective_config(provider_id)
                .unwrap_or_else(|| registration.default_config.clone());
            (registration.factory.clone(), config)
        };

        let built = self.build_client(provider_id, &factory, &config);
        let client = match built {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(provider = provider_id, error = %e, "provider initialization failed");
                let event = self.lock().apply_health(provider_id, &HealthReport::failed(e.to_string()));
                if let Some(event) = event {
                    self.events.publish(event);
                }
                return Err(e);
            }
        };

        let capabilities = client.capabilities();
        let health_event = {
            let mut state = self.lock();
            state.unindex(provider_id);
            state.index(provider_id, &capabilities);
            state.instances.insert(
                provider_id.to_string(),
                Instance {
                    client: client.clone(),
                    config,
                    capabilities,
                    metrics: ProviderMetrics::default(),
                    created_at: Utc::now(),
                },
            );
            state.apply_health(provider_id, &HealthReport::ok())
        };
        tracing::info!(provider = provider_id, configured = client.is_configured(), "provider instance created");
        self.events.publish(ProviderEvent::Initialized {
            provider_id: provider_id.to_string(),
        });
        if let Some(event) = health_event {
            self.events.publish(event);
        }
        Ok(client)
    }

    fn build_client(
        &self,
        provider_id: &str,
        factory: &Arc<dyn ProviderFactory>,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn ProviderClient>, LlmError> {
        let http_client = if config.connect_timeout_ms == DEFAULT_CONNECT_TIMEOUT_MS {
            self.http_client.clone()
        } else {
            build_http_client(config.connect_timeout())?
        };
        let ctx = BuildContext {
            provider_id: provider_id.to_string(),
            config: config.clone(),
            http_client,
        };
        let client = factory.build(&ctx)?;
        client.validate()?;
        Ok(client)
    }

    /// Drop the live instance only. Registration and config remain.
    pub fn remove_instance(&self, provider_id: &str) -> bool {
        let mut state = self.lock();
        let removed = state.instances.remove(provider_id).is_some();
        state.unindex(provider_id);
        if state.default_provider.as_deref() == Some(provider_id) {
            state.default_provider = None;
        }
        removed
    }

    pub fn client(&self, provider_id: &str) -> Option<Arc<dyn ProviderClient>> {
        self.lock()
            .instances
            .get(provider_id)
            .map(|i| i.client.clone())
    }

    pub fn is_live(&self, provider_id: &str) -> bool {
        self.lock().instances.contains_key(provider_id)
    }

    pub fn live_ids(&self) -> Vec<String> {
        self.lock().instances.keys().cloned().collect()
    }

    /// Live instances with their clients, for probing.
    pub fn live_clients(&self) -> Vec<(String, Arc<dyn ProviderClient>)> {
        self.lock()
            .instances
            .iter()
            .map(|(id, i)| (id.clone(), i.client.clone()))
            .collect()
    }

    pub fn capabilities(&self, provider_id: &str) -> Option<Capabilities> {
        self.lock()
            .instances
            .get(provider_id)
            .map(|i| i.capabilities.clone())
    }

    /// Live providers advertising `capability`.
    pub fn providers_with(&self, capability: Capability) -> Vec<String> {
        self.lock()
            .capability_index
            .get(&capability)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Best live provider for `req`, or `None` for "no route". Never
    /// substitutes a provider outside the filtered set.
    pub fn get_best_provider(&self, req: &SelectionRequirements) -> Option<String> {
        let candidates = {
            let state = self.lock();
            let mut ids: BTreeSet<&String> = state.instances.keys().collect();
            for cap in &req.capabilities {
                let capable = state.capability_index.get(cap);
                ids.retain(|id| capable.is_some_and(|set| set.contains(*id)));
            }
            ids.into_iter()
                .filter_map(|id| {
                    let instance = state.instances.get(id)?;
                    Some(Candidate {
                        id: id.clone(),
                        metrics: instance.metrics.clone(),
                        healthy: state.health.get(id).is_none_or(|h| h.connected),
                    })
                })
                .collect::<Vec<_>>()
        };
        let picked = selection::choose(candidates, req);
        tracing::debug!(requirements = ?req, picked = ?picked, "provider selection");
        picked
    }

    pub fn set_default_provider(&self, provider_id: &str) -> Result<(), LlmError> {
        {
            let mut state = self.lock();
            if !state.registrations.contains_key(provider_id) {
                return Err(LlmError::UnknownProvider(provider_id.to_string()));
            }
            if !state.instances.contains_key(provider_id) {
                return Err(LlmError::ConfigurationError(format!(
                    "provider '{provider_id}' has no live instance"
                )));
            }
            state.default_provider = Some(provider_id.to_string());
        }
        self.events.publish(ProviderEvent::DefaultChanged {
            provider_id: provider_id.to_string(),
        });
        Ok(())
    }

    pub fn default_provider(&self) -> Option<String> {
        self.lock().default_provider.clone()
    }

    // ------------------------------------------------------------------
    // Health and metrics
    // ------------------------------------------------------------------

    pub fn record_health(&self, provider_id: &str, report: &HealthReport) {
        let event = self.lock().apply_health(provider_id, report);
        if !report.connected {
            tracing::warn!(provider = provider_id, error = ?report.error, "provider health check failed");
        }
        if let Some(event) = event {
            self.events.publish(event);
        }
    }

    pub fn health(&self, provider_id: &str) -> Option<HealthStatus> {
        self.lock().health.get(provider_id).cloned()
    }

    pub fn health_map(&self) -> BTreeMap<String, HealthStatus> {
        self.lock().health.clone()
    }

    pub fn metrics(&self, provider_id: &str) -> Option<ProviderMetrics> {
        self.lock()
            .instances
            .get(provider_id)
            .map(|i| i.metrics.clone())
    }

    pub fn record_success(&self, provider_id: &str, elapsed: Duration) {
        let event = {
            let mut state = self.lock();
            let Some(instance) = state.instances.get_mut(provider_id) else {
                return;
            };
            instance.metrics.record_success(elapsed);
            state.apply_health(provider_id, &HealthReport::ok())
        };
        if let Some(event) = event {
            self.events.publish(event);
        }
    }

    /// Count a failed request. Errors that say something about the
    /// provider's reachability also feed health.
    pub fn record_failure(&self, provider_id: &str, error: &LlmError) {
        let event = {
            let mut state = self.lock();
            if let Some(instance) = state.instances.get_mut(provider_id) {
                instance.metrics.record_failure(error.to_string());
            }
            affects_health(error)
                .then(|| state.apply_health(provider_id, &HealthReport::failed(error.to_string())))
                .flatten()
        };
        if let Some(event) = event {
            self.events.publish(event);
        }
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// Per-provider snapshot, sanitized.
    pub fn status(&self) -> Vec<ProviderStatus> {
        let state = self.lock();
        state
            .registrations
            .values()
            .map(|r| {
                let id = &r.provider_id;
                let instance = state.instances.get(id);
                ProviderStatus {
                    id: id.clone(),
                    name: r.metadata.name.clone(),
                    tags: r.metadata.tags.clone(),
                    support_level: r.metadata.support_level,
                    live: instance.is_some(),
                    configured: instance.is_some_and(|i| i.client.is_configured()),
                    is_default: state.default_provider.as_deref() == Some(id.as_str()),
                    config: instance
                        .map(|i| i.config.sanitized())
                        .or_else(|| state.effective_config(id).map(|c| c.sanitized()))
                        .unwrap_or(serde_json::Value::Null),
                    capabilities: instance.map(|i| i.capabilities.clone()),
                    metrics: instance.map(|i| i.metrics.clone()),
                    health: state.health.get(id).cloned(),
                    instance_created_at: instance.map(|i| i.created_at),
                }
            })
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.lock();
        let mut stats = RegistryStats {
            registered: state.registrations.len(),
            configured: state.configs.len(),
            live: state.instances.len(),
            healthy: state.health.values().filter(|h| h.connected).count(),
            default_provider: state.default_provider.clone(),
            ..Default::default()
        };
        for instance in state.instances.values() {
            stats.total_requests += instance.metrics.total_requests;
            stats.total_failures += instance.metrics.failure_count;
        }
        stats
    }

    /// Write every explicitly configured provider's sanitized config to
    /// `store` under `providers.<id>`. Returns the number written.
    pub async fn save_configs(&self, store: &dyn SettingsStore) -> Result<usize, LlmError> {
        let configs: Vec<(String, ProviderConfig)> = self
            .lock()
            .configs
            .iter()
            .map(|(id, c)| (id.clone(), c.clone()))
            .collect();
        for (id, config) in &configs {
            store
                .set(&provider_settings_key(id), export_provider_config(config)?)
                .await?;
        }
        tracing::debug!(count = configs.len(), "provider configs saved");
        Ok(configs.len())
    }

    /// Read stored configs for registered providers and apply them with
    /// [`Self::configure`]. Stored configs carry no credential; a key already
    /// present in memory is kept. Returns the number applied.
    pub async fn load_configs(&self, store: &dyn SettingsStore) -> Result<usize, LlmError> {
        let mut applied = 0;
        for key in store.keys(PROVIDER_KEY_PREFIX).await? {
            let Some(provider_id) = key.strip_prefix(PROVIDER_KEY_PREFIX) else {
                continue;
            };
            if !self.is_registered(provider_id) {
                tracing::debug!(provider = provider_id, "skipping stored config for unregistered provider");
                continue;
            }
            let Some(value) = store.get(&key).await? else {
                continue;
            };
            let mut patch = import_provider_patch(value)?;
            if let Some(current) = self.config(provider_id)
                && let Some(secret) = current.api_key.as_ref()
            {
                patch.api_key = Some(secret.expose_secret().to_string());
            }
            self.configure(provider_id, &patch)?;
            applied += 1;
        }
        Ok(applied)
    }
}
