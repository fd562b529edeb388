//! Periodic connectivity prober
//!
//! Calls `test_connection` on every live instance and feeds the results into
//! the registry's health map. Ticks never overlap: a tick that fires while
//! the previous one is still probing is skipped.

use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::HealthMonitorConfig;
use crate::context::CoreContext;
use crate::registry::ProviderRegistry;
use crate::types::HealthReport;

#[derive(Debug)]
pub struct HealthMonitor {
    registry: Arc<ProviderRegistry>,
    config: HealthMonitorConfig,
    running: AtomicBool,
}

/// Resets the running flag when a tick ends, however it ends.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl HealthMonitor {
    pub fn new(ctx: &CoreContext, config: HealthMonitorConfig) -> Self {
        Self {
            registry: ctx.registry.clone(),
            config,
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &HealthMonitorConfig {
        &self.config
    }

    /// Probe every live instance once. Returns the number probed, or `None`
    /// when a previous tick is still running.
    pub async fn tick(&self) -> Option<usize> {
        if self.running.swap(true, Ordering::AcqRel) {
            tracing::debug!("health tick skipped; previous tick still running");
            return None;
        }
        let _guard = TickGuard(&self.running);

        let clients = self.registry.live_clients();
        let probes = clients.iter().map(|(id, client)| async move {
            let result = client.test_connection().await;
            (id, result)
        });
        let results = join_all(probes).await;

        for (provider_id, result) in &results {
            let report = match result {
                Ok(()) => HealthReport::ok(),
                Err(e) => HealthReport::failed(e.to_string()),
            };
            tracing::debug!(provider = %provider_id, connected = report.connected, "health probe");
            self.registry.record_health(provider_id, &report);
        }
        Some(results.len())
    }

    /// Spawn the periodic loop. Returns `None` when monitoring is disabled.
    pub fn start(self: Arc<Self>) -> Option<HealthMonitorHandle> {
        if !self.config.enabled {
            tracing::debug!("health monitor disabled");
            return None;
        }
        let token = CancellationToken::new();
        let child = token.clone();
        let period = self.config.interval();
        tracing::info!(interval_secs = period.as_secs(), "health monitor started");

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; probing starts one period in.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = interval.tick() => {
                        let monitor = self.clone();
                        tokio::spawn(async move { monitor.tick().await });
                    }
                }
            }
            tracing::info!("health monitor stopped");
        });

        Some(HealthMonitorHandle {
            token,
            task: Some(task),
        })
    }
}

/// Stops the monitor loop when asked or dropped.
#[derive(Debug)]
pub struct HealthMonitorHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HealthMonitorHandle {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for HealthMonitorHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
