//! Rolling per-provider metrics and health status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rolling request metrics owned by a live provider instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetrics {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Mean latency of successful requests.
    pub avg_response_time_ms: f64,
    pub last_error: Option<String>,
}

impl ProviderMetrics {
    /// Fraction of successful requests. A provider with no history ranks as
    /// fully successful so fresh instances are not starved.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.success_count as f64 / self.total_requests as f64
        }
    }

    pub fn record_success(&mut self, elapsed: Duration) {
        self.total_requests += 1;
        self.success_count += 1;
        let sample = elapsed.as_secs_f64() * 1000.0;
        self.avg_response_time_ms +=
            (sample - self.avg_response_time_ms) / self.success_count as f64;
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.total_requests += 1;
        self.failure_count += 1;
        self.last_error = Some(error.into());
    }
}

/// Connectivity signal for one provider id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub connected: bool,
    pub consecutive_failures: u32,
    pub last_check: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl HealthStatus {
    /// Merge one probe result. Returns `true` when `connected` flipped.
    pub fn apply(&mut self, report: &HealthReport) -> bool {
        let was_connected = self.connected;
        self.last_check = Some(Utc::now());
        if report.connected {
            self.connected = true;
            self.consecutive_failures = 0;
            self.last_error = None;
        } else {
            self.connected = false;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.last_error = report.error.clone();
        }
        was_connected != self.connected
    }
}

/// Input to `ProviderRegistry::record_health`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub connected: bool,
    pub error: Option<String>,
}

impl HealthReport {
    pub fn ok() -> Self {
        Self {
            connected: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            connected: false,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_and_latency_roll_forward() {
        let mut m = ProviderMetrics::default();
        assert_eq!(m.success_rate(), 1.0);
        m.record_success(Duration::from_millis(400));
        m.record_success(Duration::from_millis(600));
        m.record_failure("boom");
        assert!((m.success_rate() - 2.0 / 3.0).abs() < 1e-9);
        assert!((m.avg_response_time_ms - 500.0).abs() < 1e-6);
        assert_eq!(m.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn health_counts_consecutive_failures() {
        let mut h = HealthStatus::default();
        assert!(h.apply(&HealthReport::ok()));
        for _ in 0..3 {
            h.apply(&HealthReport::failed("down"));
        }
        assert_eq!(h.consecutive_failures, 3);
        assert!(!h.connected);
        assert!(h.apply(&HealthReport::ok()));
        assert_eq!(h.consecutive_failures, 0);
    }
}
