//! Provider ranking.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::types::{Capability, ProviderMetrics};

/// Criteria for [`super::ProviderRegistry::get_best_provider`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionRequirements {
    pub capabilities: Vec<Capability>,
    pub preferred_providers: Vec<String>,
    pub exclude_providers: Vec<String>,
    /// Drop providers whose last health signal was a failure.
    pub exclude_unhealthy: bool,
}

impl SelectionRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_preferred(mut self, provider_id: impl Into<String>) -> Self {
        self.preferred_providers.push(provider_id.into());
        self
    }

    pub fn with_excluded(mut self, provider_id: impl Into<String>) -> Self {
        self.exclude_providers.push(provider_id.into());
        self
    }

    pub fn excluding_unhealthy(mut self) -> Self {
        self.exclude_unhealthy = true;
        self
    }
}

/// One live, capability-matching instance under consideration.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub id: String,
    pub metrics: ProviderMetrics,
    pub healthy: bool,
}

/// Filter and order candidates; the first survivor wins. Returns `None`
/// when nothing survives. There is no substitution step.
pub(crate) fn choose(mut candidates: Vec<Candidate>, req: &SelectionRequirements) -> Option<String> {
    candidates.retain(|c| !req.exclude_providers.contains(&c.id));
    if req.exclude_unhealthy {
        candidates.retain(|c| c.healthy);
    }
    if candidates
        .iter()
        .any(|c| req.preferred_providers.contains(&c.id))
    {
        candidates.retain(|c| req.preferred_providers.contains(&c.id));
    }
    candidates.sort_by(compare);
    candidates.into_iter().next().map(|c| c.id)
}

/// Success rate descending, then mean latency ascending, then id.
fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    b.metrics
        .success_rate()
        .partial_cmp(&a.metrics.success_rate())
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            a.metrics
                .avg_response_time_ms
                .partial_cmp(&b.metrics.avg_response_time_ms)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.id.cmp(&b.id))
}
