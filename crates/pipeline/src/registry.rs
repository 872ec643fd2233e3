//! Provider registry with per-provider health tracking.
//!
//! Providers are registered once at startup with a priority (higher is
//! preferred). Every generation result is recorded so the registry can
//! report a health status and build fallback chains that skip providers
//! which keep failing.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::GenerationError;
use crate::provider::VideoProvider;

/// Consecutive failures after which a provider is considered unhealthy.
pub const UNHEALTHY_CONSECUTIVE_FAILURES: u32 = 3;

/// Success rate below which a provider is considered degraded.
pub const DEGRADED_SUCCESS_RATE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    /// No requests recorded yet.
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ProviderMetrics {
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
}

impl ProviderMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successes as f64 / self.total_requests as f64
    }

    fn record(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successes += 1;
            self.consecutive_failures = 0;
        } else {
            self.failures += 1;
            self.consecutive_failures += 1;
        }
    }
}

/// Classify a provider from its metrics and enabled flag.
///
/// - `Unhealthy`: disabled, or at least [`UNHEALTHY_CONSECUTIVE_FAILURES`]
///   consecutive failures
/// - `Degraded`: any consecutive failure, or success rate below
///   [`DEGRADED_SUCCESS_RATE`]
/// - `Unknown`: no requests yet
/// - `Healthy`: otherwise
pub fn classify_health(metrics: &ProviderMetrics, enabled: bool) -> ProviderStatus {
    if !enabled || metrics.consecutive_failures >= UNHEALTHY_CONSECUTIVE_FAILURES {
        ProviderStatus::Unhealthy
    } else if metrics.consecutive_failures >= 1 {
        ProviderStatus::Degraded
    } else if metrics.total_requests == 0 {
        ProviderStatus::Unknown
    } else if metrics.success_rate() < DEGRADED_SUCCESS_RATE {
        ProviderStatus::Degraded
    } else {
        ProviderStatus::Healthy
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct HealthState {
    metrics: ProviderMetrics,
    disabled: bool,
}

struct RegisteredProvider {
    provider: Arc<dyn VideoProvider>,
    priority: i32,
}

/// Snapshot of one provider for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSummary {
    pub name: String,
    pub priority: i32,
    pub max_duration: f64,
    pub status: ProviderStatus,
    pub metrics: ProviderMetrics,
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, RegisteredProvider>,
    default: Option<String>,
    health: RwLock<HashMap<String, HealthState>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name. The first registered
    /// provider becomes the default.
    pub fn register(&mut self, provider: Arc<dyn VideoProvider>, priority: i32) -> &mut Self {
        let name = provider.name().to_string();
        tracing::info!(provider = %name, priority, "Registered video provider");
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.health.get_mut().insert(name.clone(), HealthState::default());
        self.providers
            .insert(name, RegisteredProvider { provider, priority });
        self
    }

    pub fn set_default(&mut self, name: &str) -> Result<(), GenerationError> {
        if !self.providers.contains_key(name) {
            return Err(GenerationError::ProviderNotFound(name.to_string()));
        }
        self.default = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn VideoProvider>> {
        self.providers.get(name).map(|p| Arc::clone(&p.provider))
    }

    /// Provider names ordered by descending priority, then name.
    pub fn names_by_priority(&self) -> Vec<String> {
        let mut entries: Vec<(&String, i32)> = self
            .providers
            .iter()
            .map(|(name, p)| (name, p.priority))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries.into_iter().map(|(name, _)| name.clone()).collect()
    }

    /// Priority-ordered providers other than `exclude` that are not
    /// unhealthy.
    pub async fn fallback_chain(&self, exclude: &str) -> Vec<String> {
        let health = self.health.read().await;
        self.names_by_priority()
            .into_iter()
            .filter(|name| name != exclude)
            .filter(|name| {
                let state = health.get(name).copied().unwrap_or_default();
                classify_health(&state.metrics, !state.disabled) != ProviderStatus::Unhealthy
            })
            .collect()
    }

    pub async fn record_result(&self, name: &str, success: bool) {
        let mut health = self.health.write().await;
        let Some(state) = health.get_mut(name) else {
            return;
        };
        state.metrics.record(success);
        let status = classify_health(&state.metrics, !state.disabled);
        if status == ProviderStatus::Unhealthy && !success {
            tracing::warn!(
                provider = name,
                consecutive_failures = state.metrics.consecutive_failures,
                "Provider marked unhealthy",
            );
        }
    }

    pub async fn status(&self, name: &str) -> Option<ProviderStatus> {
        let health = self.health.read().await;
        health
            .get(name)
            .map(|state| classify_health(&state.metrics, !state.disabled))
    }

    pub async fn metrics(&self, name: &str) -> Option<ProviderMetrics> {
        self.health.read().await.get(name).map(|state| state.metrics)
    }

    /// Returns `false` when the provider is unknown.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut health = self.health.write().await;
        match health.get_mut(name) {
            Some(state) => {
                state.disabled = !enabled;
                tracing::info!(provider = name, enabled, "Provider availability changed");
                true
            }
            None => false,
        }
    }

    pub async fn summaries(&self) -> Vec<ProviderSummary> {
        let health = self.health.read().await;
        self.names_by_priority()
            .into_iter()
            .filter_map(|name| {
                let registered = self.providers.get(&name)?;
                let state = health.get(&name).copied().unwrap_or_default();
                Some(ProviderSummary {
                    priority: registered.priority,
                    max_duration: registered.provider.max_duration(),
                    status: classify_health(&state.metrics, !state.disabled),
                    metrics: state.metrics,
                    name,
                })
            })
            .collect()
    }
}
