//! Per-provider performance tracking with exponential smoothing.
//!
//! Backed by [`DashMap`]: an update holds only its provider's shard lock for
//! the read-modify-write, so concurrent updates to one provider never lose
//! samples and updates to different providers rarely contend.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Smoothing factor for every moving average.
pub const EMA_ALPHA: f64 = 0.1;

/// Smoothed statistics for one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderPerformance {
    pub success_rate: f64,
    /// Seconds.
    pub avg_response_time: f64,
    pub avg_cost_efficiency: f64,
    pub request_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl Default for ProviderPerformance {
    /// Neutral starting point for a provider with no history.
    fn default() -> Self {
        Self {
            success_rate: 1.0,
            avg_response_time: 1.0,
            avg_cost_efficiency: 1.0,
            request_count: 0,
            last_updated: Utc::now(),
        }
    }
}

fn ema(old: f64, sample: f64) -> f64 {
    (1.0 - EMA_ALPHA) * old + EMA_ALPHA * sample
}

impl ProviderPerformance {
    fn apply(&mut self, response_time: f64, success: bool, cost_efficiency: f64) {
        self.avg_response_time = ema(self.avg_response_time, response_time);
        self.avg_cost_efficiency = ema(self.avg_cost_efficiency, cost_efficiency);
        self.success_rate = ema(self.success_rate, if success { 1.0 } else { 0.0 });
        self.request_count += 1;
        self.last_updated = Utc::now();
    }
}

/// Process-wide performance tracker keyed by lowercase provider name.
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    stats: DashMap<String, ProviderPerformance>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one completed request into the provider's averages.
    ///
    /// Unknown providers get a neutral record first. Returns the updated stats.
    /// A sample with a non-finite time or efficiency is dropped, leaving the
    /// averages as they were.
    pub fn update(
        &self,
        provider_name: &str,
        response_time: f64,
        success: bool,
        cost_efficiency: f64,
    ) -> ProviderPerformance {
        if !response_time.is_finite() || !cost_efficiency.is_finite() {
            tracing::warn!(
                provider = %provider_name,
                response_time,
                cost_efficiency,
                "Ignoring non-finite performance sample"
            );
            return self.get(provider_name);
        }

        let mut entry = self.stats.entry(provider_name.to_lowercase()).or_default();
        let perf = entry.value_mut();
        perf.apply(response_time, success, cost_efficiency);

        tracing::debug!(
            provider = %provider_name,
            success_rate = perf.success_rate,
            avg_response_time = perf.avg_response_time,
            avg_cost_efficiency = perf.avg_cost_efficiency,
            request_count = perf.request_count,
            "Updated provider performance"
        );

        perf.clone()
    }

    /// Current stats, or neutral defaults if the provider has never been seen.
    pub fn get(&self, provider_name: &str) -> ProviderPerformance {
        self.stats
            .get(&provider_name.to_lowercase())
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Snapshot of every tracked provider, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, ProviderPerformance)> {
        let mut all: Vec<(String, ProviderPerformance)> = self
            .stats
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
