//! In-memory request metrics with per-provider and per-hour rollups.
//!
//! The request log sits behind a single `RwLock`: `record_request` appends
//! under the write lock and `prune` swaps in a filtered vector under the same
//! lock, so a sweep can never drop a concurrent append. Provider aggregates and
//! hourly buckets live in `DashMap`s and are updated per key.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::router::ComplexityLevel;

const SECONDS_PER_HOUR: i64 = 3600;

/// Provider name recorded for requests that no provider was eligible to serve.
pub const UNROUTED_PROVIDER: &str = "unrouted";

/// One completed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestMetric {
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub success: bool,
    /// Seconds.
    pub response_time: f64,
    /// USD.
    pub cost: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub complexity_level: ComplexityLevel,
    pub error_kind: Option<String>,
}

impl RequestMetric {
    /// A metric stamped with the current time and no token counts.
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        success: bool,
        response_time: f64,
        cost: f64,
        complexity_level: ComplexityLevel,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            provider: provider.into(),
            model: model.into(),
            success,
            response_time,
            cost,
            input_tokens: 0,
            output_tokens: 0,
            complexity_level,
            error_kind: None,
        }
    }

    pub fn with_tokens(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self
    }

    pub fn with_error(mut self, kind: impl Into<String>) -> Self {
        self.error_kind = Some(kind.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Count of requests per complexity level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComplexityDistribution {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

impl ComplexityDistribution {
    fn bump(&mut self, level: ComplexityLevel) {
        match level {
            ComplexityLevel::Low => self.low += 1,
            ComplexityLevel::Medium => self.medium += 1,
            ComplexityLevel::High => self.high += 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ProviderAggregate {
    name: String,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    total_response_time: f64,
    total_cost: f64,
    total_tokens: u64,
    last_request: Option<DateTime<Utc>>,
    error_counts: BTreeMap<String, u64>,
}

/// Rollup of every request that landed in one clock hour.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HourlyBucket {
    pub requests: u64,
    pub successes: u64,
    pub total_cost: f64,
    pub total_response_time: f64,
    pub providers: BTreeMap<String, u64>,
    pub complexity: ComplexityDistribution,
}

/// Whole-system view over the retained request log.
#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    /// Seconds since the aggregator was created.
    pub uptime: f64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub total_cost: f64,
    pub cost_savings: f64,
    pub cost_savings_percentage: f64,
    pub active_providers: usize,
    pub complexity_distribution: ComplexityDistribution,
    pub requests_last_hour: u64,
}

/// Lifetime statistics for one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderMetrics {
    pub name: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub avg_cost_per_request: f64,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub error_breakdown: BTreeMap<String, u64>,
}

impl ProviderMetrics {
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            success_rate: 0.0,
            avg_response_time: 0.0,
            avg_cost_per_request: 0.0,
            total_cost: 0.0,
            total_tokens: 0,
            last_used: None,
            error_breakdown: BTreeMap::new(),
        }
    }
}

impl From<&ProviderAggregate> for ProviderMetrics {
    fn from(agg: &ProviderAggregate) -> Self {
        let n = agg.total_requests;
        Self {
            name: agg.name.clone(),
            total_requests: n,
            successful_requests: agg.successful_requests,
            failed_requests: agg.failed_requests,
            success_rate: ratio(agg.successful_requests as f64, n),
            avg_response_time: ratio(agg.total_response_time, n),
            avg_cost_per_request: ratio(agg.total_cost, n),
            total_cost: agg.total_cost,
            total_tokens: agg.total_tokens,
            last_used: agg.last_request,
            error_breakdown: agg.error_counts.clone(),
        }
    }
}

/// What a retention pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub metrics_removed: usize,
    pub buckets_removed: usize,
}

fn ratio(numerator: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        numerator / count as f64
    }
}

fn hour_key(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp().div_euclid(SECONDS_PER_HOUR)
}

/// Collects completed-request metrics and serves rolled-up views of them.
#[derive(Debug)]
pub struct MetricsAggregator {
    started: Instant,
    retention: Duration,
    premium_cost_per_request: f64,
    log: RwLock<Vec<RequestMetric>>,
    providers: DashMap<String, ProviderAggregate>,
    hourly: DashMap<i64, HourlyBucket>,
    complexity: [AtomicU64; 3],
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(24, 0.002)
    }
}

impl MetricsAggregator {
    pub fn new(retention_hours: u32, premium_cost_per_request: f64) -> Self {
        Self {
            started: Instant::now(),
            retention: Duration::hours(i64::from(retention_hours)),
            premium_cost_per_request,
            log: RwLock::new(Vec::new()),
            providers: DashMap::new(),
            hourly: DashMap::new(),
            complexity: Default::default(),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    fn read_log(&self) -> RwLockReadGuard<'_, Vec<RequestMetric>> {
        self.log.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_log(&self) -> RwLockWriteGuard<'_, Vec<RequestMetric>> {
        self.log.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a completed request and fold it into every rollup.
    pub fn record_request(&self, metric: RequestMetric) {
        {
            let mut agg = self
                .providers
                .entry(metric.provider.to_lowercase())
                .or_insert_with(|| ProviderAggregate {
                    name: metric.provider.clone(),
                    ..Default::default()
                });
            agg.total_requests += 1;
            agg.total_response_time += metric.response_time;
            agg.total_cost += metric.cost;
            agg.total_tokens += metric.input_tokens + metric.output_tokens;
            agg.last_request = Some(metric.timestamp);
            if metric.success {
                agg.successful_requests += 1;
            } else {
                agg.failed_requests += 1;
                if let Some(kind) = &metric.error_kind {
                    *agg.error_counts.entry(kind.clone()).or_insert(0) += 1;
                }
            }
        }

        {
            let mut bucket = self.hourly.entry(hour_key(metric.timestamp)).or_default();
            bucket.requests += 1;
            bucket.total_cost += metric.cost;
            bucket.total_response_time += metric.response_time;
            *bucket.providers.entry(metric.provider.clone()).or_insert(0) += 1;
            bucket.complexity.bump(metric.complexity_level);
            if metric.success {
                bucket.successes += 1;
            }
        }

        self.complexity[metric.complexity_level.index()].fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            provider = %metric.provider,
            success = metric.success,
            response_time = metric.response_time,
            cost = metric.cost,
            "Recorded request metric"
        );

        self.write_log().push(metric);
    }

    pub fn complexity_distribution(&self) -> ComplexityDistribution {
        let load = |level: ComplexityLevel| self.complexity[level.index()].load(Ordering::Relaxed);
        ComplexityDistribution {
            low: load(ComplexityLevel::Low),
            medium: load(ComplexityLevel::Medium),
            high: load(ComplexityLevel::High),
        }
    }

    /// Totals over the retained log, as of `now`.
    pub fn system_metrics_at(&self, now: DateTime<Utc>) -> SystemMetrics {
        let one_hour_ago = now - Duration::hours(1);
        let (total, successful, total_cost, total_time, last_hour) = {
            let log = self.read_log();
            log.iter().fold((0u64, 0u64, 0.0, 0.0, 0u64), |acc, m| {
                (
                    acc.0 + 1,
                    acc.1 + u64::from(m.success),
                    acc.2 + m.cost,
                    acc.3 + m.response_time,
                    acc.4 + u64::from(m.timestamp > one_hour_ago),
                )
            })
        };

        let premium_cost = total as f64 * self.premium_cost_per_request;
        let cost_savings = (premium_cost - total_cost).max(0.0);
        let cost_savings_percentage = if premium_cost > 0.0 {
            cost_savings / premium_cost * 100.0
        } else {
            0.0
        };

        SystemMetrics {
            uptime: self.started.elapsed().as_secs_f64(),
            total_requests: total,
            successful_requests: successful,
            failed_requests: total - successful,
            success_rate: ratio(successful as f64, total),
            avg_response_time: ratio(total_time, total),
            total_cost,
            cost_savings,
            cost_savings_percentage,
            active_providers: self
                .providers
                .iter()
                .filter(|agg| agg.key() != UNROUTED_PROVIDER)
                .count(),
            complexity_distribution: self.complexity_distribution(),
            requests_last_hour: last_hour,
        }
    }

    pub fn system_metrics(&self) -> SystemMetrics {
        self.system_metrics_at(Utc::now())
    }

    /// Stats for one provider; zeroed if it has never been recorded.
    pub fn provider_metrics(&self, name: &str) -> ProviderMetrics {
        self.providers
            .get(&name.to_lowercase())
            .map(|agg| ProviderMetrics::from(agg.value()))
            .unwrap_or_else(|| ProviderMetrics::empty(name))
    }

    /// Stats for every name that has been recorded, sorted by name. Includes
    /// [`UNROUTED_PROVIDER`] once a request has gone unserved.
    pub fn all_provider_metrics(&self) -> Vec<ProviderMetrics> {
        let mut all: Vec<ProviderMetrics> = self
            .providers
            .iter()
            .map(|agg| ProviderMetrics::from(agg.value()))
            .collect();
        all.sort_by_key(|m| m.name.to_lowercase());
        all
    }

    /// Hourly buckets keyed by the UTC start of their hour, oldest first.
    pub fn hourly_snapshot(&self) -> Vec<(DateTime<Utc>, HourlyBucket)> {
        let mut buckets: Vec<(i64, HourlyBucket)> = self
            .hourly
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        buckets.sort_by_key(|(hour, _)| *hour);
        buckets
            .into_iter()
            .filter_map(|(hour, bucket)| {
                DateTime::from_timestamp(hour * SECONDS_PER_HOUR, 0).map(|start| (start, bucket))
            })
            .collect()
    }

    /// Drop log entries and hourly buckets older than the retention window.
    ///
    /// Idempotent for a given `now`; provider aggregates and the complexity
    /// distribution are lifetime counters and are left alone.
    pub fn prune(&self, now: DateTime<Utc>) -> PruneReport {
        let cutoff = now - self.retention;

        let metrics_removed = {
            let mut log = self.write_log();
            let before = log.len();
            let kept: Vec<RequestMetric> = std::mem::take(&mut *log)
                .into_iter()
                .filter(|m| m.timestamp > cutoff)
                .collect();
            *log = kept;
            before - log.len()
        };

        let cutoff_hour = hour_key(cutoff);
        let before = self.hourly.len();
        self.hourly.retain(|hour, _| *hour >= cutoff_hour);
        let buckets_removed = before.saturating_sub(self.hourly.len());

        PruneReport {
            metrics_removed,
            buckets_removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(provider: &str, success: bool, cost: f64) -> RequestMetric {
        RequestMetric::new(provider, "gpt-4o", success, 1.5, cost, ComplexityLevel::Medium)
            .with_tokens(100, 50)
    }

    #[test]
    fn test_empty_aggregator() {
        let agg = MetricsAggregator::default();
        let sys = agg.system_metrics();
        assert_eq!(sys.total_requests, 0);
        assert_eq!(sys.success_rate, 0.0);
        assert_eq!(sys.avg_response_time, 0.0);
        assert_eq!(sys.cost_savings, 0.0);
        assert_eq!(sys.cost_savings_percentage, 0.0);
        assert_eq!(sys.active_providers, 0);
    }

    #[test]
    fn test_system_metrics_totals() {
        let agg = MetricsAggregator::default();
        agg.record_request(metric("alpha", true, 0.001));
        agg.record_request(metric("alpha", false, 0.0).with_error("timeout"));
        agg.record_request(metric("beta", true, 0.0005));

        let sys = agg.system_metrics();
        assert_eq!(sys.total_requests, 3);
        assert_eq!(sys.successful_requests, 2);
        assert_eq!(sys.failed_requests, 1);
        assert!((sys.success_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((sys.avg_response_time - 1.5).abs() < 1e-12);
        assert!((sys.total_cost - 0.0015).abs() < 1e-12);
        assert!((sys.cost_savings - 0.0045).abs() < 1e-12);
        assert!((sys.cost_savings_percentage - 75.0).abs() < 1e-9);
        assert_eq!(sys.active_providers, 2);
        assert_eq!(sys.requests_last_hour, 3);
        assert_eq!(sys.complexity_distribution.medium, 3);
    }

    #[test]
    fn test_savings_floor_at_zero() {
        let agg = MetricsAggregator::default();
        agg.record_request(metric("pricey", true, 0.05));
        let sys = agg.system_metrics();
        assert_eq!(sys.cost_savings, 0.0);
        assert_eq!(sys.cost_savings_percentage, 0.0);
    }

    #[test]
    fn test_provider_metrics() {
        let agg = MetricsAggregator::default();
        agg.record_request(metric("Alpha", true, 0.002));
        agg.record_request(metric("alpha", false, 0.0).with_error("rate_limited"));
        agg.record_request(metric("alpha", false, 0.0).with_error("rate_limited"));

        let pm = agg.provider_metrics("ALPHA");
        assert_eq!(pm.name, "Alpha");
        assert_eq!(pm.total_requests, 3);
        assert_eq!(pm.successful_requests, 1);
        assert_eq!(pm.failed_requests, 2);
        assert_eq!(pm.total_tokens, 450);
        assert!((pm.avg_cost_per_request - 0.002 / 3.0).abs() < 1e-12);
        assert_eq!(pm.error_breakdown.get("rate_limited"), Some(&2));
        assert!(pm.last_used.is_some());
    }

    #[test]
    fn test_unrouted_requests_are_not_an_active_provider() {
        let agg = MetricsAggregator::default();
        agg.record_request(metric("alpha", true, 0.001));
        agg.record_request(
            metric(UNROUTED_PROVIDER, false, 0.0).with_error("no_provider_available"),
        );

        let sys = agg.system_metrics();
        assert_eq!(sys.total_requests, 2);
        assert_eq!(sys.failed_requests, 1);
        assert_eq!(sys.active_providers, 1);

        let all = agg.all_provider_metrics();
        let names: Vec<&str> = all.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", UNROUTED_PROVIDER]);
        assert_eq!(all[1].error_breakdown.get("no_provider_available"), Some(&1));
    }

    #[test]
    fn test_unknown_provider_is_zeroed() {
        let agg = MetricsAggregator::default();
        let pm = agg.provider_metrics("ghost");
        assert_eq!(pm.name, "ghost");
        assert_eq!(pm.total_requests, 0);
        assert_eq!(pm.success_rate, 0.0);
        assert!(pm.last_used.is_none());
        assert!(pm.error_breakdown.is_empty());
    }

    #[test]
    fn test_hourly_buckets() {
        let agg = MetricsAggregator::default();
        let base = DateTime::from_timestamp(10 * 3600 + 120, 0).unwrap();
        agg.record_request(metric("alpha", true, 0.001).at(base));
        agg.record_request(metric("beta", false, 0.0).at(base + Duration::minutes(5)));
        agg.record_request(metric("alpha", true, 0.001).at(base + Duration::hours(1)));

        let hours = agg.hourly_snapshot();
        assert_eq!(hours.len(), 2);
        assert_eq!(hours[0].0.timestamp(), 10 * 3600);
        assert_eq!(hours[0].1.requests, 2);
        assert_eq!(hours[0].1.successes, 1);
        assert_eq!(hours[0].1.providers.get("beta"), Some(&1));
        assert_eq!(hours[1].1.requests, 1);
    }

    #[test]
    fn test_prune_respects_retention_window() {
        let agg = MetricsAggregator::default();
        let now = Utc::now();
        agg.record_request(metric("alpha", true, 0.001).at(now - Duration::hours(25)));
        agg.record_request(metric("alpha", true, 0.001).at(now - Duration::hours(1)));

        let report = agg.prune(now);
        assert_eq!(report.metrics_removed, 1);
        assert_eq!(report.buckets_removed, 1);

        let sys = agg.system_metrics_at(now);
        assert_eq!(sys.total_requests, 1);
        // lifetime counters survive pruning
        assert_eq!(agg.provider_metrics("alpha").total_requests, 2);
        assert_eq!(sys.complexity_distribution.medium, 2);

        assert_eq!(agg.prune(now), PruneReport::default());
    }

    #[test]
    fn test_prune_never_drops_concurrent_appends() {
        use std::sync::Arc;

        const WRITERS: usize = 4;
        const PER_WRITER: usize = 500;

        let agg = Arc::new(MetricsAggregator::default());
        let stale = Utc::now() - Duration::hours(30);
        for _ in 0..100 {
            agg.record_request(metric("old", true, 0.0).at(stale));
        }

        let writers: Vec<_> = (0..WRITERS)
            .map(|i| {
                let agg = agg.clone();
                std::thread::spawn(move || {
                    let name = format!("writer-{i}");
                    for _ in 0..PER_WRITER {
                        agg.record_request(metric(&name, true, 0.0));
                    }
                })
            })
            .collect();

        let sweeper = {
            let agg = agg.clone();
            std::thread::spawn(move || {
                let mut removed = 0;
                for _ in 0..200 {
                    removed += agg.prune(Utc::now()).metrics_removed;
                    std::thread::yield_now();
                }
                removed
            })
        };

        for handle in writers {
            handle.join().unwrap();
        }
        let removed = sweeper.join().unwrap() + agg.prune(Utc::now()).metrics_removed;

        assert_eq!(removed, 100);
        let sys = agg.system_metrics();
        assert_eq!(sys.total_requests, (WRITERS * PER_WRITER) as u64);
        for i in 0..WRITERS {
            let pm = agg.provider_metrics(&format!("writer-{i}"));
            assert_eq!(pm.total_requests, PER_WRITER as u64);
        }
    }
}
