//! Request metrics collection and retention.

pub mod aggregator;
pub mod retention;

pub use aggregator::{
    ComplexityDistribution, HourlyBucket, MetricsAggregator, ProviderMetrics, PruneReport,
    RequestMetric, SystemMetrics, UNROUTED_PROVIDER,
};
pub use retention::RetentionSweep;
