//! Periodic retention sweep for the metrics aggregator.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::aggregator::MetricsAggregator;

/// Handle to a running retention sweep.
///
/// The sweep ticks every `every`, starting one period after spawn, and runs
/// until [`RetentionSweep::shutdown`] is called or the handle is dropped.
#[derive(Debug)]
pub struct RetentionSweep {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RetentionSweep {
    pub fn spawn(aggregator: Arc<MetricsAggregator>, every: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            // A late sweep is as good as an on-time one; never burst to catch up.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = aggregator.prune(Utc::now());
                        tracing::info!(
                            metrics_removed = report.metrics_removed,
                            buckets_removed = report.buckets_removed,
                            retention_hours = aggregator.retention().num_hours(),
                            "Metrics retention sweep complete"
                        );
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::debug!("Metrics retention sweep stopped");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the sweep and wait for the task to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Metrics retention sweep task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RequestMetric;
    use crate::router::ComplexityLevel;

    const HOUR: Duration = Duration::from_secs(3600);

    fn metric_aged(hours: i64) -> RequestMetric {
        RequestMetric::new("alpha", "gpt-4o", true, 1.0, 0.001, ComplexityLevel::Low)
            .at(Utc::now() - chrono::Duration::hours(hours))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_prunes_expired_metrics() {
        let aggregator = Arc::new(MetricsAggregator::default());
        aggregator.record_request(metric_aged(25));
        aggregator.record_request(metric_aged(1));

        let sweep = RetentionSweep::spawn(aggregator.clone(), HOUR);
        settle().await;
        // nothing happens before the first period elapses
        assert_eq!(aggregator.system_metrics().total_requests, 2);

        tokio::time::sleep(HOUR + Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(aggregator.system_metrics().total_requests, 1);

        sweep.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_sweep() {
        let aggregator = Arc::new(MetricsAggregator::default());
        let sweep = RetentionSweep::spawn(aggregator.clone(), HOUR);
        sweep.shutdown().await;

        aggregator.record_request(metric_aged(30));
        tokio::time::sleep(HOUR * 3).await;
        settle().await;
        assert_eq!(aggregator.system_metrics().total_requests, 1);
    }
}
