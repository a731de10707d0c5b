//! Refresh metrics collection and reporting
//!
//! Tracks latency percentiles and success rate of refresh cycles, and which
//! route (direct or relay) served each successful request.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum number of samples to keep for metrics calculation
const MAX_SAMPLES: usize = 100;

/// Metrics for the refresh loop
#[derive(Debug, Clone)]
pub struct RefreshMetrics {
    /// 50th percentile latency of successful refreshes, in milliseconds
    pub latency_p50_ms: f64,
    /// 99th percentile latency of successful refreshes, in milliseconds
    pub latency_p99_ms: f64,
    /// Success rate (0.0 to 1.0)
    pub success_rate: f64,
    pub total_refreshes: u64,
    pub failed_refreshes: u64,
    pub routes: RouteStats,
}

impl RefreshMetrics {
    /// Creates metrics with no data
    pub fn empty(routes: RouteStats) -> Self {
        Self {
            latency_p50_ms: 0.0,
            latency_p99_ms: 0.0,
            success_rate: 1.0,
            total_refreshes: 0,
            failed_refreshes: 0,
            routes,
        }
    }
}

/// Snapshot of the client's route counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteStats {
    /// Requests answered by the upstream directly
    pub direct_hits: u64,
    /// Requests answered through a relay
    pub proxy_hits: u64,
    /// Individual attempts that failed (direct or relay)
    pub failed_attempts: u64,
}

/// Lock-free counters updated by the client on every attempt
#[derive(Debug, Default)]
pub struct RouteCounters {
    direct_hits: AtomicU64,
    proxy_hits: AtomicU64,
    failed_attempts: AtomicU64,
}

impl RouteCounters {
    pub fn record_direct_hit(&self) {
        self.direct_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_proxy_hit(&self) {
        self.proxy_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_attempt(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RouteStats {
        RouteStats {
            direct_hits: self.direct_hits.load(Ordering::Relaxed),
            proxy_hits: self.proxy_hits.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
        }
    }
}

/// Internal sample for latency tracking
#[derive(Debug, Clone)]
struct LatencySample {
    duration_ms: f64,
    success: bool,
}

/// Collects and computes metrics for refresh cycles
pub struct MetricsCollector {
    /// Rolling window of latency samples
    samples: Arc<RwLock<VecDeque<LatencySample>>>,
    /// Total refreshes (lifetime)
    total: AtomicU64,
    /// Failed refreshes (lifetime)
    failed: AtomicU64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            samples: Arc::new(RwLock::new(VecDeque::with_capacity(MAX_SAMPLES))),
            total: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Records a refresh with its duration and outcome
    pub async fn record_refresh(&self, duration: Duration, success: bool) {
        let duration_ms = duration.as_secs_f64() * 1000.0;

        self.total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        let mut samples = self.samples.write().await;
        if samples.len() >= MAX_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(LatencySample {
            duration_ms,
            success,
        });
    }

    /// Computes current metrics from collected samples
    pub async fn get_metrics(&self, routes: RouteStats) -> RefreshMetrics {
        let samples = self.samples.read().await;
        let total = self.total.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);

        if samples.is_empty() {
            return RefreshMetrics::empty(routes);
        }

        let mut latencies: Vec<f64> = samples
            .iter()
            .filter(|s| s.success)
            .map(|s| s.duration_ms)
            .collect();

        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let success_rate = if total > 0 {
            (total - failed) as f64 / total as f64
        } else {
            1.0
        };

        RefreshMetrics {
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p99_ms: percentile(&latencies, 99.0),
            success_rate,
            total_refreshes: total,
            failed_refreshes: failed,
            routes,
        }
    }
}

/// Calculate percentile from sorted values
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_collector() {
        let collector = MetricsCollector::new();

        collector.record_refresh(Duration::from_millis(100), true).await;
        collector.record_refresh(Duration::from_millis(200), true).await;
        collector.record_refresh(Duration::from_millis(150), false).await;

        let metrics = collector.get_metrics(RouteStats::default()).await;

        assert_eq!(metrics.total_refreshes, 3);
        assert_eq!(metrics.failed_refreshes, 1);
        assert!(metrics.success_rate > 0.6 && metrics.success_rate < 0.7);
        assert!(metrics.latency_p50_ms >= 100.0);
    }

    #[test]
    fn test_percentile() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0];
        assert_eq!(percentile(&values, 50.0), 6.0);
        assert_eq!(percentile(&values, 99.0), 11.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_route_counters() {
        let counters = RouteCounters::default();
        counters.record_direct_hit();
        counters.record_proxy_hit();
        counters.record_proxy_hit();
        counters.record_failed_attempt();
        assert_eq!(
            counters.snapshot(),
            RouteStats {
                direct_hits: 1,
                proxy_hits: 2,
                failed_attempts: 1
            }
        );
    }
}
