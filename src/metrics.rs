use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Event counters incremented by the pipeline.
pub trait CounterMetrics: Send + Sync {
    fn inc_request(&self);
    fn inc_success(&self);
    fn inc_rate_limited(&self);
    fn inc_timeout(&self);
    fn inc_idempotent_hit(&self);
}

pub trait LatencyMetrics: Send + Sync {
    fn observe_latency(&self, elapsed: Duration);
}

pub trait SnapshotMetrics: Send + Sync {
    fn snapshot(&self) -> MetricsSnapshot;
}

/// Every metric capability the gateway uses.
pub trait Metrics: CounterMetrics + LatencyMetrics + SnapshotMetrics {}

impl<T: CounterMetrics + LatencyMetrics + SnapshotMetrics> Metrics for T {}

/// Aggregate figures for the metrics endpoint. Worker figures are filled in
/// from the dispatcher by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub successes_total: u64,
    pub rate_limited_total: u64,
    pub timeouts_total: u64,
    pub idempotent_hits_total: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub active_workers: u64,
    pub queue_depth: u64,
}

/// Lock-free in-process metrics.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    requests: AtomicU64,
    successes: AtomicU64,
    rate_limited: AtomicU64,
    timeouts: AtomicU64,
    idempotent_hits: AtomicU64,
    latency_nanos: AtomicU64,
    latency_samples: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterMetrics for GatewayMetrics {
    fn inc_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_idempotent_hit(&self) {
        self.idempotent_hits.fetch_add(1, Ordering::Relaxed);
    }
}

impl LatencyMetrics for GatewayMetrics {
    fn observe_latency(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.latency_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }
}

impl SnapshotMetrics for GatewayMetrics {
    fn snapshot(&self) -> MetricsSnapshot {
        let requests_total = self.requests.load(Ordering::Relaxed);
        let successes_total = self.successes.load(Ordering::Relaxed);
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let nanos = self.latency_nanos.load(Ordering::Relaxed);

        let success_rate = if requests_total == 0 {
            0.0
        } else {
            successes_total as f64 / requests_total as f64
        };
        let avg_latency_ms = if samples == 0 {
            0.0
        } else {
            nanos as f64 / samples as f64 / 1_000_000.0
        };

        MetricsSnapshot {
            requests_total,
            successes_total,
            rate_limited_total: self.rate_limited.load(Ordering::Relaxed),
            timeouts_total: self.timeouts.load(Ordering::Relaxed),
            idempotent_hits_total: self.idempotent_hits.load(Ordering::Relaxed),
            success_rate,
            avg_latency_ms,
            active_workers: 0,
            queue_depth: 0,
        }
    }
}

/// Metrics sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl CounterMetrics for NoopMetrics {
    fn inc_request(&self) {}
    fn inc_success(&self) {}
    fn inc_rate_limited(&self) {}
    fn inc_timeout(&self) {}
    fn inc_idempotent_hit(&self) {}
}

impl LatencyMetrics for NoopMetrics {
    fn observe_latency(&self, _elapsed: Duration) {}
}

impl SnapshotMetrics for NoopMetrics {
    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let snapshot = GatewayMetrics::new().snapshot();
        assert_eq!(snapshot, MetricsSnapshot::default());
    }

    #[test]
    fn test_counters_and_rates() {
        let metrics = GatewayMetrics::new();
        for _ in 0..4 {
            metrics.inc_request();
        }
        metrics.inc_success();
        metrics.inc_success();
        metrics.inc_success();
        metrics.inc_rate_limited();
        metrics.inc_timeout();
        metrics.inc_idempotent_hit();
        metrics.observe_latency(Duration::from_millis(10));
        metrics.observe_latency(Duration::from_millis(30));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 4);
        assert_eq!(snapshot.successes_total, 3);
        assert_eq!(snapshot.rate_limited_total, 1);
        assert_eq!(snapshot.timeouts_total, 1);
        assert_eq!(snapshot.idempotent_hits_total, 1);
        assert!((snapshot.success_rate - 0.75).abs() < f64::EPSILON);
        assert!((snapshot.avg_latency_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(GatewayMetrics::new().snapshot()).unwrap();
        assert_eq!(json["requests_total"], 0);
        assert!(json.get("queue_depth").is_some());
    }
}
