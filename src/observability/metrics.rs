//! In-process metrics for the resilient completion path.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Thread-safe atomic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Thread-safe atomic gauge.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Fixed-bucket histogram.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    bucket_bounds: Vec<f64>,
    // Scaled by 1000 to keep sub-millisecond precision in an integer.
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(bucket_bounds: Vec<f64>) -> Self {
        let buckets = (0..=bucket_bounds.len())
            .map(|_| AtomicU64::new(0))
            .collect();
        Self {
            buckets,
            bucket_bounds,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn default_latency() -> Self {
        Self::new(vec![
            50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
        ])
    }

    pub fn observe(&self, value: f64) {
        let bucket_idx = self
            .bucket_bounds
            .iter()
            .position(|&bound| value <= bound)
            .unwrap_or(self.bucket_bounds.len());

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        self.sum
            .fetch_add((value.max(0.0) * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn bucket_counts(&self) -> Vec<u64> {
        self.buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }

    pub fn sum_ms(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
    }
}

/// Counters for calls routed through the resilience layer.
///
/// A call is one `execute` on the breaker; an attempt is one invocation of
/// the upstream operation. `attempts - calls` approximates retries, but
/// retries are also counted directly from the retry observer.
#[derive(Debug)]
pub struct ResilienceMetrics {
    pub calls_total: Counter,
    pub calls_success: Counter,
    pub calls_failed: Counter,
    pub attempts_total: Counter,
    pub retries_total: Counter,
    pub circuit_rejections: Counter,
    pub in_flight: Gauge,
    pub call_latency_ms: Histogram,
}

impl ResilienceMetrics {
    pub fn new() -> Self {
        Self {
            calls_total: Counter::new(),
            calls_success: Counter::new(),
            calls_failed: Counter::new(),
            attempts_total: Counter::new(),
            retries_total: Counter::new(),
            circuit_rejections: Counter::new(),
            in_flight: Gauge::new(),
            call_latency_ms: Histogram::default_latency(),
        }
    }

    pub fn record_call_start(&self) {
        self.calls_total.inc();
        self.in_flight.inc();
    }

    pub fn record_call_end(&self, success: bool, latency_ms: f64) {
        self.in_flight.dec();
        self.call_latency_ms.observe(latency_ms);
        if success {
            self.calls_success.inc();
        } else {
            self.calls_failed.inc();
        }
    }

    pub fn record_attempt(&self) {
        self.attempts_total.inc();
    }

    pub fn record_retry(&self) {
        self.retries_total.inc();
    }

    pub fn record_rejection(&self) {
        self.circuit_rejections.inc();
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary::from_metrics(self)
    }
}

impl Default for ResilienceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of [`ResilienceMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub total_attempts: u64,
    pub total_retries: u64,
    pub circuit_rejections: u64,
    pub in_flight: i64,
    pub avg_latency_ms: f64,
}

impl MetricsSummary {
    pub fn from_metrics(metrics: &ResilienceMetrics) -> Self {
        let count = metrics.call_latency_ms.count();
        let avg_latency = if count > 0 {
            metrics.call_latency_ms.sum_ms() / count as f64
        } else {
            0.0
        };

        Self {
            total_calls: metrics.calls_total.get(),
            successful_calls: metrics.calls_success.get(),
            failed_calls: metrics.calls_failed.get(),
            total_attempts: metrics.attempts_total.get(),
            total_retries: metrics.retries_total.get(),
            circuit_rejections: metrics.circuit_rejections.get(),
            in_flight: metrics.in_flight.get(),
            avg_latency_ms: avg_latency,
        }
    }
}
