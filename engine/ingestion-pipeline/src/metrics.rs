// Metrics collection for the ingestion pipeline

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Metrics collector for pipeline monitoring
#[derive(Debug)]
pub struct PipelineMetrics {
    // Admission metrics
    pub events_submitted_total: AtomicCounter,
    pub events_rejected_total: AtomicCounter,
    pub events_queued_total: AtomicCounter,
    pub events_overflowed_total: AtomicCounter,
    pub events_evicted_total: AtomicCounter,
    pub events_dropped_total: AtomicCounter,
    pub overflow_store_failures: AtomicCounter,

    // Consumer metrics
    pub events_processed_total: AtomicCounter,
    pub handler_failures_total: AtomicCounter,
    pub handler_latency: AtomicHistogram,

    // Recovery metrics
    pub events_recovered_total: AtomicCounter,
    pub recovery_failures_total: AtomicCounter,

    // Queue metrics
    pub queue_depth: AtomicGauge,
    pub queue_capacity: AtomicGauge,

    pub uptime_start: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            events_submitted_total: AtomicCounter::new(),
            events_rejected_total: AtomicCounter::new(),
            events_queued_total: AtomicCounter::new(),
            events_overflowed_total: AtomicCounter::new(),
            events_evicted_total: AtomicCounter::new(),
            events_dropped_total: AtomicCounter::new(),
            overflow_store_failures: AtomicCounter::new(),
            events_processed_total: AtomicCounter::new(),
            handler_failures_total: AtomicCounter::new(),
            // 1000 buckets of 1ms
            handler_latency: AtomicHistogram::with_buckets(1000, 1_000_000),
            events_recovered_total: AtomicCounter::new(),
            recovery_failures_total: AtomicCounter::new(),
            queue_depth: AtomicGauge::new(),
            queue_capacity: AtomicGauge::new(),
            uptime_start: Instant::now(),
        }
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.uptime_start.elapsed()
    }

    /// Point-in-time copy of every metric
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_submitted_total: self.events_submitted_total.get(),
            events_rejected_total: self.events_rejected_total.get(),
            events_queued_total: self.events_queued_total.get(),
            events_overflowed_total: self.events_overflowed_total.get(),
            events_evicted_total: self.events_evicted_total.get(),
            events_dropped_total: self.events_dropped_total.get(),
            overflow_store_failures: self.overflow_store_failures.get(),
            events_processed_total: self.events_processed_total.get(),
            handler_failures_total: self.handler_failures_total.get(),
            handler_latency_p50_ns: self.handler_latency.percentile(50.0),
            handler_latency_p99_ns: self.handler_latency.percentile(99.0),
            events_recovered_total: self.events_recovered_total.get(),
            recovery_failures_total: self.recovery_failures_total.get(),
            queue_depth: self.queue_depth.get(),
            queue_capacity: self.queue_capacity.get(),
            uptime_seconds: self.uptime().as_secs(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable metrics view
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub events_submitted_total: u64,
    pub events_rejected_total: u64,
    pub events_queued_total: u64,
    pub events_overflowed_total: u64,
    pub events_evicted_total: u64,
    pub events_dropped_total: u64,
    pub overflow_store_failures: u64,
    pub events_processed_total: u64,
    pub handler_failures_total: u64,
    pub handler_latency_p50_ns: u64,
    pub handler_latency_p99_ns: u64,
    pub events_recovered_total: u64,
    pub recovery_failures_total: u64,
    pub queue_depth: u64,
    pub queue_capacity: u64,
    pub uptime_seconds: u64,
}

/// Thread-safe atomic counter
#[derive(Debug)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    pub fn new() -> Self {
        Self { value: AtomicU64::new(0) }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe atomic gauge
#[derive(Debug)]
pub struct AtomicGauge {
    value: AtomicU64,
}

impl AtomicGauge {
    pub fn new() -> Self {
        Self { value: AtomicU64::new(0) }
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for AtomicGauge {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe bucketed histogram
#[derive(Debug)]
pub struct AtomicHistogram {
    buckets: Vec<AtomicU64>,
    bucket_size: u64,
    max_value: u64,
}

impl AtomicHistogram {
    pub fn with_buckets(bucket_count: usize, bucket_size: u64) -> Self {
        let bucket_count = bucket_count.max(1);
        let buckets = (0..bucket_count).map(|_| AtomicU64::new(0)).collect();

        Self { buckets, bucket_size, max_value: (bucket_count as u64) * bucket_size }
    }

    pub fn record(&self, value: u64) {
        let bucket_index = if value >= self.max_value {
            self.buckets.len() - 1
        } else {
            (value / self.bucket_size) as usize
        };

        self.buckets[bucket_index].fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_count(&self) -> u64 {
        self.buckets.iter().map(|bucket| bucket.load(Ordering::Relaxed)).sum()
    }

    pub fn percentile(&self, p: f64) -> u64 {
        let total = self.total_count();
        if total == 0 {
            return 0;
        }

        let target = ((total as f64 * p / 100.0).ceil() as u64).max(1);
        let mut count = 0;

        for (i, bucket) in self.buckets.iter().enumerate() {
            count += bucket.load(Ordering::Relaxed);
            if count >= target {
                return (i as u64) * self.bucket_size;
            }
        }

        self.max_value
    }
}
