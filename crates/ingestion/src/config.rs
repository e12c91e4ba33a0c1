//! Backpressure configuration and metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use contracts::{BackpressurePolicy, QueueConfig};

/// Backpressure configuration
#[derive(Debug, Clone)]
pub struct BackpressureConfig {
    /// Channel capacity
    pub channel_capacity: usize,

    /// Queue depth above which the consumer counts as behind
    pub backlog_threshold: usize,

    /// Consecutive pushes above the threshold before the policy applies
    pub sustain: u32,

    /// What to do on sustained backlog
    pub policy: BackpressurePolicy,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for BackpressureConfig {
    fn from(queue: &QueueConfig) -> Self {
        Self {
            channel_capacity: queue.capacity,
            backlog_threshold: queue.backlog_threshold,
            sustain: queue.sustain.max(1),
            policy: queue.policy,
        }
    }
}

/// Ingestion metrics
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Batches read from the IMUs
    pub batches_read: AtomicU64,

    /// Records read from the IMUs
    pub records_read: AtomicU64,

    /// Batches handed to the queue
    pub batches_sent: AtomicU64,

    /// Pushes that left the queue above the backlog threshold
    pub backlog_events: AtomicU64,

    /// Ticks that woke up at least one period late
    pub delayed_ticks: AtomicU64,

    /// Records discarded by the startup drain
    pub drained_records: AtomicU64,

    /// Current queue length
    pub queue_len: AtomicUsize,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one read
    pub fn record_read(&self, records: usize) {
        self.batches_read.fetch_add(1, Ordering::Relaxed);
        self.records_read
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    /// Record batch queued
    pub fn record_sent(&self) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record backlog above threshold
    pub fn record_backlog(&self) {
        self.backlog_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Record late tick
    pub fn record_delayed(&self) {
        self.delayed_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record records discarded at startup
    pub fn record_drained(&self, records: usize) {
        self.drained_records
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    /// Update queue length
    pub fn update_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_read: self.batches_read.load(Ordering::Relaxed),
            records_read: self.records_read.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            backlog_events: self.backlog_events.load(Ordering::Relaxed),
            delayed_ticks: self.delayed_ticks.load(Ordering::Relaxed),
            drained_records: self.drained_records.load(Ordering::Relaxed),
            queue_len: self.queue_len.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub batches_read: u64,
    pub records_read: u64,
    pub batches_sent: u64,
    pub backlog_events: u64,
    pub delayed_ticks: u64,
    pub drained_records: u64,
    pub queue_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backpressure_config_from_queue() {
        let queue = QueueConfig {
            capacity: 8,
            backlog_threshold: 3,
            sustain: 0,
            policy: BackpressurePolicy::Warn,
        };
        let config = BackpressureConfig::from(&queue);
        assert_eq!(config.channel_capacity, 8);
        assert_eq!(config.backlog_threshold, 3);
        assert_eq!(config.sustain, 1);
        assert_eq!(config.policy, BackpressurePolicy::Warn);
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = IngestionMetrics::new();
        metrics.record_read(7);
        metrics.record_read(8);
        metrics.record_sent();
        metrics.update_queue_len(4);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_read, 2);
        assert_eq!(snapshot.records_read, 15);
        assert_eq!(snapshot.batches_sent, 1);
        assert_eq!(snapshot.queue_len, 4);
    }
}
