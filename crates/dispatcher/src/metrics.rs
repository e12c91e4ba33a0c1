//! Sink metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Metrics for a single sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Current queue length
    queue_len: AtomicUsize,
    /// Halves written
    write_count: AtomicU64,
    /// Write failures
    failure_count: AtomicU64,
    /// Halves dropped because the queue was full
    dropped_count: AtomicU64,
    /// Sequence of the last half written, plus one (0 = none yet)
    next_sequence: AtomicU64,
    /// Halves missing between consecutive writes
    sequence_gaps: AtomicU64,
    /// Periodic flushes
    flush_count: AtomicU64,
}

impl SinkMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    /// Record a successful write of half `sequence`
    pub fn record_write(&self, sequence: u64) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        let expected = self.next_sequence.swap(sequence + 1, Ordering::Relaxed);
        if expected != 0 && sequence > expected {
            self.sequence_gaps
                .fetch_add(sequence - expected, Ordering::Relaxed);
        }
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sequence_gaps(&self) -> u64 {
        self.sequence_gaps.load(Ordering::Relaxed)
    }

    pub fn flush_count(&self) -> u64 {
        self.flush_count.load(Ordering::Relaxed)
    }

    pub fn inc_flush_count(&self) {
        self.flush_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            write_count: self.write_count(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
            sequence_gaps: self.sequence_gaps(),
            flush_count: self.flush_count(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub write_count: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
    pub sequence_gaps: u64,
    pub flush_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_gaps() {
        let metrics = SinkMetrics::new();
        metrics.record_write(0);
        metrics.record_write(1);
        metrics.record_write(4);
        metrics.record_write(5);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.write_count, 4);
        assert_eq!(snapshot.sequence_gaps, 2);
    }

    #[test]
    fn test_first_write_is_not_a_gap() {
        let metrics = SinkMetrics::new();
        metrics.record_write(7);
        assert_eq!(metrics.sequence_gaps(), 0);
    }
}
