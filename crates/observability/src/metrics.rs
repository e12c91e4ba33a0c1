//! Merge metrics
//!
//! Records per-batch diagnostics from `HandleReport` and aggregates them
//! in memory for the end-of-run summary.

use contracts::{HandleReport, Source};
use metrics::{counter, gauge, histogram};

/// Record metrics for one handled batch.
///
/// `delay_us` is the time between the batch read and the start of `handle`.
///
/// # Example
///
/// ```ignore
/// let report = merger.handle(&batch)?;
/// record_merge_metrics(&report, now_us.saturating_sub(batch.read_time));
/// ```
pub fn record_merge_metrics(report: &HandleReport, delay_us: u64) {
    let source = report.source.to_string();

    histogram!("imu_merger_queue_delay_us").record(delay_us as f64);
    histogram!("imu_merger_batch_size", "source" => source.clone())
        .record(report.sample_count as f64);

    if report.delayed {
        counter!("imu_merger_delayed_batches_total", "source" => source.clone()).increment(1);
    }
    if report.written > 0 {
        counter!("imu_merger_records_written_total", "source" => source.clone())
            .increment(report.written as u64);
    }
    if let Some(index) = report.write_index {
        gauge!("imu_merger_write_index", "source" => source).set(index as f64);
    }
}

/// Record the number of batches waiting between acquisition and the merger
pub fn record_queue_depth(depth: usize) {
    gauge!("imu_merger_queue_depth").set(depth as f64);
}

/// Record a merged half handed to the dispatcher
pub fn record_half_dispatched(sequence: u64, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("imu_merger_halves_dispatched_total", "status" => status).increment(1);
    gauge!("imu_merger_last_sequence").set(sequence as f64);
}

/// In-memory aggregation of handle reports
#[derive(Debug, Clone, Default)]
pub struct MergeMetricsAggregator {
    pub total_batches: u64,
    pub delayed_batches: u64,
    pub records_written: u64,
    pub halves_flushed: u64,
    pub forced_flushes: u64,

    /// Time spent in `handle` (us)
    pub handle_stats: RunningStats,

    /// Read-to-handle delay (us)
    pub delay_stats: RunningStats,

    /// Declared batch sizes, indexed by `Source::index`
    pub batch_sizes: [RunningStats; 2],
}

impl MergeMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, report: &HandleReport, delay_us: u64) {
        self.total_batches += 1;
        if report.delayed {
            self.delayed_batches += 1;
        }
        self.records_written += report.written as u64;
        self.halves_flushed += report.halves_flushed as u64;
        self.forced_flushes += report.forced_flushes as u64;

        self.handle_stats.push(report.handle_us);
        self.delay_stats.push(delay_us as f64);
        self.batch_sizes[report.source.index()].push(report.sample_count as f64);
    }

    pub fn summary(&self) -> MergeSummary {
        MergeSummary {
            total_batches: self.total_batches,
            delayed_batches: self.delayed_batches,
            delayed_rate: if self.total_batches > 0 {
                self.delayed_batches as f64 / self.total_batches as f64 * 100.0
            } else {
                0.0
            },
            records_written: self.records_written,
            halves_flushed: self.halves_flushed,
            forced_flushes: self.forced_flushes,
            handle_us: StatsSummary::from(&self.handle_stats),
            delay_us: StatsSummary::from(&self.delay_stats),
            left_batch_size: StatsSummary::from(&self.batch_sizes[Source::Left.index()]),
            right_batch_size: StatsSummary::from(&self.batch_sizes[Source::Right.index()]),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeSummary {
    pub total_batches: u64,
    pub delayed_batches: u64,
    pub delayed_rate: f64,
    pub records_written: u64,
    pub halves_flushed: u64,
    pub forced_flushes: u64,
    pub handle_us: StatsSummary,
    pub delay_us: StatsSummary,
    pub left_batch_size: StatsSummary,
    pub right_batch_size: StatsSummary,
}

impl std::fmt::Display for MergeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Merge Metrics Summary ===")?;
        writeln!(f, "Batches handled: {}", self.total_batches)?;
        writeln!(
            f,
            "Delayed batches: {} ({:.2}%)",
            self.delayed_batches, self.delayed_rate
        )?;
        writeln!(f, "Records written: {}", self.records_written)?;
        writeln!(
            f,
            "Halves flushed: {} (forced: {})",
            self.halves_flushed, self.forced_flushes
        )?;
        writeln!(f, "Handle time (us): {}", self.handle_us)?;
        writeln!(f, "Queue delay (us): {}", self.delay_us)?;
        writeln!(f, "Left batch size: {}", self.left_batch_size)?;
        writeln!(f, "Right batch size: {}", self.right_batch_size)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean and variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
