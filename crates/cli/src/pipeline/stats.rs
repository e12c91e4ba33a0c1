//! Pipeline statistics.

use std::time::Duration;

use contracts::{MergePhase, Source};
use ingestion::AcquisitionStats;
use observability::MergeMetricsAggregator;
use sync_engine::MergerStats;

/// Why the merger loop ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopReason {
    /// Ctrl+C / SIGTERM
    #[default]
    Signal,
    /// Configured run length elapsed
    Duration,
    /// Configured number of halves flushed
    MaxHalves,
    /// Acquisition closed the batch queue
    SourceClosed,
}

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub stop_reason: StopReason,

    /// Batches taken off the queue
    pub batches_received: u64,

    /// Halves the merger could not hand to the dispatcher
    pub sink_errors: u64,

    pub phase: MergePhase,

    pub reference: Option<Source>,

    /// Left sample period over right sample period
    pub rate_ratio: Option<f64>,

    pub merger: MergerStats,

    pub acquisition: AcquisitionStats,

    pub ingestion: ingestion::MetricsSnapshot,

    /// Halves accepted by the dispatcher channel
    pub halves_sent: u64,

    /// Halves dropped on a full dispatcher channel
    pub halves_dropped: u64,

    /// Dispatcher input checks and final metrics per sink
    pub dispatch: dispatcher::DispatchReport,

    pub merge_metrics: MergeMetricsAggregator,

    pub duration: Duration,
}

impl PipelineStats {
    /// Merged halves per second
    pub fn halves_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.merger.window.halves_flushed as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Stopped by: {:?}", self.stop_reason);
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Batches received: {}", self.batches_received);
        println!(
            "   ├─ Halves flushed: {} ({:.2}/s)",
            self.merger.window.halves_flushed,
            self.halves_per_sec()
        );
        println!(
            "   └─ Halves delivered: {} (dropped: {}, sink errors: {})",
            self.halves_sent, self.halves_dropped, self.sink_errors
        );

        println!("\n📡 Acquisition");
        println!("   ├─ Ticks: {}", self.acquisition.ticks);
        println!(
            "   ├─ Batches: left {}, right {}",
            self.acquisition.left_batches, self.acquisition.right_batches
        );
        println!("   ├─ Records read: {}", self.ingestion.records_read);
        println!("   ├─ Drained at startup: {}", self.acquisition.drained_records);
        println!("   ├─ Delayed ticks: {}", self.acquisition.delayed_ticks);
        println!("   └─ Backlog events: {}", self.ingestion.backlog_events);

        let window = &self.merger.window;
        println!("\n🔀 Merger");
        println!("   ├─ Phase: {:?}", self.phase);
        match self.reference {
            Some(source) => println!("   ├─ Reference: {source}"),
            None => println!("   ├─ Reference: (not chosen)"),
        }
        match self.rate_ratio {
            Some(ratio) => println!("   ├─ Rate ratio (left/right): {ratio:.6}"),
            None => println!("   ├─ Rate ratio (left/right): N/A"),
        }
        println!("   ├─ Forced flushes: {}", window.forced_flushes);
        println!(
            "   ├─ Late drops: {}, overwrites: {}, hold fills: {}",
            window.late_drops, window.overwrites, window.hold_fills
        );
        println!(
            "   ├─ Filtered records: {}, large batches: {}",
            self.merger.filtered_records, self.merger.large_batches
        );

        let summary = self.merge_metrics.summary();
        println!("   ├─ Handle time (us): {}", summary.handle_us);
        println!("   └─ Queue delay (us): {}", summary.delay_us);

        let dispatch = &self.dispatch;
        println!("\n📤 Dispatch");
        println!(
            "   ├─ Received: {}, undelivered: {}, input gaps: {}, index breaks: {}",
            dispatch.halves_received,
            dispatch.undelivered,
            dispatch.input_gaps,
            dispatch.index_breaks
        );
        if dispatch.sinks.is_empty() {
            println!("   └─ No sinks");
        } else {
            for (i, sink) in dispatch.sinks.iter().enumerate() {
                let prefix = if i == dispatch.sinks.len() - 1 { "└─" } else { "├─" };
                let metrics = &sink.metrics;
                println!(
                    "   {} {}: written {}, dropped {}, failed {}, gaps {}",
                    prefix,
                    sink.name,
                    metrics.write_count,
                    metrics.dropped_count,
                    metrics.failure_count,
                    metrics.sequence_gaps
                );
            }
        }

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halves_per_sec() {
        let mut stats = PipelineStats::default();
        assert_eq!(stats.halves_per_sec(), 0.0);

        stats.merger.window.halves_flushed = 400;
        stats.duration = Duration::from_secs(2);
        assert!((stats.halves_per_sec() - 200.0).abs() < 1e-9);
    }
}
