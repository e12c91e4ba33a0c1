//! Two-IMU merger.
//!
//! Feeds each batch to its tracker, picks the faster IMU as the timing
//! reference, resamples the other IMU onto the reference sample instants and
//! assembles both into the ping-pong window.

use std::time::Instant;

use contracts::{
    Batch, ContractError, HandleReport, MergePhase, MergeSink, MergerConfig, Sample, SensorTag,
    Source, MAX_BATCH_RECORDS,
};
use serde::Serialize;
use tracing::instrument;

use crate::pingpong::{PingPong, PingPongStats, SlotWrite};
use crate::tracker::SensorTracker;

/// Cumulative merger counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MergerStats {
    pub left_batches: u64,
    pub right_batches: u64,
    pub filtered_records: u64,
    pub large_batches: u64,
    pub sink_errors: u64,
    pub window: PingPongStats,
}

#[derive(Debug, Default)]
struct FillOutcome {
    written: usize,
    flushed: usize,
    forced: usize,
    sink_errors: usize,
    /// First sink failure; later halves are still delivered
    sink_error: Option<ContractError>,
}

impl FillOutcome {
    fn absorb(&mut self, other: FillOutcome) {
        self.written += other.written;
        self.flushed += other.flushed;
        self.forced += other.forced;
        self.sink_errors += other.sink_errors;
        if self.sink_error.is_none() {
            self.sink_error = other.sink_error;
        }
    }

    fn sink_failed(&mut self, error: ContractError) {
        self.sink_errors += 1;
        if self.sink_error.is_none() {
            self.sink_error = Some(error);
        }
    }
}

/// Merges batches from two IMUs into [`MergedHalf`](contracts::MergedHalf)s
/// delivered to `S`.
#[derive(Debug)]
pub struct Merger<S: MergeSink> {
    config: MergerConfig,
    trackers: [SensorTracker; 2],
    phase: MergePhase,
    last_source: Option<Source>,
    window: Option<PingPong>,
    sink: S,
    stats: MergerStats,
}

impl<S: MergeSink> Merger<S> {
    pub fn new(config: MergerConfig, sink: S) -> Self {
        let trackers = [
            SensorTracker::new(Source::Left, &config),
            SensorTracker::new(Source::Right, &config),
        ];
        Self {
            config,
            trackers,
            phase: MergePhase::WarmingUp,
            last_source: None,
            window: None,
            sink,
            stats: MergerStats::default(),
        }
    }

    /// Process one batch.
    ///
    /// # Errors
    /// - `MergerHalted` after an earlier integrity violation
    /// - `DuplicateSource` / `OversizedBatch`: integrity violations, the merger halts
    /// - the first sink error of the call is returned after the whole batch
    ///   has been written; the merger keeps running
    #[instrument(
        name = "merger_handle",
        skip(self, batch),
        fields(source = %batch.source, read_time = batch.read_time, count = batch.sample_count)
    )]
    pub fn handle(&mut self, batch: &Batch) -> Result<HandleReport, ContractError> {
        let started = Instant::now();
        let source = batch.source;

        if self.phase == MergePhase::Halted {
            return Err(ContractError::MergerHalted);
        }
        if self.last_source == Some(source) {
            tracing::warn!(source = %source, read_time = batch.read_time, "duplicate consecutive batch, halting merger");
            return Err(self.halt(ContractError::DuplicateSource { source_id: source }));
        }
        if batch.is_oversized() {
            tracing::warn!(
                source = %source,
                sample_count = batch.sample_count,
                max = MAX_BATCH_RECORDS,
                "oversized batch, halting merger"
            );
            return Err(self.halt(ContractError::oversized_batch(
                source,
                batch.sample_count as usize,
                MAX_BATCH_RECORDS,
            )));
        }
        if batch.len() > self.config.large_batch_warning {
            self.stats.large_batches += 1;
            tracing::warn!(source = %source, sample_count = batch.len(), "large batch, acquisition is falling behind");
        }
        self.last_source = Some(source);

        let accel = batch.filter_tag(SensorTag::Accelerometer);
        self.stats.filtered_records += (batch.len() - accel.len()) as u64;
        self.trackers[source.index()].update(&accel)?;
        match source {
            Source::Left => self.stats.left_batches += 1,
            Source::Right => self.stats.right_batches += 1,
        }

        let before = self.phase;
        self.advance_phase();

        let mut write_index = None;
        let mut outcome = FillOutcome::default();
        if let MergePhase::Merging(reference) = self.phase {
            if !before.is_merging() {
                let (index, activation) = self.activate(source, reference);
                write_index = index;
                outcome = activation;
            } else if !accel.is_empty() {
                let (first_index, resampled) = self.placement(source, reference);
                write_index = Some(first_index);
                outcome = self.fill(source, first_index, resampled.samples());
            }
        }

        let handle_us = started.elapsed().as_secs_f64() * 1e6;
        self.record_metrics(source, handle_us, &outcome);

        if let Some(error) = outcome.sink_error {
            return Err(error);
        }
        Ok(HandleReport {
            source,
            sample_count: batch.sample_count as usize,
            accel_count: accel.len(),
            read_time: batch.read_time,
            delayed: batch.delayed,
            phase: self.phase,
            write_index,
            written: outcome.written,
            halves_flushed: outcome.flushed,
            forced_flushes: outcome.forced,
            handle_us,
        })
    }

    fn halt(&mut self, error: ContractError) -> ContractError {
        self.phase = MergePhase::Halted;
        metrics::counter!("merger_integrity_faults_total").increment(1);
        error
    }

    fn advance_phase(&mut self) {
        let [left, right] = &self.trackers;
        let seen = left.batches_seen().min(right.batches_seen());

        if self.phase.is_merging() || self.phase == MergePhase::Halted {
            return;
        }
        if seen > self.config.reference_after_batches && left.has_fit() && right.has_fit() {
            let reference = if left.slope() < right.slope() {
                Source::Left
            } else {
                Source::Right
            };
            if self.phase.reference() != Some(reference) {
                tracing::info!(
                    reference = %reference,
                    left_period_us = left.slope(),
                    right_period_us = right.slope(),
                    "reference imu selected"
                );
            }
            self.phase = MergePhase::ReferenceChosen(reference);
        }
        if let MergePhase::ReferenceChosen(reference) = self.phase {
            if seen >= self.config.warmup_batches {
                tracing::info!(reference = %reference, batches = seen, "merging started");
                self.phase = MergePhase::Merging(reference);
            }
        }
    }

    /// First write index and records of one side's current batch.
    fn placement(&self, source: Source, reference: Source) -> (i64, Batch) {
        let tracker = &self.trackers[source.index()];
        if source == reference {
            (tracker.first_count(), tracker.current().clone())
        } else {
            let projection = tracker.project(self.trackers[reference.index()].fitter());
            (projection.first_index, projection.batch)
        }
    }

    /// Open the merge window and write both sides' current batches.
    ///
    /// Both sides drop the records that fall before the later of the two
    /// starting indices.
    fn activate(&mut self, source: Source, reference: Source) -> (Option<i64>, FillOutcome) {
        let (other_first, other_batch) = self.placement(source.other(), reference);
        let (own_first, own_batch) = self.placement(source, reference);
        let origin = other_first.max(own_first);
        self.window = Some(PingPong::new(origin));

        tracing::debug!(
            origin,
            left_first = if source == Source::Left { own_first } else { other_first },
            right_first = if source == Source::Right { own_first } else { other_first },
            "merge window opened"
        );

        let mut outcome = FillOutcome::default();
        let (other_samples, other_start) = skip_below(origin, other_first, other_batch.samples());
        outcome.absorb(self.fill(source.other(), other_start, other_samples));
        let (own_samples, own_start) = skip_below(origin, own_first, own_batch.samples());
        outcome.absorb(self.fill(source, own_start, own_samples));

        let write_index = if own_samples.is_empty() {
            None
        } else {
            Some(own_start)
        };
        (write_index, outcome)
    }

    /// Write one side's records at consecutive reference indices.
    ///
    /// Every record is written even when the sink rejects a half on the way.
    fn fill(&mut self, source: Source, first_index: i64, samples: &[Sample]) -> FillOutcome {
        let mut outcome = FillOutcome::default();
        let Some(window) = self.window.as_mut() else {
            return outcome;
        };

        for (offset, sample) in samples.iter().enumerate() {
            let index = first_index + offset as i64;
            loop {
                match window.put(source, index, sample.axes) {
                    SlotWrite::NoRoom => {
                        let (half, lagging) = window.force_flush();
                        tracing::warn!(
                            writer = %source,
                            lagging = ?lagging,
                            first_index = half.first_index,
                            "merge window overrun, flushing half with held values"
                        );
                        outcome.forced += 1;
                        outcome.flushed += 1;
                        if let Err(e) = self.sink.accept(&half) {
                            outcome.sink_failed(e);
                        }
                    }
                    SlotWrite::Late => break,
                    _ => {
                        outcome.written += 1;
                        break;
                    }
                }
            }
            while let Some(half) = window.take_ready() {
                outcome.flushed += 1;
                if let Err(e) = self.sink.accept(&half) {
                    outcome.sink_failed(e);
                }
            }
        }
        outcome
    }

    fn record_metrics(&mut self, source: Source, handle_us: f64, outcome: &FillOutcome) {
        metrics::counter!("merger_batches_total", "source" => source.as_str()).increment(1);
        metrics::histogram!("merger_handle_us").record(handle_us);
        if outcome.flushed > 0 {
            metrics::counter!("merger_halves_flushed_total").increment(outcome.flushed as u64);
        }
        if outcome.forced > 0 {
            metrics::counter!("merger_forced_flushes_total").increment(outcome.forced as u64);
        }
        if outcome.sink_errors > 0 {
            self.stats.sink_errors += outcome.sink_errors as u64;
            metrics::counter!("merger_sink_errors_total").increment(outcome.sink_errors as u64);
        }

        if let Some(window) = &self.window {
            let window_stats = window.stats();
            metrics::gauge!("merger_late_drops").set(window_stats.late_drops as f64);
            metrics::gauge!("merger_overwrites").set(window_stats.overwrites as f64);
            metrics::gauge!("merger_hold_fills").set(window_stats.hold_fills as f64);
            self.stats.window = window_stats;
        }
        if let MergePhase::Merging(reference) = self.phase {
            let reference_slope = self.trackers[reference.index()].slope();
            let other_slope = self.trackers[reference.other().index()].slope();
            metrics::gauge!("merger_rate_ratio").set(reference_slope / other_slope);
        }
    }

    pub fn phase(&self) -> MergePhase {
        self.phase
    }

    pub fn reference(&self) -> Option<Source> {
        self.phase.reference()
    }

    pub fn tracker(&self, source: Source) -> &SensorTracker {
        &self.trackers[source.index()]
    }

    pub fn stats(&self) -> MergerStats {
        self.stats
    }

    pub fn config(&self) -> &MergerConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

fn skip_below(origin: i64, first_index: i64, samples: &[Sample]) -> (&[Sample], i64) {
    let skip = ((origin - first_index).max(0) as usize).min(samples.len());
    (&samples[skip..], first_index + skip as i64)
}
