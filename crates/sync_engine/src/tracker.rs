//! Per-IMU sample clock tracking and projection onto another IMU's time base.

use contracts::{Batch, ContractError, MergerConfig, Sample, Source, AXES, MAX_BATCH_RECORDS};
use tracing::instrument;

use crate::fitter::DecayingFitter;

/// Reference fractions this close to an integer count as that instant.
const INSTANT_EPSILON: f64 = 1e-6;

/// A batch resampled onto the reference stream's sampling instants.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// Reference sample count of `batch.records[0]`
    pub first_index: i64,
    /// Resampled records
    pub batch: Batch,
}

/// Tracks one IMU: its sample clock and the batch currently being merged.
///
/// Sample counts are cumulative over the run. Sample number `c` (1-based)
/// completes at `fitter.time_for(c)`; the records of the current batch are
/// numbers `base_count + 1 ..= base_count + len`.
#[derive(Debug, Clone)]
pub struct SensorTracker {
    source: Source,
    fitter: DecayingFitter,
    current: Batch,
    /// Last sample of the previous batch
    anchor: Sample,
    /// Samples strictly before the current batch
    base_count: i64,
    batches_seen: u64,
}

impl SensorTracker {
    pub fn new(source: Source, config: &MergerConfig) -> Self {
        Self {
            source,
            fitter: DecayingFitter::new(config.decay_alpha, config.recenter_interval),
            current: Batch::empty(source, 0),
            anchor: Sample::default(),
            base_count: 0,
            batches_seen: 0,
        }
    }

    /// Account for a new batch from this IMU.
    ///
    /// # Errors
    /// `OversizedBatch` when the declared count exceeds the record capacity.
    /// The tracker is left untouched in that case.
    #[instrument(
        level = "trace",
        name = "sensor_tracker_update",
        skip(self, batch),
        fields(source = %self.source, read_time = batch.read_time, count = batch.sample_count)
    )]
    pub fn update(&mut self, batch: &Batch) -> Result<(), ContractError> {
        if batch.is_oversized() {
            return Err(ContractError::oversized_batch(
                self.source,
                batch.sample_count as usize,
                MAX_BATCH_RECORDS,
            ));
        }
        if batch.is_empty() {
            return Ok(());
        }

        let outgoing = self.current.samples();
        self.anchor = match outgoing.last() {
            Some(last) => *last,
            None => batch.records[0],
        };
        self.base_count += outgoing.len() as i64;

        let completed = self.base_count + batch.len() as i64;
        self.fitter.coord(completed, batch.read_time as i64);

        self.current = batch.clone();
        self.batches_seen += 1;
        Ok(())
    }

    /// Microseconds per sample.
    pub fn slope(&self) -> f64 {
        self.fitter.slope()
    }

    pub fn has_fit(&self) -> bool {
        self.fitter.has_fit()
    }

    pub fn fitter(&self) -> &DecayingFitter {
        &self.fitter
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn current(&self) -> &Batch {
        &self.current
    }

    pub fn anchor(&self) -> Sample {
        self.anchor
    }

    pub fn base_count(&self) -> i64 {
        self.base_count
    }

    /// Count of the first record of the current batch.
    pub fn first_count(&self) -> i64 {
        self.base_count + 1
    }

    pub fn batches_seen(&self) -> u64 {
        self.batches_seen
    }

    /// Resample the current batch onto the sampling instants of `reference`.
    ///
    /// Both fitters must have a fit.
    pub fn project(&self, reference: &DecayingFitter) -> Projection {
        let anchor_time = self.fitter.time_for(self.base_count);
        let (mut index, mut frac) = reference.sample_for(anchor_time);
        let increment = reference.slope() / self.fitter.slope();

        // An anchor sitting on a reference instant is written by this batch,
        // whichever side of the integer the fit rounding landed on.
        if frac > 1.0 - INSTANT_EPSILON {
            index += 1;
            frac = 0.0;
        } else if frac < INSTANT_EPSILON {
            frac = 0.0;
        }

        let (first_index, start) = if frac > 0.0 {
            (index + 1, (1.0 - frac) * increment)
        } else {
            (index, 0.0)
        };

        Projection {
            first_index,
            batch: reproject(self.anchor, &self.current, start, increment),
        }
    }
}

/// Piecewise-linear resampling of `batch`.
///
/// `anchor` sits at local position 0 and `batch.samples()[k]` at `k + 1`.
/// Outputs are taken at positions `start`, `start + increment`, ... strictly
/// below `len`, up to the batch capacity. Position `len` is the next batch's
/// anchor and belongs to that batch.
pub fn reproject(anchor: Sample, batch: &Batch, start: f64, increment: f64) -> Batch {
    let mut out = Batch::empty(batch.source, batch.read_time);
    out.delayed = batch.delayed;

    let input = batch.samples();
    let len = input.len();
    let mut anchor = anchor;
    let mut alpha = start.max(0.0);
    let mut k = 0usize;

    if alpha >= 1.0 {
        let skip = alpha.floor();
        alpha -= skip;
        k = skip as usize;
        if k == 0 || k > len {
            return out;
        }
        anchor = input[k - 1];
    }

    let mut produced = 0usize;
    while k < len && produced < MAX_BATCH_RECORDS {
        let next = input[k];
        let mut axes = [0i16; AXES];
        for (axis, value) in axes.iter_mut().enumerate() {
            let from = anchor.axes[axis] as f64;
            let to = next.axes[axis] as f64;
            *value = (from + alpha * (to - from)).round() as i16;
        }
        out.records[produced] = Sample {
            tag: next.tag,
            tag_count: next.tag_count,
            axes,
        };
        produced += 1;

        alpha += increment;
        while alpha >= 1.0 && k < len {
            alpha -= 1.0;
            anchor = input[k];
            k += 1;
        }
        if k + 1 == len && alpha > 1.0 - INSTANT_EPSILON {
            break;
        }
    }

    out.sample_count = produced as u16;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_batch(source: Source, read_time: u64, values: &[i16]) -> Batch {
        let samples: Vec<Sample> = values.iter().map(|v| Sample::accel([*v, 0, 0])).collect();
        Batch::from_samples(source, read_time, &samples).unwrap()
    }

    fn firsts(batch: &Batch) -> Vec<i16> {
        batch.samples().iter().map(|s| s.axes[0]).collect()
    }

    #[test]
    fn test_reproject_reference_example() {
        let anchor = Sample::accel([-100, -99, -98]);
        let batch = ramp_batch(Source::Right, 777, &[0, 100, 200, 300]);

        let out = reproject(anchor, &batch, 0.9, 0.85);

        assert_eq!(firsts(&out), vec![-10, 75, 160, 245]);
        assert_eq!(out.sample_count, 4);
        assert_eq!(out.read_time, 777);
        assert_eq!(out.source, Source::Right);
    }

    #[test]
    fn test_reproject_start_beyond_first_record() {
        let anchor = Sample::accel([0, 0, 0]);
        let batch = ramp_batch(Source::Left, 0, &[10, 20, 30, 40]);

        // Position 2.5 is halfway between records 1 and 2
        let out = reproject(anchor, &batch, 2.5, 1.0);

        assert_eq!(firsts(&out), vec![25, 35]);
    }

    #[test]
    fn test_reproject_identity_rate() {
        let anchor = Sample::accel([5, 5, 5]);
        let batch = ramp_batch(Source::Left, 0, &[1, 2, 3]);
        let out = reproject(anchor, &batch, 0.0, 1.0);
        assert_eq!(firsts(&out), vec![5, 1, 2]);

        let shifted = reproject(anchor, &batch, 1.0, 1.0);
        assert_eq!(firsts(&shifted), vec![1, 2]);
    }

    #[test]
    fn test_reproject_stops_before_next_anchor() {
        let anchor = Sample::accel([0, 0, 0]);
        let batch = ramp_batch(Source::Right, 0, &[70, 140, 210, 280, 350, 420, 490]);

        // Eight steps of 7/8 end on position 7, the next batch's anchor.
        let exact = reproject(anchor, &batch, 0.0, 7.0 / 8.0);
        assert_eq!(exact.len(), 8);

        // Rounding just short of that position must not add a ninth output.
        let rounded = reproject(anchor, &batch, 0.0, 7.0 / 8.0 - 1e-9);
        assert_eq!(rounded.len(), 8);
        assert_eq!(firsts(&rounded)[7], 429);

        let coarser = reproject(anchor, &batch, 0.0, 0.8);
        assert_eq!(coarser.len(), 9);
    }

    #[test]
    fn test_reproject_caps_output() {
        let anchor = Sample::accel([0, 0, 0]);
        let values: Vec<i16> = (0..32).collect();
        let batch = ramp_batch(Source::Left, 0, &values);

        // Upsampling would produce ~64 outputs
        let out = reproject(anchor, &batch, 0.5, 0.5);

        assert_eq!(out.len(), MAX_BATCH_RECORDS);
    }

    #[test]
    fn test_reproject_empty_input() {
        let out = reproject(Sample::default(), &Batch::empty(Source::Left, 9), 0.2, 0.9);
        assert!(out.is_empty());
    }

    #[test]
    fn test_update_tracks_counts_and_anchor() {
        let mut tracker = SensorTracker::new(Source::Left, &MergerConfig::default());

        tracker.update(&ramp_batch(Source::Left, 2_000, &[1, 2, 3])).unwrap();
        assert_eq!(tracker.base_count(), 0);
        assert_eq!(tracker.anchor().axes[0], 1);

        tracker.update(&ramp_batch(Source::Left, 4_000, &[4, 5])).unwrap();
        assert_eq!(tracker.base_count(), 3);
        assert_eq!(tracker.first_count(), 4);
        assert_eq!(tracker.anchor().axes[0], 3);
        assert_eq!(tracker.batches_seen(), 2);
        assert_eq!(tracker.fitter().observations(), 2);
    }

    #[test]
    fn test_update_ignores_empty_batch() {
        let mut tracker = SensorTracker::new(Source::Right, &MergerConfig::default());
        tracker.update(&ramp_batch(Source::Right, 2_000, &[1, 2])).unwrap();
        tracker.update(&Batch::empty(Source::Right, 4_000)).unwrap();

        assert_eq!(tracker.batches_seen(), 1);
        assert_eq!(tracker.fitter().observations(), 1);
        assert_eq!(tracker.current().len(), 2);
    }

    #[test]
    fn test_update_rejects_oversized() {
        let mut tracker = SensorTracker::new(Source::Right, &MergerConfig::default());
        let mut batch = Batch::empty(Source::Right, 2_000);
        batch.sample_count = 33;

        let err = tracker.update(&batch).unwrap_err();

        assert!(err.is_integrity_violation());
        assert_eq!(tracker.batches_seen(), 0);
    }

    #[test]
    fn test_slope_is_period() {
        let mut tracker = SensorTracker::new(Source::Left, &MergerConfig::default());
        for i in 1..=20u64 {
            let values = [0i16; 8];
            tracker.update(&ramp_batch(Source::Left, i * 4_000, &values)).unwrap();
        }
        assert!((tracker.slope() - 500.0).abs() < 1e-6);
    }

    #[test]
    fn test_project_lands_on_reference_instants() {
        let config = MergerConfig::default();
        let mut reference = SensorTracker::new(Source::Left, &config);
        let mut slow = SensorTracker::new(Source::Right, &config);

        // Reference: 500 us/sample. Slow: 625 us/sample, value = completion time / 10.
        for i in 1..=12u64 {
            let ref_values = [0i16; 8];
            reference
                .update(&ramp_batch(Source::Left, i * 4_000, &ref_values))
                .unwrap();

            let first = (i - 1) * 8 + 1;
            let values: Vec<i16> = (first..first + 8).map(|c| (c * 625 / 10) as i16).collect();
            slow.update(&ramp_batch(Source::Right, i * 5_000, &values))
                .unwrap();
        }

        let projection = slow.project(reference.fitter());
        let out = projection.batch.samples();
        assert!(!out.is_empty());

        // Reference count c completes at c * 500 us; the resampled value is that time / 10.
        for (offset, sample) in out.iter().enumerate() {
            let count = projection.first_index + offset as i64;
            let expected = (count * 500 / 10) as i16;
            assert!(
                (sample.axes[0] - expected).abs() <= 1,
                "count {count}: got {} expected {expected}",
                sample.axes[0]
            );
        }
    }
}
