//! Simulated IMU with a drifting sample clock and an on-device FIFO.
//!
//! Both IMUs of a rig observe the same physical motion, so the signal is a
//! function of true time only. Each device samples it on its own clock,
//! `nominal_period * (1 + drift_ppm * 1e-6)`, and queues records in a bounded
//! FIFO that overwrites its oldest record when full.

use std::f64::consts::TAU;

use bytes::BytesMut;
use contracts::{
    Batch, BatchSource, ContractError, ImuConfig, Sample, SensorTag, Source, AXES,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ringbuf::{traits::*, HeapRb};
use tracing::{trace, warn};

use crate::fifo::{decode_fifo, FifoRecord, FIFO_RECORD_LEN};

/// Raw counts for 1 g at +/-4 g full scale
pub const GRAVITY_COUNTS: i16 = 8192;

/// Simulated IMU
pub struct SimulatedImu {
    config: ImuConfig,
    /// Actual sample period (microseconds)
    period_us: f64,
    /// Power-on time on the acquisition clock
    start_us: u64,
    /// Samples generated so far
    produced: u64,
    tag_count: u8,
    fifo: HeapRb<FifoRecord>,
    overflowed: u64,
    rng: StdRng,
    scratch: BytesMut,
}

impl std::fmt::Debug for SimulatedImu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedImu")
            .field("source", &self.config.source)
            .field("period_us", &self.period_us)
            .field("produced", &self.produced)
            .field("fifo_len", &self.fifo.occupied_len())
            .finish()
    }
}

impl SimulatedImu {
    /// Create an IMU that starts sampling at `start_us`.
    pub fn new(config: ImuConfig, start_us: u64) -> Self {
        let period_us = config.nominal_period_us() * (1.0 + config.drift_ppm * 1e-6);
        let capacity = config.fifo_capacity.max(1);
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            period_us,
            start_us,
            produced: 0,
            tag_count: 0,
            fifo: HeapRb::new(capacity),
            overflowed: 0,
            rng,
            scratch: BytesMut::with_capacity(contracts::MAX_BATCH_RECORDS * FIFO_RECORD_LEN),
        }
    }

    /// Physical acceleration at true time `t_us`, in raw counts.
    pub fn signal(amplitude: i16, signal_hz: f64, t_us: f64) -> [i16; AXES] {
        let phase = TAU * signal_hz * t_us * 1e-6;
        let amplitude = amplitude as f64;
        [
            (amplitude * phase.sin()).round() as i16,
            (0.5 * amplitude * (2.0 * phase).cos()).round() as i16,
            GRAVITY_COUNTS.saturating_add((0.25 * amplitude * phase.sin()).round() as i16),
        ]
    }

    /// Completion time of sample number `count` (1-based).
    pub fn sample_time(&self, count: u64) -> f64 {
        self.start_us as f64 + count as f64 * self.period_us
    }

    fn noisy(&mut self, axes: [i16; AXES]) -> [i16; AXES] {
        let noise = self.config.noise;
        if noise <= 0 {
            return axes;
        }
        let mut out = axes;
        for value in out.iter_mut() {
            let jitter: i16 = self.rng.random_range(-noise..=noise);
            *value = value.saturating_add(jitter);
        }
        out
    }

    fn push(&mut self, sample: Sample) {
        if self.fifo.push_overwrite(FifoRecord::encode(&sample)).is_some() {
            self.overflowed += 1;
        }
    }

    /// Sample everything due by `now_us` into the FIFO.
    fn generate_until(&mut self, now_us: u64) {
        if now_us <= self.start_us {
            return;
        }
        let due = ((now_us - self.start_us) as f64 / self.period_us).floor() as u64;
        let overflowed_before = self.overflowed;

        while self.produced < due {
            self.produced += 1;
            let t = self.sample_time(self.produced);
            let accel = Self::signal(self.config.amplitude, self.config.signal_hz, t);
            let accel = self.noisy(accel);
            let tag_count = self.tag_count;
            self.tag_count = (self.tag_count + 1) & 0x03;

            self.push(Sample {
                tag: SensorTag::Accelerometer,
                tag_count,
                axes: accel,
            });
            if self.config.gyro_enabled {
                let phase = TAU * self.config.signal_hz * t * 1e-6;
                let rate = (0.1 * self.config.amplitude as f64 * phase.cos()).round() as i16;
                self.push(Sample {
                    tag: SensorTag::Gyroscope,
                    tag_count,
                    axes: [rate, 0, -rate],
                });
            }
        }

        let lost = self.overflowed - overflowed_before;
        if lost > 0 {
            warn!(source = %self.config.source, lost, "imu fifo overflow, oldest records lost");
            metrics::counter!("ingestion_fifo_overflow_total", "source" => self.config.source.as_str())
                .increment(lost);
        }
    }

    pub fn fifo_len(&self) -> usize {
        self.fifo.occupied_len()
    }

    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    pub fn period_us(&self) -> f64 {
        self.period_us
    }

    pub fn config(&self) -> &ImuConfig {
        &self.config
    }
}

impl BatchSource for SimulatedImu {
    fn source(&self) -> Source {
        self.config.source
    }

    fn read_batch(&mut self, now_us: u64, max_records: usize) -> Result<Batch, ContractError> {
        self.generate_until(now_us);

        self.scratch.clear();
        let limit = max_records.min(contracts::MAX_BATCH_RECORDS);
        for _ in 0..limit {
            match self.fifo.try_pop() {
                Some(record) => self.scratch.extend_from_slice(bytemuck::bytes_of(&record)),
                None => break,
            }
        }

        let batch = decode_fifo(self.config.source, now_us, &self.scratch)?;
        trace!(
            source = %self.config.source,
            read_time = now_us,
            records = batch.len(),
            remaining = self.fifo.occupied_len(),
            "fifo read"
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imu_config(source: Source, drift_ppm: f64) -> ImuConfig {
        ImuConfig {
            source,
            odr_hz: 2000.0,
            drift_ppm,
            gyro_enabled: false,
            amplitude: 2000,
            signal_hz: 5.0,
            noise: 0,
            seed: 7,
            fifo_capacity: 64,
        }
    }

    #[test]
    fn test_reads_due_samples() {
        let mut imu = SimulatedImu::new(imu_config(Source::Left, 0.0), 0);

        // 2000 Hz: one sample every 500 us
        let batch = imu.read_batch(4_000, 32).unwrap();
        assert_eq!(batch.len(), 8);
        assert_eq!(batch.read_time, 4_000);
        assert_eq!(batch.source, Source::Left);

        let batch = imu.read_batch(4_400, 32).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_read_limit_leaves_rest_in_fifo() {
        let mut imu = SimulatedImu::new(imu_config(Source::Left, 0.0), 0);
        let batch = imu.read_batch(20_000, 32).unwrap();
        assert_eq!(batch.len(), 32);
        assert_eq!(imu.fifo_len(), 8);
    }

    #[test]
    fn test_fifo_overwrites_oldest() {
        let mut imu = SimulatedImu::new(imu_config(Source::Right, 0.0), 0);
        // 100 samples into a 64-record FIFO
        let batch = imu.read_batch(50_000, 32).unwrap();

        assert_eq!(imu.overflowed(), 36);
        assert_eq!(imu.fifo_len(), 32);
        let expected = SimulatedImu::signal(2000, 5.0, imu.sample_time(37));
        assert_eq!(batch.samples()[0].axes, expected);
    }

    #[test]
    fn test_drift_stretches_period() {
        let imu = SimulatedImu::new(imu_config(Source::Right, 1000.0), 0);
        assert!((imu.period_us() - 500.5).abs() < 1e-9);
    }

    #[test]
    fn test_tag_counter_wraps() {
        let mut imu = SimulatedImu::new(imu_config(Source::Left, 0.0), 0);
        let batch = imu.read_batch(3_000, 32).unwrap();
        let counters: Vec<u8> = batch.samples().iter().map(|s| s.tag_count).collect();
        assert_eq!(counters, vec![0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn test_gyro_records_interleaved() {
        let mut config = imu_config(Source::Left, 0.0);
        config.gyro_enabled = true;
        let mut imu = SimulatedImu::new(config, 0);

        let batch = imu.read_batch(2_000, 32).unwrap();

        assert_eq!(batch.len(), 8);
        assert_eq!(batch.count_tag(SensorTag::Accelerometer), 4);
        assert_eq!(batch.count_tag(SensorTag::Gyroscope), 4);
        assert_eq!(batch.samples()[1].tag, SensorTag::Gyroscope);
    }

    #[test]
    fn test_noise_is_bounded_and_seeded() {
        let mut config = imu_config(Source::Left, 0.0);
        config.noise = 3;
        let mut first = SimulatedImu::new(config.clone(), 0);
        let mut second = SimulatedImu::new(config, 0);

        let a = first.read_batch(10_000, 32).unwrap();
        let b = second.read_batch(10_000, 32).unwrap();
        assert_eq!(a, b);

        for (i, sample) in a.samples().iter().enumerate() {
            let clean = SimulatedImu::signal(2000, 5.0, first.sample_time(i as u64 + 1));
            for axis in 0..AXES {
                assert!((sample.axes[axis] - clean[axis]).abs() <= 3);
            }
        }
    }

    #[test]
    fn test_start_time_offsets_sampling() {
        let mut imu = SimulatedImu::new(imu_config(Source::Left, 0.0), 10_000);
        assert!(imu.read_batch(9_000, 32).unwrap().is_empty());
        assert_eq!(imu.read_batch(11_000, 32).unwrap().len(), 2);
    }
}
