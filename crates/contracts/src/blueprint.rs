//! RigBlueprint - Config Loader output
//!
//! Describes the complete rig: the two IMUs, merger tuning, queue policy,
//! acquisition cadence, and output routing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::{MergerConfig, Source, MAX_BATCH_RECORDS};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete rig configuration blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigBlueprint {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Merger tuning
    #[serde(default)]
    pub merger: MergerConfig,

    /// Acquisition -> merger queue
    #[serde(default)]
    pub queue: QueueConfig,

    /// Acquisition cadence
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// IMU definitions (one left, one right)
    pub sensors: Vec<ImuConfig>,

    /// Output routing
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// Bounded queue between acquisition and the merger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue capacity in batches
    pub capacity: usize,

    /// Backlog depth that signals the consumer is falling behind
    pub backlog_threshold: usize,

    /// Consecutive over-threshold pushes before the policy applies
    pub sustain: u32,

    /// What to do on sustained backlog
    pub policy: BackpressurePolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 40,
            backlog_threshold: 10,
            sustain: 1,
            policy: BackpressurePolicy::Abort,
        }
    }
}

/// Backlog policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Stop acquisition with a backpressure error
    #[default]
    Abort,
    /// Log and count, keep going
    Warn,
}

/// Acquisition loop cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Tick period; sources are read alternately, one per tick
    pub read_period_ms: u64,

    /// Records drained per read
    pub max_records_per_read: usize,

    /// Startup drain stops once a read returns at most this many records
    pub settle_threshold: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            read_period_ms: 2,
            max_records_per_read: MAX_BATCH_RECORDS,
            settle_threshold: 4,
        }
    }
}

/// IMU configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImuConfig {
    /// Which side this IMU is mounted on
    pub source: Source,

    /// Nominal output data rate (Hz), must be > 0
    pub odr_hz: f64,

    /// Clock error in parts per million (positive = slow)
    #[serde(default)]
    pub drift_ppm: f64,

    /// Interleave gyroscope records in the FIFO
    #[serde(default)]
    pub gyro_enabled: bool,

    /// Simulated vibration amplitude (raw counts)
    #[serde(default = "default_amplitude")]
    pub amplitude: i16,

    /// Simulated vibration frequency (Hz)
    #[serde(default = "default_signal_hz")]
    pub signal_hz: f64,

    /// Peak uniform noise (raw counts)
    #[serde(default)]
    pub noise: i16,

    /// Noise generator seed
    #[serde(default)]
    pub seed: u64,

    /// Device FIFO depth in records
    #[serde(default = "default_fifo_capacity")]
    pub fifo_capacity: usize,
}

fn default_amplitude() -> i16 {
    2000
}

fn default_signal_hz() -> f64 {
    5.0
}

fn default_fifo_capacity() -> usize {
    512
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output
    Log,
    /// File output
    File,
}

impl RigBlueprint {
    /// Configuration of one IMU
    pub fn sensor(&self, source: Source) -> Option<&ImuConfig> {
        self.sensors.iter().find(|sensor| sensor.source == source)
    }

    /// Acquisition tick period
    pub fn read_period(&self) -> Duration {
        Duration::from_millis(self.acquisition.read_period_ms)
    }
}

impl ImuConfig {
    /// Nominal sample period (microseconds)
    pub fn nominal_period_us(&self) -> f64 {
        1_000_000.0 / self.odr_hz
    }
}
