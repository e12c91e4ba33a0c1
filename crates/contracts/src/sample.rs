//! Sample / Batch - acquisition output
//!
//! One batch is one FIFO read from one IMU plus its completion timestamp.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Record capacity of a single batch (one FIFO read).
pub const MAX_BATCH_RECORDS: usize = 32;

/// Axes per IMU sample.
pub const AXES: usize = 3;

/// IMU identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Left,
    Right,
}

impl Source {
    /// Both sources, in field order of a merged record.
    pub const BOTH: [Source; 2] = [Source::Left, Source::Right];

    /// The opposite source.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Source::Left => Source::Right,
            Source::Right => Source::Left,
        }
    }

    /// Array index: Left = 0, Right = 1.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Source::Left => 0,
            Source::Right => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Left => "left",
            Source::Right => "right",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// FIFO record type, taken from bits [7:3] of the tag byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorTag {
    Gyroscope,
    #[default]
    Accelerometer,
    Temperature,
    Timestamp,
    GameRotation,
    GyroBias,
    Gravity,
    Unknown(u8),
}

impl SensorTag {
    /// Decode the 5-bit tag id.
    pub fn from_id(id: u8) -> Self {
        match id {
            0x01 => SensorTag::Gyroscope,
            0x02 => SensorTag::Accelerometer,
            0x03 => SensorTag::Temperature,
            0x04 => SensorTag::Timestamp,
            0x13 => SensorTag::GameRotation,
            0x16 => SensorTag::GyroBias,
            0x17 => SensorTag::Gravity,
            other => SensorTag::Unknown(other),
        }
    }

    /// 5-bit tag id.
    pub fn id(self) -> u8 {
        match self {
            SensorTag::Gyroscope => 0x01,
            SensorTag::Accelerometer => 0x02,
            SensorTag::Temperature => 0x03,
            SensorTag::Timestamp => 0x04,
            SensorTag::GameRotation => 0x13,
            SensorTag::GyroBias => 0x16,
            SensorTag::Gravity => 0x17,
            SensorTag::Unknown(id) => id & 0x1f,
        }
    }
}

/// One 3-axis reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Record type
    pub tag: SensorTag,

    /// 2-bit wrap-around counter from the tag byte
    pub tag_count: u8,

    /// Raw axis values
    pub axes: [i16; AXES],
}

impl Sample {
    /// Accelerometer sample.
    pub fn accel(axes: [i16; AXES]) -> Self {
        Self {
            tag: SensorTag::Accelerometer,
            tag_count: 0,
            axes,
        }
    }
}

/// One FIFO read from one IMU.
///
/// `sample_count` is the declared record count. It is kept separate from the
/// record storage so an oversized declaration can be detected downstream
/// instead of being truncated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Producing IMU
    pub source: Source,

    /// Monotonic completion time (microseconds)
    pub read_time: u64,

    /// Declared number of records
    pub sample_count: u16,

    /// The acquisition tick woke up late
    pub delayed: bool,

    /// Record storage
    pub records: [Sample; MAX_BATCH_RECORDS],
}

impl Batch {
    /// Create an empty batch.
    pub fn empty(source: Source, read_time: u64) -> Self {
        Self {
            source,
            read_time,
            sample_count: 0,
            delayed: false,
            records: [Sample::default(); MAX_BATCH_RECORDS],
        }
    }

    /// Build a batch from a slice of samples.
    ///
    /// # Errors
    /// `OversizedBatch` if more than `MAX_BATCH_RECORDS` samples are given.
    pub fn from_samples(
        source: Source,
        read_time: u64,
        samples: &[Sample],
    ) -> Result<Self, ContractError> {
        if samples.len() > MAX_BATCH_RECORDS {
            return Err(ContractError::oversized_batch(
                source,
                samples.len(),
                MAX_BATCH_RECORDS,
            ));
        }
        let mut batch = Self::empty(source, read_time);
        batch.records[..samples.len()].copy_from_slice(samples);
        batch.sample_count = samples.len() as u16;
        Ok(batch)
    }

    /// Append one sample.
    ///
    /// # Errors
    /// `OversizedBatch` when the batch is already full.
    pub fn push(&mut self, sample: Sample) -> Result<(), ContractError> {
        let len = self.sample_count as usize;
        if len >= MAX_BATCH_RECORDS {
            return Err(ContractError::oversized_batch(
                self.source,
                len + 1,
                MAX_BATCH_RECORDS,
            ));
        }
        self.records[len] = sample;
        self.sample_count += 1;
        Ok(())
    }

    /// Stored records (never more than the capacity).
    #[inline]
    pub fn samples(&self) -> &[Sample] {
        let len = (self.sample_count as usize).min(MAX_BATCH_RECORDS);
        &self.records[..len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    /// Declared count exceeds the record capacity.
    #[inline]
    pub fn is_oversized(&self) -> bool {
        self.sample_count as usize > MAX_BATCH_RECORDS
    }

    /// Copy of this batch keeping only records of one type.
    pub fn filter_tag(&self, tag: SensorTag) -> Self {
        let mut filtered = Self::empty(self.source, self.read_time);
        filtered.delayed = self.delayed;
        let mut len = 0;
        for sample in self.samples().iter().filter(|s| s.tag == tag) {
            filtered.records[len] = *sample;
            len += 1;
        }
        filtered.sample_count = len as u16;
        filtered
    }

    /// Number of records of one type.
    pub fn count_tag(&self, tag: SensorTag) -> usize {
        self.samples().iter().filter(|s| s.tag == tag).count()
    }
}
