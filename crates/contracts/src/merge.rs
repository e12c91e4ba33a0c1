//! MergedHalf - merger output
//!
//! Time-aligned records combining both IMUs, flushed in ping-pong halves.

use serde::{Deserialize, Serialize};

use crate::{Source, AXES};

/// Slots in the ping-pong buffer.
pub const PING_PONG_SLOTS: usize = 20;

/// Records per flushed half.
pub const HALF_LEN: usize = PING_PONG_SLOTS / 2;

/// One merged record: axes 0-2 Left, 3-5 Right.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeMessage {
    pub data: [i16; 2 * AXES],
}

impl MergeMessage {
    /// Axes contributed by one source.
    #[inline]
    pub fn side(&self, source: Source) -> [i16; AXES] {
        let offset = source.index() * AXES;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ]
    }

    /// Overwrite the axes of one source.
    #[inline]
    pub fn set_side(&mut self, source: Source, axes: [i16; AXES]) {
        let offset = source.index() * AXES;
        self.data[offset..offset + AXES].copy_from_slice(&axes);
    }
}

/// One completed half of the ping-pong buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedHalf {
    /// Flush sequence number (monotonically increasing from 0)
    pub sequence: u64,

    /// Reference-stream sample count of `records[0]`
    pub first_index: i64,

    /// Merged records
    pub records: [MergeMessage; HALF_LEN],
}

/// Merger lifecycle phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePhase {
    /// Collecting batches, no reference yet
    #[default]
    WarmingUp,
    /// Reference candidate known, still warming up
    ReferenceChosen(Source),
    /// Writing merged output against a frozen reference
    Merging(Source),
    /// Stopped after an integrity violation
    Halted,
}

impl MergePhase {
    /// Reference source, once one is known.
    pub fn reference(self) -> Option<Source> {
        match self {
            MergePhase::ReferenceChosen(source) | MergePhase::Merging(source) => Some(source),
            MergePhase::WarmingUp | MergePhase::Halted => None,
        }
    }

    pub fn is_merging(self) -> bool {
        matches!(self, MergePhase::Merging(_))
    }
}

/// Diagnostics for one `Merger::handle` call
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HandleReport {
    /// Source of the handled batch
    pub source: Source,

    /// Declared record count of the incoming batch
    pub sample_count: usize,

    /// Accelerometer records kept after filtering
    pub accel_count: usize,

    /// Batch completion time (microseconds)
    pub read_time: u64,

    /// The acquisition tick woke up late
    pub delayed: bool,

    /// Phase after handling
    pub phase: MergePhase,

    /// Reference index of the first record written for this batch
    pub write_index: Option<i64>,

    /// Records written into the merge window
    pub written: usize,

    /// Halves flushed during this call
    pub halves_flushed: usize,

    /// Halves flushed early because one side lagged a full half behind
    pub forced_flushes: usize,

    /// Time spent in `handle` (microseconds)
    pub handle_us: f64,
}
