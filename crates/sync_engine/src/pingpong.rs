//! Double-buffered merge window.
//!
//! Twenty slots cover the reference indices `[window_start, window_start + 20)`
//! as two halves of ten. Each side writes through its own cursor. The older
//! half is handed out once both cursors have moved past it.

use contracts::{MergeMessage, MergedHalf, Source, AXES, HALF_LEN, PING_PONG_SLOTS};
use serde::Serialize;

/// Outcome of a single slot write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotWrite {
    /// Next index in sequence
    Appended,
    /// Earlier index of this side, still buffered
    Overwrote,
    /// Index ahead of the cursor; `filled` slots were held at the last value
    Filled { filled: u64 },
    /// Index already flushed, dropped
    Late,
    /// Index past the window; the oldest half must be force-flushed first
    NoRoom,
}

/// Write-path counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PingPongStats {
    pub halves_flushed: u64,
    pub forced_flushes: u64,
    pub late_drops: u64,
    pub overwrites: u64,
    pub hold_fills: u64,
}

#[derive(Debug, Clone)]
pub struct PingPong {
    slots: [MergeMessage; PING_PONG_SLOTS],
    /// Index mapped to slot 0
    origin: i64,
    /// First index of the older half
    window_start: i64,
    /// Next index each side expects
    cursors: [i64; 2],
    /// Last value written per side
    last: [Option<[i16; AXES]>; 2],
    sequence: u64,
    stats: PingPongStats,
}

impl PingPong {
    /// Empty window whose first half starts at `origin`.
    pub fn new(origin: i64) -> Self {
        Self {
            slots: [MergeMessage::default(); PING_PONG_SLOTS],
            origin,
            window_start: origin,
            cursors: [origin; 2],
            last: [None; 2],
            sequence: 0,
            stats: PingPongStats::default(),
        }
    }

    #[inline]
    fn slot(&self, index: i64) -> usize {
        (index - self.origin).rem_euclid(PING_PONG_SLOTS as i64) as usize
    }

    /// Write one side's axes at a reference index.
    pub fn put(&mut self, source: Source, index: i64, axes: [i16; AXES]) -> SlotWrite {
        let side = source.index();

        if index < self.window_start {
            self.stats.late_drops += 1;
            return SlotWrite::Late;
        }
        if index >= self.window_start + PING_PONG_SLOTS as i64 {
            return SlotWrite::NoRoom;
        }

        let slot = self.slot(index);
        if index < self.cursors[side] {
            self.slots[slot].set_side(source, axes);
            self.stats.overwrites += 1;
            return SlotWrite::Overwrote;
        }

        let from = self.cursors[side].max(self.window_start);
        let hold = self.last[side].unwrap_or(axes);
        for gap in from..index {
            let gap_slot = self.slot(gap);
            self.slots[gap_slot].set_side(source, hold);
        }
        let filled = (index - from) as u64;

        self.slots[slot].set_side(source, axes);
        self.cursors[side] = index + 1;
        self.last[side] = Some(axes);

        if filled == 0 {
            SlotWrite::Appended
        } else {
            self.stats.hold_fills += filled;
            SlotWrite::Filled { filled }
        }
    }

    /// Hand out the older half if both sides have moved past it.
    pub fn take_ready(&mut self) -> Option<MergedHalf> {
        let half_end = self.window_start + HALF_LEN as i64;
        if self.cursors.iter().all(|cursor| *cursor >= half_end) {
            self.stats.halves_flushed += 1;
            Some(self.emit())
        } else {
            None
        }
    }

    /// Hand out the older half now, holding the lagging side at its last value.
    ///
    /// Returns the half and the side that was held.
    pub fn force_flush(&mut self) -> (MergedHalf, Option<Source>) {
        let half_end = self.window_start + HALF_LEN as i64;
        let mut lagging = None;

        for source in Source::BOTH {
            let side = source.index();
            if self.cursors[side] >= half_end {
                continue;
            }
            lagging = Some(source);
            let hold = self.last[side].unwrap_or_default();
            let from = self.cursors[side].max(self.window_start);
            for index in from..half_end {
                let slot = self.slot(index);
                self.slots[slot].set_side(source, hold);
            }
            self.stats.hold_fills += (half_end - from) as u64;
            self.cursors[side] = half_end;
        }

        self.stats.halves_flushed += 1;
        self.stats.forced_flushes += 1;
        (self.emit(), lagging)
    }

    fn emit(&mut self) -> MergedHalf {
        let first = self.slot(self.window_start);
        let mut records = [MergeMessage::default(); HALF_LEN];
        records.copy_from_slice(&self.slots[first..first + HALF_LEN]);
        self.slots[first..first + HALF_LEN].fill(MergeMessage::default());

        let half = MergedHalf {
            sequence: self.sequence,
            first_index: self.window_start,
            records,
        };
        self.sequence += 1;
        self.window_start += HALF_LEN as i64;
        half
    }

    pub fn window_start(&self) -> i64 {
        self.window_start
    }

    pub fn cursor(&self, source: Source) -> i64 {
        self.cursors[source.index()]
    }

    pub fn stats(&self) -> PingPongStats {
        self.stats
    }
}
