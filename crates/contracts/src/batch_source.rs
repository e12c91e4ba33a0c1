//! BatchSource trait - IMU data source abstraction
//!
//! The merger only consumes the `Batch` contract; anything that can drain a
//! sensor FIFO into batches (simulated IMU, hardware driver, replay) sits
//! behind this trait.

use crate::{Batch, ContractError, Source};

/// IMU data source
pub trait BatchSource: Send {
    /// Which IMU this is
    fn source(&self) -> Source;

    /// Drain up to `max_records` FIFO records that completed by `now_us`.
    ///
    /// The returned batch is stamped with `now_us` as its read time.
    ///
    /// # Errors
    /// Returns an error if the device read fails.
    fn read_batch(&mut self, now_us: u64, max_records: usize) -> Result<Batch, ContractError>;
}
