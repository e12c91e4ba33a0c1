//! Sink traits - merger and dispatcher output interfaces

use crate::{ContractError, MergedHalf};

/// Synchronous output of the merger.
///
/// Called once per completed half from inside `Merger::handle`, so
/// implementations must not block.
pub trait MergeSink {
    /// Accept one completed half.
    ///
    /// # Errors
    /// Returns a sink error when the half cannot be taken.
    fn accept(&mut self, half: &MergedHalf) -> Result<(), ContractError>;
}

/// Collects halves in memory.
impl MergeSink for Vec<MergedHalf> {
    fn accept(&mut self, half: &MergedHalf) -> Result<(), ContractError> {
        self.push(half.clone());
        Ok(())
    }
}

/// Data output trait
///
/// All dispatcher sink implementations must implement this trait.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one merged half
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, half: &MergedHalf) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
