//! Ingestion error types

use contracts::{ContractError, Source};
use thiserror::Error;

/// Ingestion error
#[derive(Debug, Error)]
pub enum IngestionError {
    /// FIFO bytes do not form whole records
    #[error("malformed fifo data from {source_id}: {message}")]
    MalformedFifo {
        /// IMU
        source_id: Source,
        /// Error message
        message: String,
    },

    /// Consumer falls behind acquisition
    #[error("backpressure: queue depth {depth} above threshold {threshold} for {sustained} pushes")]
    Backpressure {
        /// Queue depth after the last push
        depth: usize,
        /// Configured backlog threshold
        threshold: usize,
        /// Consecutive pushes above the threshold
        sustained: u32,
    },

    /// Batch queue closed by the consumer
    #[error("batch queue closed")]
    ChannelClosed,

    /// Source read failed
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl IngestionError {
    pub fn is_backpressure(&self) -> bool {
        matches!(self, IngestionError::Backpressure { .. })
            || matches!(self, IngestionError::Contract(inner) if inner.is_backpressure())
    }
}

impl From<IngestionError> for ContractError {
    fn from(error: IngestionError) -> Self {
        match error {
            IngestionError::Backpressure {
                depth, threshold, ..
            } => ContractError::Backpressure { depth, threshold },
            IngestionError::Contract(inner) => inner,
            other => ContractError::Other(other.to_string()),
        }
    }
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, IngestionError>;
