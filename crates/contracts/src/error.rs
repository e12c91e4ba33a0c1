//! Layered error definitions
//!
//! Categorized by source: config / integrity / backpressure / sink

use thiserror::Error;

use crate::Source;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Integrity Errors =====
    /// Batch declares more records than a batch can hold
    #[error("oversized batch from {source_id}: {sample_count} records, max {max}")]
    OversizedBatch {
        source_id: Source,
        sample_count: usize,
        max: usize,
    },

    /// Two consecutive batches from the same source
    #[error("duplicate consecutive batch from {source_id}")]
    DuplicateSource { source_id: Source },

    /// Merger refused work after an earlier integrity violation
    #[error("merger halted after an integrity violation")]
    MergerHalted,

    // ===== Flow Errors =====
    /// Consumer cannot keep pace with acquisition
    #[error("backpressure: queue depth {depth} above threshold {threshold}")]
    Backpressure { depth: usize, threshold: usize },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create oversized batch error
    pub fn oversized_batch(source_id: Source, sample_count: usize, max: usize) -> Self {
        Self::OversizedBatch {
            source_id,
            sample_count,
            max,
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Fatal for the consuming path: the merger state can no longer be trusted.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            Self::OversizedBatch { .. } | Self::DuplicateSource { .. } | Self::MergerHalted
        )
    }

    /// Acquisition outran the consumer.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, Self::Backpressure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ContractError::oversized_batch(Source::Left, 33, 32).is_integrity_violation());
        assert!(ContractError::DuplicateSource {
            source_id: Source::Right
        }
        .is_integrity_violation());
        assert!(ContractError::MergerHalted.is_integrity_violation());

        let backpressure = ContractError::Backpressure {
            depth: 11,
            threshold: 10,
        };
        assert!(backpressure.is_backpressure());
        assert!(!backpressure.is_integrity_violation());
        assert!(!ContractError::sink_write("log", "closed").is_integrity_violation());
    }

    #[test]
    fn test_error_messages() {
        let err = ContractError::oversized_batch(Source::Left, 33, 32);
        assert_eq!(
            err.to_string(),
            "oversized batch from left: 33 records, max 32"
        );
        let err = ContractError::config_validation("queue.capacity", "must be > 0");
        assert!(err.to_string().contains("queue.capacity"));
    }
}
