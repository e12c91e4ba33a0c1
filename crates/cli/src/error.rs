//! Error types for CLI operations.

use contracts::ContractError;
use ingestion::IngestionError;
use thiserror::Error;

/// Faults that end a command
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// The merger refused a batch; its state can no longer be trusted
    #[error("Merger integrity violation: {0}")]
    Integrity(#[source] ContractError),

    /// Acquisition outran the merger
    #[error("Acquisition aborted on backpressure: {0}")]
    Backpressure(#[source] IngestionError),

    #[error("Pipeline execution failed: {message}")]
    PipelineExecution { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn pipeline_execution(message: impl Into<String>) -> Self {
        Self::PipelineExecution {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Source;

    #[test]
    fn test_error_messages() {
        let err = CliError::Integrity(ContractError::DuplicateSource {
            source_id: Source::Left,
        });
        assert!(err.to_string().contains("duplicate consecutive batch from left"));

        let err = CliError::Backpressure(IngestionError::Backpressure {
            depth: 12,
            threshold: 10,
            sustained: 1,
        });
        assert!(err.to_string().contains("queue depth 12"));

        let err = CliError::config_not_found("rig.toml");
        assert_eq!(err.to_string(), "Configuration file not found: rig.toml");
    }
}
