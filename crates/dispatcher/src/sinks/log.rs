//! LogSink - logs merged half summaries via tracing

use std::collections::HashMap;

use contracts::{ContractError, DataSink, MergedHalf, Source};
use tracing::{info, instrument};

/// Sink that logs half summaries for debugging
pub struct LogSink {
    name: String,
    /// Log one half out of every `every`
    every: u64,
    seen: u64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            every: 1,
            seen: 0,
        }
    }

    /// Create from params map. `every` thins the log output.
    pub fn from_params(name: impl Into<String>, params: &HashMap<String, String>) -> Self {
        let every = params
            .get("every")
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(1)
            .max(1);
        Self {
            every,
            ..Self::new(name)
        }
    }

    fn log_half_summary(&self, half: &MergedHalf) {
        let first = &half.records[0];
        let max_spread = half
            .records
            .iter()
            .map(|record| {
                let left = record.side(Source::Left);
                let right = record.side(Source::Right);
                left.iter()
                    .zip(right.iter())
                    .map(|(l, r)| (*l as i32 - *r as i32).abs())
                    .max()
                    .unwrap_or(0)
            })
            .max()
            .unwrap_or(0);

        info!(
            sink = %self.name,
            sequence = half.sequence,
            first_index = half.first_index,
            left = ?first.side(Source::Left),
            right = ?first.side(Source::Right),
            max_spread,
            "MergedHalf received"
        );
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, half),
        fields(sink = %self.name, sequence = half.sequence)
    )]
    async fn write(&mut self, half: &MergedHalf) -> Result<(), ContractError> {
        if self.seen % self.every == 0 {
            self.log_half_summary(half);
        }
        self.seen += 1;
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, halves = self.seen, "LogSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{MergeMessage, HALF_LEN};

    #[tokio::test]
    async fn test_log_sink_write() {
        let mut sink = LogSink::new("test_log");
        let half = MergedHalf {
            sequence: 0,
            first_index: 40,
            records: [MergeMessage {
                data: [1, 2, 3, 1, 2, 4],
            }; HALF_LEN],
        };

        assert!(sink.write(&half).await.is_ok());
        assert!(sink.close().await.is_ok());
    }

    #[test]
    fn test_log_sink_params() {
        let mut params = HashMap::new();
        params.insert("every".to_string(), "50".to_string());
        let sink = LogSink::from_params("my_logger", &params);
        assert_eq!(sink.name(), "my_logger");
        assert_eq!(sink.every, 50);

        params.insert("every".to_string(), "zero".to_string());
        assert_eq!(LogSink::from_params("x", &params).every, 1);
    }
}
