//! ChannelSink - hands merged halves from the merger to async consumers

use contracts::{ContractError, MergeSink, MergedHalf};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Merger output that forwards each half into a bounded tokio channel.
///
/// Never waits: a full channel is reported as a sink error and the half is
/// dropped.
#[derive(Debug)]
pub struct ChannelSink {
    name: String,
    tx: mpsc::Sender<MergedHalf>,
    sent: u64,
    dropped: u64,
}

impl ChannelSink {
    pub fn new(name: impl Into<String>, tx: mpsc::Sender<MergedHalf>) -> Self {
        Self {
            name: name.into(),
            tx,
            sent: 0,
            dropped: 0,
        }
    }

    /// Create a sink and the receiving end of its channel.
    pub fn channel(
        name: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<MergedHalf>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(name, tx), rx)
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl MergeSink for ChannelSink {
    fn accept(&mut self, half: &MergedHalf) -> Result<(), ContractError> {
        match self.tx.try_send(half.clone()) {
            Ok(()) => {
                self.sent += 1;
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                Err(ContractError::sink_write(
                    &self.name,
                    format!("channel full, half {} dropped", half.sequence),
                ))
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped += 1;
                Err(ContractError::sink_write(&self.name, "channel closed"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{MergeMessage, HALF_LEN};

    fn half(sequence: u64) -> MergedHalf {
        MergedHalf {
            sequence,
            first_index: sequence as i64 * HALF_LEN as i64,
            records: [MergeMessage::default(); HALF_LEN],
        }
    }

    #[tokio::test]
    async fn test_forwards_halves() {
        let (mut sink, mut rx) = ChannelSink::channel("merged", 4);
        sink.accept(&half(0)).unwrap();
        sink.accept(&half(1)).unwrap();

        assert_eq!(rx.recv().await.unwrap().sequence, 0);
        assert_eq!(rx.recv().await.unwrap().sequence, 1);
        assert_eq!(sink.sent(), 2);
    }

    #[test]
    fn test_full_channel_is_sink_error() {
        let (mut sink, _rx) = ChannelSink::channel("merged", 1);
        sink.accept(&half(0)).unwrap();

        let err = sink.accept(&half(1)).unwrap_err();

        assert!(matches!(err, ContractError::SinkWrite { .. }));
        assert!(!err.is_integrity_violation());
        assert_eq!(sink.dropped(), 1);
    }

    #[test]
    fn test_closed_channel_is_sink_error() {
        let (mut sink, rx) = ChannelSink::channel("merged", 1);
        drop(rx);
        assert!(sink.accept(&half(0)).is_err());
    }
}
