//! Bounded batch queue between acquisition and the merger.

use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender};
use contracts::{BackpressurePolicy, Batch};
use tracing::{trace, warn};

use crate::config::{BackpressureConfig, IngestionMetrics};
use crate::error::{IngestionError, Result};

/// Create a bounded batch queue.
pub fn batch_queue(
    config: BackpressureConfig,
    metrics: Arc<IngestionMetrics>,
) -> (BatchSender, Receiver<Batch>) {
    let (tx, rx) = bounded(config.channel_capacity.max(1));
    let sender = BatchSender {
        tx,
        config,
        metrics,
        over_threshold: 0,
    };
    (sender, rx)
}

/// Producer side of the batch queue.
///
/// Blocks when the queue is full and applies the backlog policy after
/// every push.
#[derive(Debug)]
pub struct BatchSender {
    tx: Sender<Batch>,
    config: BackpressureConfig,
    metrics: Arc<IngestionMetrics>,
    /// Consecutive pushes above the threshold
    over_threshold: u32,
}

impl BatchSender {
    /// Queue one batch, waiting for room.
    ///
    /// # Errors
    /// - `ChannelClosed` when the consumer is gone
    /// - `Backpressure` on sustained backlog under the abort policy
    pub async fn send(&mut self, batch: Batch) -> Result<()> {
        self.tx
            .send(batch)
            .await
            .map_err(|_| IngestionError::ChannelClosed)?;
        self.after_push()
    }

    /// Queue one batch without waiting.
    ///
    /// A full queue counts as backlog at capacity.
    pub fn try_send(&mut self, batch: Batch) -> Result<()> {
        match self.tx.try_send(batch) {
            Ok(()) => self.after_push(),
            Err(async_channel::TrySendError::Closed(_)) => Err(IngestionError::ChannelClosed),
            Err(async_channel::TrySendError::Full(_)) => Err(IngestionError::Backpressure {
                depth: self.tx.len(),
                threshold: self.config.backlog_threshold,
                sustained: self.over_threshold + 1,
            }),
        }
    }

    fn after_push(&mut self) -> Result<()> {
        let depth = self.tx.len();
        self.metrics.record_sent();
        self.metrics.update_queue_len(depth);
        metrics::gauge!("ingestion_queue_depth").set(depth as f64);

        if depth <= self.config.backlog_threshold {
            self.over_threshold = 0;
            trace!(depth, "batch queued");
            return Ok(());
        }

        self.over_threshold += 1;
        self.metrics.record_backlog();
        metrics::counter!("ingestion_backlog_events_total").increment(1);
        if self.over_threshold < self.config.sustain {
            return Ok(());
        }

        match self.config.policy {
            BackpressurePolicy::Abort => Err(IngestionError::Backpressure {
                depth,
                threshold: self.config.backlog_threshold,
                sustained: self.over_threshold,
            }),
            BackpressurePolicy::Warn => {
                if self.over_threshold == self.config.sustain {
                    warn!(
                        depth,
                        threshold = self.config.backlog_threshold,
                        "merger falling behind acquisition"
                    );
                }
                Ok(())
            }
        }
    }

    /// Current queue depth
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn config(&self) -> &BackpressureConfig {
        &self.config
    }
}
