//! SinkHandle - one sink behind its own queue and worker task

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{DataSink, MergedHalf};

use crate::metrics::SinkMetrics;

/// Result of queueing a half for one sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Queue full, the half was dropped for this sink only
    Dropped,
    /// Worker is gone
    Closed,
}

/// Handle to a running sink worker
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<MergedHalf>,
    metrics: Arc<SinkMetrics>,
    worker: JoinHandle<()>,
}

impl SinkHandle {
    /// Spawn a worker that flushes only on shutdown.
    pub fn spawn<S: DataSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        Self::spawn_with_flush(sink, queue_capacity, 0)
    }

    /// Spawn a worker that also flushes the sink after every `flush_every`
    /// written halves (0 disables periodic flushing).
    pub fn spawn_with_flush<S: DataSink + Send + 'static>(
        sink: S,
        queue_capacity: usize,
        flush_every: u64,
    ) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker = SinkWorker {
            sink,
            rx,
            metrics: Arc::clone(&metrics),
            flush_every,
            since_flush: 0,
        };
        let worker = tokio::spawn(worker.run());

        Self {
            name,
            tx,
            metrics,
            worker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue a half without waiting.
    pub fn try_send(&self, half: MergedHalf) -> SendOutcome {
        match self.tx.try_send(half) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                SendOutcome::Queued
            }
            Err(mpsc::error::TrySendError::Full(half)) => {
                self.metrics.inc_dropped_count();
                warn!(
                    sink = %self.name,
                    sequence = half.sequence,
                    first_index = half.first_index,
                    "Sink queue full, half dropped"
                );
                SendOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                SendOutcome::Closed
            }
        }
    }

    /// Close the queue and wait until the worker has written, flushed and
    /// closed its sink.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!(sink = %self.name, error = ?e, "Sink worker panicked");
        }
    }
}

struct SinkWorker<S> {
    sink: S,
    rx: mpsc::Receiver<MergedHalf>,
    metrics: Arc<SinkMetrics>,
    flush_every: u64,
    since_flush: u64,
}

impl<S: DataSink> SinkWorker<S> {
    #[instrument(name = "sink_worker", skip(self), fields(sink = %self.sink.name()))]
    async fn run(mut self) {
        debug!("Sink worker started");

        while let Some(half) = self.rx.recv().await {
            self.metrics.set_queue_len(self.rx.len());
            self.write(&half).await;
        }

        if let Err(e) = self.sink.flush().await {
            error!(error = %e, "Final flush failed");
        }
        if let Err(e) = self.sink.close().await {
            error!(error = %e, "Close failed");
        }
        debug!(
            written = self.metrics.write_count(),
            failed = self.metrics.failure_count(),
            "Sink worker stopped"
        );
    }

    async fn write(&mut self, half: &MergedHalf) {
        if let Err(e) = self.sink.write(half).await {
            self.metrics.inc_failure_count();
            error!(sequence = half.sequence, error = %e, "Write failed");
            return;
        }
        self.metrics.record_write(half.sequence);

        if self.flush_every == 0 {
            return;
        }
        self.since_flush += 1;
        if self.since_flush >= self.flush_every {
            self.since_flush = 0;
            match self.sink.flush().await {
                Ok(()) => self.metrics.inc_flush_count(),
                Err(e) => {
                    self.metrics.inc_failure_count();
                    error!(sequence = half.sequence, error = %e, "Periodic flush failed");
                }
            }
        }
    }
}
