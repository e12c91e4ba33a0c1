//! Dispatcher - fan-out of merged halves to sinks

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use contracts::{MergedHalf, SinkConfig, SinkType, HALF_LEN};

use crate::error::DispatcherError;
use crate::handle::{SendOutcome, SinkHandle};
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LogSink};

/// Final state of one sink
#[derive(Debug, Clone, Serialize)]
pub struct SinkReport {
    pub name: String,
    pub metrics: MetricsSnapshot,
}

/// What the dispatcher saw on its input and handed to each sink
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub halves_received: u64,
    /// Halves missing from the input, by sequence number
    pub input_gaps: u64,
    /// Halves whose `first_index` does not continue the previous half
    pub index_breaks: u64,
    /// Halves no sink accepted
    pub undelivered: u64,
    pub sinks: Vec<SinkReport>,
}

impl DispatchReport {
    pub fn sink(&self, name: &str) -> Option<&MetricsSnapshot> {
        self.sinks
            .iter()
            .find(|report| report.name == name)
            .map(|report| &report.metrics)
    }
}

/// Fans merged halves out to all sinks
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<MergedHalf>,
    report: DispatchReport,
    previous: Option<(u64, i64)>,
}

impl Dispatcher {
    pub fn new(handles: Vec<SinkHandle>, input_rx: mpsc::Receiver<MergedHalf>) -> Self {
        Self {
            handles,
            input_rx,
            report: DispatchReport::default(),
            previous: None,
        }
    }

    /// Live metrics of every sink
    pub fn metrics(&self) -> Vec<SinkReport> {
        self.handles
            .iter()
            .map(|h| SinkReport {
                name: h.name().to_string(),
                metrics: h.metrics().snapshot(),
            })
            .collect()
    }

    /// Run until the input channel is closed, then drain and close every sink.
    #[instrument(name = "dispatcher_run", skip(self), fields(sinks = self.handles.len()))]
    pub async fn run(mut self) -> DispatchReport {
        info!("Dispatcher started");

        while let Some(half) = self.input_rx.recv().await {
            self.check_continuity(&half);
            self.dispatch_half(half);

            if self.report.halves_received % 100 == 0 {
                debug!(halves = self.report.halves_received, "Dispatcher progress");
            }
        }

        info!(
            halves = self.report.halves_received,
            input_gaps = self.report.input_gaps,
            index_breaks = self.report.index_breaks,
            "Dispatcher input closed, draining sinks"
        );

        let mut report = self.report;
        for handle in self.handles {
            let name = handle.name().to_string();
            let metrics = std::sync::Arc::clone(handle.metrics());
            handle.shutdown().await;
            report.sinks.push(SinkReport {
                name,
                metrics: metrics.snapshot(),
            });
        }
        report
    }

    pub fn spawn(self) -> JoinHandle<DispatchReport> {
        tokio::spawn(self.run())
    }

    /// Consecutive halves continue each other by sequence and by index.
    fn check_continuity(&mut self, half: &MergedHalf) {
        self.report.halves_received += 1;

        if let Some((sequence, first_index)) = self.previous {
            let missing = half.sequence.saturating_sub(sequence + 1);
            if missing > 0 {
                self.report.input_gaps += missing;
                warn!(
                    after = sequence,
                    sequence = half.sequence,
                    missing,
                    "Halves lost before dispatch"
                );
            }
            let continues = half.sequence > sequence
                && half.first_index
                    == first_index + (half.sequence - sequence) as i64 * HALF_LEN as i64;
            if !continues {
                self.report.index_breaks += 1;
                warn!(
                    previous_sequence = sequence,
                    previous_index = first_index,
                    sequence = half.sequence,
                    first_index = half.first_index,
                    "Merged stream does not continue"
                );
            }
        }
        self.previous = Some((half.sequence, half.first_index));
    }

    fn dispatch_half(&mut self, half: MergedHalf) {
        let mut delivered = false;
        if let Some((last, rest)) = self.handles.split_last() {
            for handle in rest {
                delivered |= handle.try_send(half.clone()) == SendOutcome::Queued;
            }
            delivered |= last.try_send(half) == SendOutcome::Queued;
        }
        if !delivered {
            self.report.undelivered += 1;
        }
    }
}

/// Build one sink worker per configuration entry.
///
/// `flush_every` in a sink's params enables periodic flushing.
#[instrument(
    name = "dispatcher_create",
    skip(sink_configs, input_rx),
    fields(sinks = sink_configs.len())
)]
pub fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<MergedHalf>,
) -> Result<Dispatcher, DispatcherError> {
    let handles = sink_configs
        .iter()
        .map(create_sink_handle)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Dispatcher::new(handles, input_rx))
}

fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    let flush_every = match config.params.get("flush_every") {
        Some(value) => value.parse::<u64>().map_err(|e| {
            DispatcherError::sink_creation(&config.name, format!("flush_every '{value}': {e}"))
        })?,
        None => 0,
    };

    let handle = match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::from_params(&config.name, &config.params);
            SinkHandle::spawn_with_flush(sink, config.queue_capacity, flush_every)
        }
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            info!(sink = %config.name, path = %sink.path().display(), "File sink opened");
            SinkHandle::spawn_with_flush(sink, config.queue_capacity, flush_every)
        }
    };
    Ok(handle)
}
