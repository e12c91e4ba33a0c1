//! Pipeline orchestrator - wires acquisition, merger and dispatcher.
//!
//! ```text
//! SimulatedImu x2 -> Acquisition task -> batch queue -> merger loop
//!     -> ChannelSink -> Dispatcher -> sinks
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use contracts::{ContractError, RigBlueprint, Source};
use dispatcher::ChannelSink;
use ingestion::{batch_queue, Acquisition, BackpressureConfig, IngestionMetrics, SimulatedImu};
use observability::{record_merge_metrics, record_queue_depth};
use sync_engine::Merger;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{PipelineStats, StopReason};
use crate::error::CliError;

/// How long the dispatcher gets to drain its sinks on shutdown
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub blueprint: RigBlueprint,

    /// Run length (None = until shutdown)
    pub duration: Option<Duration>,

    /// Stop after this many merged halves (None = unlimited)
    pub max_halves: Option<u64>,

    /// Merger -> dispatcher channel capacity
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` resolves, the duration or half limit is reached,
    /// or a fault ends the run.
    ///
    /// Integrity violations and backpressure are returned as errors.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!(port, "Metrics endpoint available");
        }

        // Dispatcher
        if blueprint.sinks.is_empty() {
            warn!("No sinks configured - merged halves will be dropped");
        }
        let (channel_sink, half_rx) = ChannelSink::channel("dispatcher", self.config.buffer_size);
        let dispatcher = dispatcher::create_dispatcher(blueprint.sinks.clone(), half_rx)
            .context("Failed to create dispatcher")?;
        let dispatcher_handle = dispatcher.spawn();
        info!(sinks = blueprint.sinks.len(), "Dispatcher started");

        // Acquisition
        let left = blueprint
            .sensor(Source::Left)
            .cloned()
            .context("blueprint has no left IMU")?;
        let right = blueprint
            .sensor(Source::Right)
            .cloned()
            .context("blueprint has no right IMU")?;
        info!(
            left_odr_hz = left.odr_hz,
            left_drift_ppm = left.drift_ppm,
            right_odr_hz = right.odr_hz,
            right_drift_ppm = right.drift_ppm,
            "Simulated IMUs configured"
        );

        let ingestion_metrics = Arc::new(IngestionMetrics::new());
        let (sender, batch_rx) = batch_queue(
            BackpressureConfig::from(&blueprint.queue),
            Arc::clone(&ingestion_metrics),
        );
        let acquisition = Acquisition::new(
            Box::new(SimulatedImu::new(left, 0)),
            Box::new(SimulatedImu::new(right, 0)),
            blueprint.acquisition.clone(),
            Arc::clone(&ingestion_metrics),
        )
        .context("Failed to set up acquisition")?;

        let clock = Instant::now();
        let running = Arc::new(AtomicBool::new(true));
        let acquisition_handle = acquisition.spawn(sender, Arc::clone(&running), clock);

        // Merger loop
        let mut merger = Merger::new(blueprint.merger.clone(), channel_sink);
        let mut stats = PipelineStats::default();
        let deadline = self.config.duration.map(|duration| clock + duration);
        let max_halves = self.config.max_halves;
        info!(duration = ?self.config.duration, max_halves = ?max_halves, "Pipeline running");

        tokio::pin!(shutdown);
        let outcome: Result<StopReason> = loop {
            let batch = tokio::select! {
                received = batch_rx.recv() => match received {
                    Ok(batch) => batch,
                    Err(_) => break Ok(StopReason::SourceClosed),
                },
                _ = &mut shutdown => break Ok(StopReason::Signal),
                _ = wait_until(deadline) => break Ok(StopReason::Duration),
            };

            stats.batches_received += 1;
            let delay_us = (clock.elapsed().as_micros() as u64).saturating_sub(batch.read_time);
            record_queue_depth(batch_rx.len());

            match merger.handle(&batch) {
                Ok(report) => {
                    record_merge_metrics(&report, delay_us);
                    stats.merge_metrics.update(&report, delay_us);
                }
                Err(ContractError::SinkWrite { sink_name, message }) => {
                    stats.sink_errors += 1;
                    warn!(sink = %sink_name, error = %message, "Merged half not delivered");
                }
                Err(e) if e.is_integrity_violation() => break Err(CliError::Integrity(e).into()),
                Err(e) => break Err(anyhow::Error::new(e).context("Merger failed")),
            }

            if let Some(max) = max_halves {
                if merger.stats().window.halves_flushed >= max {
                    info!(halves = max, "Reached max halves limit");
                    break Ok(StopReason::MaxHalves);
                }
            }
        };

        // Shutdown
        info!("Shutting down pipeline...");
        running.store(false, Ordering::Relaxed);
        drop(batch_rx);

        let acquisition_result = acquisition_handle
            .await
            .context("Acquisition task panicked")?;

        stats.phase = merger.phase();
        stats.reference = merger.reference();
        stats.merger = merger.stats();
        stats.rate_ratio = rate_ratio(&merger);
        let channel_sink = merger.into_sink();
        stats.halves_sent = channel_sink.sent();
        stats.halves_dropped = channel_sink.dropped();
        drop(channel_sink);

        match tokio::time::timeout(DISPATCHER_DRAIN_TIMEOUT, dispatcher_handle).await {
            Ok(Ok(report)) => stats.dispatch = report,
            Ok(Err(e)) => warn!(error = %e, "Dispatcher task failed"),
            Err(_) => warn!("Dispatcher did not drain in time"),
        }

        stats.ingestion = ingestion_metrics.snapshot();
        stats.duration = clock.elapsed();

        let stop_reason = outcome?;
        match acquisition_result {
            Ok(acquisition) => stats.acquisition = acquisition,
            Err(e) if e.is_backpressure() => return Err(CliError::Backpressure(e).into()),
            Err(e) => {
                return Err(CliError::pipeline_execution(format!("acquisition failed: {e}")).into())
            }
        }
        stats.stop_reason = stop_reason;

        debug!(stop_reason = ?stats.stop_reason, "Pipeline stopped");
        info!(
            duration_secs = stats.duration.as_secs_f64(),
            halves = stats.merger.window.halves_flushed,
            halves_per_sec = format!("{:.2}", stats.halves_per_sec()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Left sample period over right, once both clocks are fitted
fn rate_ratio(merger: &Merger<ChannelSink>) -> Option<f64> {
    let left = merger.tracker(Source::Left);
    let right = merger.tracker(Source::Right);
    if left.has_fit() && right.has_fit() {
        Some(left.slope() / right.slope())
    } else {
        None
    }
}
