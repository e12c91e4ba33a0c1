//! Acquisition loop: alternating FIFO reads from the two IMUs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{AcquisitionConfig, Batch, BatchSource, Source};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::config::IngestionMetrics;
use crate::error::{IngestionError, Result};
use crate::queue::BatchSender;

/// Upper bound on startup drain reads per IMU
const MAX_DRAIN_READS: usize = 64;

/// Acquisition counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionStats {
    pub ticks: u64,
    pub left_batches: u64,
    pub right_batches: u64,
    pub delayed_ticks: u64,
    pub drained_records: u64,
}

/// Reads the two IMUs in turn, one per tick.
pub struct Acquisition {
    sources: [Box<dyn BatchSource>; 2],
    config: AcquisitionConfig,
    next: Source,
    last_tick_us: Option<u64>,
    metrics: Arc<IngestionMetrics>,
    stats: AcquisitionStats,
}

impl std::fmt::Debug for Acquisition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquisition")
            .field("config", &self.config)
            .field("next", &self.next)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Acquisition {
    /// # Errors
    /// `Other` if the sources are not one left and one right IMU.
    pub fn new(
        left: Box<dyn BatchSource>,
        right: Box<dyn BatchSource>,
        config: AcquisitionConfig,
        metrics: Arc<IngestionMetrics>,
    ) -> Result<Self> {
        if left.source() != Source::Left || right.source() != Source::Right {
            return Err(contracts::ContractError::Other(format!(
                "acquisition needs a left and a right imu, got {} and {}",
                left.source(),
                right.source()
            ))
            .into());
        }
        Ok(Self {
            sources: [left, right],
            config,
            next: Source::Left,
            last_tick_us: None,
            metrics,
            stats: AcquisitionStats::default(),
        })
    }

    fn period_us(&self) -> u64 {
        self.config.read_period_ms * 1_000
    }

    /// Empty both FIFOs of records queued before acquisition started.
    ///
    /// Reads each IMU until a read returns at most `settle_threshold` records.
    #[instrument(name = "acquisition_drain", skip(self))]
    pub fn drain(&mut self, now_us: u64) -> Result<usize> {
        let mut total = 0;
        for source in Source::BOTH {
            let imu = &mut self.sources[source.index()];
            for _ in 0..MAX_DRAIN_READS {
                let batch = imu.read_batch(now_us, self.config.max_records_per_read)?;
                total += batch.len();
                if batch.len() <= self.config.settle_threshold {
                    break;
                }
            }
        }
        self.stats.drained_records += total as u64;
        self.metrics.record_drained(total);
        debug!(drained = total, "startup fifo drain finished");
        Ok(total)
    }

    /// Read the next IMU in turn.
    pub fn tick(&mut self, now_us: u64) -> Result<Batch> {
        let source = self.next;
        self.next = source.other();

        let delayed = match self.last_tick_us {
            Some(last) => now_us.saturating_sub(last) >= 2 * self.period_us(),
            None => false,
        };
        self.last_tick_us = Some(now_us);

        let mut batch =
            self.sources[source.index()].read_batch(now_us, self.config.max_records_per_read)?;
        batch.delayed = delayed;

        self.stats.ticks += 1;
        match source {
            Source::Left => self.stats.left_batches += 1,
            Source::Right => self.stats.right_batches += 1,
        }
        if delayed {
            self.stats.delayed_ticks += 1;
            self.metrics.record_delayed();
            metrics::counter!("ingestion_delayed_ticks_total").increment(1);
        }
        self.metrics.record_read(batch.len());
        Ok(batch)
    }

    pub fn stats(&self) -> AcquisitionStats {
        self.stats
    }

    /// Run the loop on the tokio runtime until `running` is cleared.
    ///
    /// `clock` is the epoch of the microsecond timestamps handed to the IMUs.
    /// The task ends with an error on backpressure or a failed read, and
    /// returns normally when stopped or when the consumer closes the queue.
    pub fn spawn(
        mut self,
        mut sender: BatchSender,
        running: Arc<AtomicBool>,
        clock: Instant,
    ) -> JoinHandle<Result<AcquisitionStats>> {
        tokio::spawn(async move {
            let now_us = || clock.elapsed().as_micros() as u64;
            let period = Duration::from_millis(self.config.read_period_ms.max(1));

            self.drain(now_us())?;
            info!(
                period_ms = self.config.read_period_ms,
                max_records = self.config.max_records_per_read,
                "acquisition started"
            );

            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            while running.load(Ordering::Relaxed) {
                interval.tick().await;
                let batch = self.tick(now_us())?;
                match sender.send(batch).await {
                    Ok(()) => {}
                    Err(IngestionError::ChannelClosed) => {
                        debug!("batch queue closed, stopping acquisition");
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "acquisition stopped");
                        return Err(err);
                    }
                }
            }

            info!(ticks = self.stats.ticks, "acquisition stopped");
            Ok(self.stats)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackpressureConfig;
    use crate::queue::batch_queue;
    use crate::simulated::SimulatedImu;
    use contracts::{BackpressurePolicy, ImuConfig};

    fn imu(source: Source, start_us: u64) -> Box<dyn BatchSource> {
        Box::new(SimulatedImu::new(
            ImuConfig {
                source,
                odr_hz: 2000.0,
                drift_ppm: 0.0,
                gyro_enabled: false,
                amplitude: 1000,
                signal_hz: 5.0,
                noise: 0,
                seed: 1,
                fifo_capacity: 512,
            },
            start_us,
        ))
    }

    fn acquisition() -> Acquisition {
        Acquisition::new(
            imu(Source::Left, 0),
            imu(Source::Right, 0),
            AcquisitionConfig::default(),
            Arc::new(IngestionMetrics::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_swapped_sources() {
        let result = Acquisition::new(
            imu(Source::Right, 0),
            imu(Source::Left, 0),
            AcquisitionConfig::default(),
            Arc::new(IngestionMetrics::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_ticks_alternate() {
        let mut acquisition = acquisition();
        let sources: Vec<Source> = (1..=4)
            .map(|i| acquisition.tick(i * 2_000).unwrap().source)
            .collect();
        assert_eq!(
            sources,
            vec![Source::Left, Source::Right, Source::Left, Source::Right]
        );
    }

    #[test]
    fn test_tick_batches_follow_rate() {
        let mut acquisition = acquisition();
        let first = acquisition.tick(2_000).unwrap();
        let second = acquisition.tick(4_000).unwrap();
        let third = acquisition.tick(6_000).unwrap();

        assert_eq!(first.len(), 4);
        assert_eq!(second.len(), 8);
        assert_eq!(third.len(), 8);
    }

    #[test]
    fn test_late_tick_is_flagged() {
        let mut acquisition = acquisition();
        assert!(!acquisition.tick(2_000).unwrap().delayed);
        assert!(!acquisition.tick(4_500).unwrap().delayed);
        assert!(acquisition.tick(9_000).unwrap().delayed);
        assert_eq!(acquisition.stats().delayed_ticks, 1);
    }

    #[test]
    fn test_drain_empties_backlog() {
        let mut acquisition = acquisition();
        // 100 ms of samples queued in each FIFO before the first read
        let drained = acquisition.drain(100_000).unwrap();

        assert_eq!(drained, 400);
        let batch = acquisition.tick(102_000).unwrap();
        assert_eq!(batch.len(), 4);
    }

    #[tokio::test]
    async fn test_spawned_loop_delivers_batches() {
        let metrics = Arc::new(IngestionMetrics::new());
        let queue = BackpressureConfig {
            channel_capacity: 64,
            backlog_threshold: 60,
            sustain: 1,
            policy: BackpressurePolicy::Abort,
        };
        let (sender, rx) = batch_queue(queue, metrics.clone());
        let running = Arc::new(AtomicBool::new(true));

        let handle = acquisition().spawn(sender, running.clone(), Instant::now());

        let mut sources = Vec::new();
        for _ in 0..6 {
            sources.push(rx.recv().await.unwrap().source);
        }
        running.store(false, Ordering::Relaxed);
        drop(rx);

        let stats = handle.await.unwrap().unwrap();
        assert!(stats.ticks >= 6);
        assert_eq!(
            &sources[..4],
            &[Source::Left, Source::Right, Source::Left, Source::Right]
        );
        assert!(metrics.snapshot().batches_sent >= 6);
    }
}
