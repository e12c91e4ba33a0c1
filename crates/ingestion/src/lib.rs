//! # Ingestion
//!
//! IMU data acquisition.
//!
//! Responsibilities:
//! - Decode IMU FIFO reads into `Batch`es
//! - Simulated IMUs with drifting sample clocks
//! - Alternating Left / Right reads on a fixed period
//! - Bounded queue to the merger with backlog detection
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{batch_queue, Acquisition, BackpressureConfig, IngestionMetrics, SimulatedImu};
//!
//! let metrics = Arc::new(IngestionMetrics::new());
//! let (sender, rx) = batch_queue(BackpressureConfig::from(&blueprint.queue), metrics.clone());
//! let acquisition = Acquisition::new(
//!     Box::new(SimulatedImu::new(left_config, 0)),
//!     Box::new(SimulatedImu::new(right_config, 0)),
//!     blueprint.acquisition.clone(),
//!     metrics,
//! )?;
//! let handle = acquisition.spawn(sender, running.clone(), Instant::now());
//!
//! while let Ok(batch) = rx.recv().await {
//!     merger.handle(&batch)?;
//! }
//! ```

mod acquisition;
mod config;
mod error;
mod fifo;
mod queue;
mod simulated;

// Re-exports
pub use acquisition::{Acquisition, AcquisitionStats};
pub use config::{BackpressureConfig, IngestionMetrics, MetricsSnapshot};
pub use error::{IngestionError, Result};
pub use fifo::{decode_fifo, encode_fifo, FifoRecord, FIFO_RECORD_LEN};
pub use queue::{batch_queue, BatchSender};
pub use simulated::{SimulatedImu, GRAVITY_COUNTS};

pub use async_channel::Receiver;
pub use contracts::{Batch, BatchSource};
