//! # Sync Engine
//!
//! Two-IMU merge core.
//!
//! Responsible for:
//! - per-IMU sample clock estimation (decaying regression of batch completion times)
//! - reference selection (the faster IMU)
//! - resampling the other IMU onto the reference sample instants
//! - assembling merged records in a ping-pong window of two halves
//!
//! ## Usage
//!
//! ```ignore
//! use sync_engine::{Merger, MergerConfig};
//!
//! let mut merger = Merger::new(MergerConfig::default(), Vec::new());
//!
//! // Batches alternate Left / Right
//! let report = merger.handle(&batch)?;
//! for half in merger.sink_mut().drain(..) {
//!     // Forward merged half
//! }
//! ```

mod fitter;
mod merger;
mod pingpong;
mod tracker;

pub use fitter::DecayingFitter;
pub use merger::{Merger, MergerStats};
pub use pingpong::{PingPong, PingPongStats, SlotWrite};
pub use tracker::{reproject, Projection, SensorTracker};

// Re-export contracts types
pub use contracts::{Batch, HandleReport, MergePhase, MergeSink, MergedHalf, MergerConfig};
