//! # Dispatcher
//!
//! Merged output distribution.
//!
//! Responsible for:
//! - Bridging the synchronous merger to async consumers (`ChannelSink`)
//! - Fan-out of `MergedHalf`s to multiple sinks
//! - Isolating slow sinks so they never block the merger

pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use channel::ChannelSink;
pub use contracts::{DataSink, MergedHalf};
pub use dispatcher::{create_dispatcher, DispatchReport, Dispatcher, SinkReport};
pub use error::DispatcherError;
pub use handle::{SendOutcome, SinkHandle};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{read_halves, FileFormat, FileSink, FileSinkConfig, LogSink};
