//! Sink implementations
//!
//! Contains LogSink and FileSink.

mod file;
mod log;

pub use self::file::{read_halves, FileFormat, FileSink, FileSinkConfig};
pub use self::log::LogSink;
