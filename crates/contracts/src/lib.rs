//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Monotonic microseconds from the acquisition clock (`Batch::read_time`)
//! - Merged output is indexed by reference-stream sample count

mod batch_source;
mod blueprint;
mod error;
mod merge;
mod merger_config;
mod sample;
mod sink;

pub use batch_source::BatchSource;
pub use blueprint::*;
pub use error::*;
pub use merge::*;
pub use merger_config::*;
pub use sample::*;
pub use sink::*;
