#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Live player progress streaming.
//!
//! Monitors capture host game state as snapshots, the aggregator folds them
//! into progress records on a fixed cadence, and a resilient submitter streams
//! the records to a collector over gRPC.

pub mod aggregator;
/// Streaming settings.
pub mod config;
/// Error type shared by the crate.
pub mod error;
pub mod host;
pub mod lifecycle;
/// Progress record types.
pub mod model;
pub mod monitor;
pub mod session;
pub mod submit;
pub mod wire;

mod util;

pub use error::{Error, Result};
pub use util::{new_session_id, new_ulid, now_ms, Clock, ManualClock, SystemClock};
