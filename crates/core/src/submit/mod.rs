//! Delivery of progress records to the collector.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::PlayerGameProgress;

mod grpc;
mod resilient;

pub use grpc::{GrpcConnector, GrpcStreamSession};
pub use resilient::{ResilientSubmitter, SessionState, StreamConnector, StreamSession};

/// Sink for emitted progress records.
#[async_trait]
pub trait ScoreSubmitter: Send + Sync {
    /// Sends one incremental update.
    async fn submit_score(&self, progress: &PlayerGameProgress) -> Result<()>;

    /// Sends the terminal update and closes the outbound stream.
    async fn submit_finish_score(&self, progress: &PlayerGameProgress) -> Result<()>;

    /// Releases transport resources. Later submits may fail.
    async fn dispose(&self) {}
}

/// Submitter that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSubmitter;

#[async_trait]
impl ScoreSubmitter for NoopSubmitter {
    async fn submit_score(&self, _progress: &PlayerGameProgress) -> Result<()> {
        Ok(())
    }

    async fn submit_finish_score(&self, _progress: &PlayerGameProgress) -> Result<()> {
        Ok(())
    }
}
