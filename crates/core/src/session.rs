//! Play session boundary: one streaming service per played level.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::aggregator::{ProgressAggregator, ProgressSources, ProgressStreamingService};
use crate::config::StreamerConfig;
use crate::error::Result;
use crate::lifecycle::ServiceHost;
use crate::model::PlayerGameProgress;
use crate::submit::ScoreSubmitter;
use crate::util::{new_session_id, Clock};

/// Builds a fresh submitter for each play session.
pub type SubmitterFactory = Arc<dyn Fn() -> Arc<dyn ScoreSubmitter> + Send + Sync>;

/// Handle for a running play session, returned by
/// [`StreamingSessions::on_session_start`].
pub struct PlaySession {
    id: String,
    player_id: String,
    host: ServiceHost<ProgressStreamingService>,
    submitter: Arc<dyn ScoreSubmitter>,
}

impl PlaySession {
    /// Session id (UUID v4).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Player id sent with every record.
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    /// Whether the streaming loop is still running.
    pub fn is_streaming(&self) -> bool {
        self.host.is_running()
    }

    /// Resolves once the streaming loop stopped, either after the terminal
    /// update or on cancellation.
    pub async fn finished(&self) {
        self.host.stopped().await;
    }

    /// Last record the loop emitted.
    pub async fn last_emitted(&self) -> Option<PlayerGameProgress> {
        self.host.service().last_emitted().await
    }
}

/// Starts and ends streaming for play sessions.
pub struct StreamingSessions {
    config: StreamerConfig,
    clock: Arc<dyn Clock>,
    submitters: SubmitterFactory,
    root: CancellationToken,
}

impl StreamingSessions {
    /// Sessions built from `config`, each with a submitter from `submitters`.
    pub fn new(config: StreamerConfig, clock: Arc<dyn Clock>, submitters: SubmitterFactory) -> Self {
        Self {
            config,
            clock,
            submitters,
            root: CancellationToken::new(),
        }
    }

    /// Cancels every running session.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    /// A level started: wire the producers into a new streaming loop.
    pub fn on_session_start(&self, sources: ProgressSources) -> Result<PlaySession> {
        let id = new_session_id().to_string();
        let player_id = self.config.resolve_player_id(&id);
        let submitter = (self.submitters)();

        let aggregator = ProgressAggregator::new(
            player_id.clone(),
            sources,
            Arc::clone(&self.clock),
            self.config.heartbeat_interval(),
        );
        let service = ProgressStreamingService::new(
            id.clone(),
            aggregator,
            Arc::clone(&submitter),
            self.config.poll_interval(),
        );
        let host = ServiceHost::new(service);
        host.start(&self.root)?;
        tracing::info!(session_id = %id, player_id = %player_id, "play session started");

        Ok(PlaySession {
            id,
            player_id,
            host,
            submitter,
        })
    }

    /// The level ended: stop the loop and release the stream.
    pub async fn on_session_end(&self, session: PlaySession) {
        session.host.stop().await;
        session.submitter.dispose().await;
        tracing::info!(session_id = %session.id, "play session closed");
    }
}
