use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use scorestream_proto as pb;
use scorestream_proto::score_service_client::ScoreServiceClient;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::{Channel, Endpoint};

use super::resilient::{SessionState, StreamConnector, StreamSession};
use crate::config::StreamerConfig;
use crate::error::{Error, Result};
use crate::model::PlayerGameProgress;
use crate::util::new_ulid;

/// Opens `RealtimeScoreStream` calls over one shared, lazily connected channel.
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    channel: Channel,
    buffer: usize,
}

impl GrpcConnector {
    /// Builds the channel without connecting. Must run inside a tokio runtime.
    pub fn new(config: &StreamerConfig) -> Result<Self> {
        let endpoint = Endpoint::from_shared(config.collector_address.clone())?
            .http2_keep_alive_interval(config.keep_alive_interval())
            .keep_alive_timeout(config.keep_alive_timeout())
            .keep_alive_while_idle(true);
        Ok(Self {
            channel: endpoint.connect_lazy(),
            buffer: config.send_buffer.max(1),
        })
    }

    /// Asks the collector for its version.
    pub async fn version(&self) -> Result<pb::Version> {
        let mut client = ScoreServiceClient::new(self.channel.clone());
        Ok(client.get_version(()).await?.into_inner())
    }
}

#[async_trait]
impl StreamConnector for GrpcConnector {
    async fn open(&self) -> Result<Box<dyn StreamSession>> {
        let id = new_ulid().to_string();
        let (tx, rx) = mpsc::channel(self.buffer);
        let state = Arc::new(AtomicU8::new(SessionState::Opening as u8));
        let client = ScoreServiceClient::new(self.channel.clone());
        tokio::spawn(drive(client, rx, Arc::clone(&state), id.clone()));
        Ok(Box::new(GrpcStreamSession {
            id,
            state,
            tx: Some(tx),
        }))
    }
}

// Runs the call for the lifetime of the session and mirrors its health into
// `state`. Acks are drained and otherwise ignored.
async fn drive(
    mut client: ScoreServiceClient<Channel>,
    rx: mpsc::Receiver<pb::PlayerGameProgress>,
    state: Arc<AtomicU8>,
    id: String,
) {
    let response = match client.realtime_score_stream(ReceiverStream::new(rx)).await {
        Ok(response) => response,
        Err(status) => {
            tracing::error!(session_id = %id, error = %status, "score stream failed to open");
            state.store(SessionState::Dead as u8, Ordering::Release);
            return;
        }
    };
    state.store(SessionState::Alive as u8, Ordering::Release);
    tracing::debug!(session_id = %id, "score stream accepted");

    let mut acks = response.into_inner();
    loop {
        match acks.message().await {
            Ok(Some(ack)) => tracing::trace!(session_id = %id, received = ack.received, "ack"),
            Ok(None) => {
                tracing::debug!(session_id = %id, "score stream ended");
                state.store(SessionState::Closed as u8, Ordering::Release);
                break;
            }
            Err(status) => {
                tracing::error!(session_id = %id, error = %status, "score stream broke");
                state.store(SessionState::Dead as u8, Ordering::Release);
                break;
            }
        }
    }
}

/// One `RealtimeScoreStream` call.
pub struct GrpcStreamSession {
    id: String,
    state: Arc<AtomicU8>,
    tx: Option<mpsc::Sender<pb::PlayerGameProgress>>,
}

#[async_trait]
impl StreamSession for GrpcStreamSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> SessionState {
        let state = SessionState::from_u8(self.state.load(Ordering::Acquire));
        // Half-closed locally while the collector is still draining.
        if self.tx.is_none() && state.is_usable() {
            SessionState::Closed
        } else {
            state
        }
    }

    async fn send(&mut self, progress: &PlayerGameProgress) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::StreamClosed(self.id.clone()))?;
        tx.send(pb::PlayerGameProgress::from(progress))
            .await
            .map_err(|_| Error::StreamClosed(self.id.clone()))
    }

    async fn close_send(&mut self) -> Result<()> {
        // Dropping the sender ends the request stream.
        match self.tx.take() {
            Some(_) => Ok(()),
            None => Err(Error::StreamClosed(self.id.clone())),
        }
    }

    fn shutdown(mut self: Box<Self>) {
        self.tx.take();
        tracing::debug!(session_id = %self.id, state = ?self.state(), "stream session shut down");
    }
}
