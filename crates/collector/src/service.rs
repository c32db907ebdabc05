use std::pin::Pin;
use std::sync::Arc;

use scorestream_core::model::PlayerGameProgress;
use scorestream_core::now_ms;
use scorestream_proto as pb;
use scorestream_proto::score_service_server::ScoreService;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};

use crate::board::ProgressBoard;

const ACK_BUFFER: usize = 32;

/// gRPC collector for live progress streams.
#[derive(Debug, Clone)]
pub struct ScoreCollector {
    board: Arc<ProgressBoard>,
    dump_json: bool,
}

impl ScoreCollector {
    /// Collector recording into `board`.
    pub fn new(board: Arc<ProgressBoard>) -> Self {
        Self {
            board,
            dump_json: false,
        }
    }

    /// Log every received message as JSON.
    pub fn with_json_dump(mut self, enabled: bool) -> Self {
        self.dump_json = enabled;
        self
    }

    /// The board this collector records into.
    pub fn board(&self) -> &Arc<ProgressBoard> {
        &self.board
    }
}

#[tonic::async_trait]
impl ScoreService for ScoreCollector {
    async fn get_version(&self, _request: Request<()>) -> Result<Response<pb::Version>, Status> {
        Ok(Response::new(pb::Version::parse(env!("CARGO_PKG_VERSION"))))
    }

    type RealtimeScoreStreamStream = Pin<Box<dyn Stream<Item = Result<pb::StreamAck, Status>> + Send>>;

    async fn realtime_score_stream(
        &self,
        request: Request<Streaming<pb::PlayerGameProgress>>,
    ) -> Result<Response<Self::RealtimeScoreStreamStream>, Status> {
        let peer = request.remote_addr();
        let mut stream = request.into_inner();
        let (tx, rx) = mpsc::channel(ACK_BUFFER);
        let board = Arc::clone(&self.board);
        let dump_json = self.dump_json;

        tracing::info!(?peer, "score stream opened");
        tokio::spawn(async move {
            let mut received = 0u64;
            while let Some(result) = stream.next().await {
                let msg = match result {
                    Ok(msg) => msg,
                    Err(status) => {
                        tracing::warn!(?peer, error = %status, "score stream broke");
                        break;
                    }
                };
                received += 1;

                if dump_json {
                    match serde_json::to_string(&msg) {
                        Ok(json) => tracing::info!(%json, "progress"),
                        Err(e) => tracing::warn!(error = %e, "failed to encode progress as json"),
                    }
                }

                match PlayerGameProgress::try_from(msg) {
                    Ok(progress) => record(&board, progress),
                    Err(e) => tracing::warn!(?peer, error = %e, "dropping malformed progress"),
                }

                // Acks are advisory; a client that does not read them is not stalled.
                let ack = pb::StreamAck {
                    received,
                    server_timestamp: now_ms(),
                };
                if let Err(TrySendError::Closed(_)) = tx.try_send(Ok(ack)) {
                    break;
                }
            }
            tracing::info!(?peer, received, "score stream closed");
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

fn record(board: &ProgressBoard, progress: PlayerGameProgress) {
    let player_id = progress.player_id.clone();
    let state = progress.play_state;
    let score = progress.game_progress.score.current_score;
    let updates = board.record(progress);
    if state.is_terminal() {
        tracing::info!(%player_id, ?state, score, updates, "play finished");
    } else {
        tracing::debug!(%player_id, ?state, score, updates, "progress");
    }
}
