use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use scorestream_collector::{serve, ProgressBoard, ScoreCollector};
use scorestream_core::config::StreamerConfig;
use scorestream_core::model::{PlayState, PlayerGameProgress};
use scorestream_core::submit::{GrpcConnector, ResilientSubmitter, ScoreSubmitter, SessionState};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Collector {
    addr: SocketAddr,
    board: Arc<ProgressBoard>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Collector {
    async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let board = Arc::new(ProgressBoard::new());
        let collector = ScoreCollector::new(Arc::clone(&board));
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            serve(listener, collector, async {
                let _ = stopped.await;
            })
            .await
            .unwrap();
        });
        Self {
            addr,
            board,
            stop: Some(stop),
            handle,
        }
    }

    fn config(&self) -> StreamerConfig {
        StreamerConfig {
            collector_address: format!("http://{}", self.addr),
            ..Default::default()
        }
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

fn progress(player: &str, score: i32, state: PlayState) -> PlayerGameProgress {
    let mut p = PlayerGameProgress {
        player_id: player.into(),
        play_state: state,
        ..Default::default()
    };
    p.game_progress.score.current_score = score;
    p.song_progress.duration_ms = 3_000;
    p
}

async fn wait_for<F: Fn(&ProgressBoard) -> bool>(board: &ProgressBoard, done: F) {
    for _ in 0..200 {
        if done(board) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("collector never reached the expected state");
}

#[tokio::test]
async fn streams_updates_and_finish_to_collector() {
    let collector = Collector::start().await;
    let connector = GrpcConnector::new(&collector.config()).unwrap();
    let submitter = ResilientSubmitter::new(connector);

    for score in [100, 200, 300] {
        submitter
            .submit_score(&progress("player-1", score, PlayState::Playing))
            .await
            .unwrap();
    }
    submitter
        .submit_finish_score(&progress("player-1", 450, PlayState::Finished))
        .await
        .unwrap();

    wait_for(&collector.board, |b| {
        b.get("player-1").map(|r| r.finished).unwrap_or(false)
    })
    .await;

    let record = collector.board.get("player-1").unwrap();
    assert_eq!(record.updates, 4);
    assert_eq!(record.latest.play_state, PlayState::Finished);
    assert_eq!(record.latest.game_progress.score.current_score, 450);
    assert_eq!(record.latest.song_progress.duration_ms, 3_000);

    submitter.dispose().await;
    assert_eq!(submitter.state().await, SessionState::Uninitialized);
    collector.shutdown().await;
}

#[tokio::test]
async fn new_stream_after_finish_reaches_collector() {
    let collector = Collector::start().await;
    let submitter = ResilientSubmitter::new(GrpcConnector::new(&collector.config()).unwrap());

    submitter
        .submit_finish_score(&progress("p", 10, PlayState::Failed))
        .await
        .unwrap();
    wait_for(&collector.board, |b| b.get("p").is_some()).await;

    // The half-closed session is replaced on the next submit.
    submitter
        .submit_score(&progress("p", 20, PlayState::Playing))
        .await
        .unwrap();
    wait_for(&collector.board, |b| {
        b.get("p").map(|r| r.updates == 2).unwrap_or(false)
    })
    .await;

    let record = collector.board.get("p").unwrap();
    assert!(!record.finished);
    assert_eq!(record.latest.game_progress.score.current_score, 20);
    collector.shutdown().await;
}

#[tokio::test]
async fn reports_package_version() {
    let collector = Collector::start().await;
    let connector = GrpcConnector::new(&collector.config()).unwrap();

    let version = connector.version().await.unwrap();
    assert_eq!(version.to_string(), env!("CARGO_PKG_VERSION"));
    collector.shutdown().await;
}

#[tokio::test]
async fn unreachable_collector_does_not_fail_submits() {
    // Bind and drop to get a port nobody listens on.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let config = StreamerConfig {
        collector_address: format!("http://{addr}"),
        ..Default::default()
    };
    let submitter = ResilientSubmitter::new(GrpcConnector::new(&config).unwrap());

    submitter
        .submit_score(&progress("p", 1, PlayState::Playing))
        .await
        .unwrap();
    submitter.dispose().await;
}
