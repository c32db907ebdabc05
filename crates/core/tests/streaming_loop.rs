//! Integration tests for the streaming loop and session boundary.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use scorestream_core::aggregator::{ProgressAggregator, ProgressSources, ProgressStreamingService};
use scorestream_core::config::StreamerConfig;
use scorestream_core::host::{EnergyType, HostSource, LevelInfo};
use scorestream_core::lifecycle::ServiceHost;
use scorestream_core::model::{PlayState, PlayerGameProgress};
use scorestream_core::monitor::{ComboMonitor, EnergyMonitor, PauseMonitor, ScoreMonitor};
use scorestream_core::session::StreamingSessions;
use scorestream_core::submit::{NoopSubmitter, ScoreSubmitter};
use scorestream_core::{Clock, Error, Result};
use tokio_util::sync::CancellationToken;

const EPOCH_MS: i64 = 1_700_000_000_000;

/// Wall clock that follows tokio's (pausable) time.
struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> i64 {
        EPOCH_MS + self.origin.elapsed().as_millis() as i64
    }
}

/// Song that plays in real (tokio) time from construction.
struct PlayingSong {
    origin: tokio::time::Instant,
    length: Duration,
}

impl HostSource for PlayingSong {
    fn song_time(&self) -> Duration {
        self.origin.elapsed().min(self.length)
    }

    fn song_length(&self) -> Duration {
        self.length
    }

    fn level(&self) -> LevelInfo {
        LevelInfo {
            level_id: "custom_level_0123456789ABCDEF0123456789ABCDEF01234567".into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Score,
    Finish,
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<(Call, PlayerGameProgress)>>,
    disposed: AtomicUsize,
    failing: AtomicBool,
}

impl Recorder {
    fn kinds(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(c, _)| *c).collect()
    }

    fn record(&self, call: Call, progress: &PlayerGameProgress) -> Result<()> {
        self.calls.lock().push((call, progress.clone()));
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::StreamClosed("test".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ScoreSubmitter for Recorder {
    async fn submit_score(&self, progress: &PlayerGameProgress) -> Result<()> {
        self.record(Call::Score, progress)
    }

    async fn submit_finish_score(&self, progress: &PlayerGameProgress) -> Result<()> {
        self.record(Call::Finish, progress)
    }

    async fn dispose(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

struct Rig {
    clock: Arc<TokioClock>,
    score: Arc<ScoreMonitor>,
    sources: ProgressSources,
}

fn rig(song: Duration) -> Rig {
    let clock = Arc::new(TokioClock::new());
    let score = Arc::new(ScoreMonitor::new(clock.clone()));
    let sources = ProgressSources {
        score: score.clone(),
        combo: Arc::new(ComboMonitor::new(clock.clone())),
        energy: Arc::new(EnergyMonitor::new(clock.clone(), EnergyType::Bar, 0)),
        pause: Arc::new(PauseMonitor::new(clock.clone())),
        host: Arc::new(PlayingSong {
            origin: tokio::time::Instant::now(),
            length: song,
        }),
    };
    Rig {
        clock,
        score,
        sources,
    }
}

fn streaming_host(rig: &Rig, submitter: Arc<Recorder>) -> ServiceHost<ProgressStreamingService> {
    let aggregator = ProgressAggregator::new(
        "player",
        rig.sources.clone(),
        rig.clock.clone(),
        Duration::from_secs(1),
    );
    ServiceHost::new(ProgressStreamingService::new(
        "session",
        aggregator,
        submitter,
        Duration::from_millis(250),
    ))
}

#[tokio::test(start_paused = true)]
async fn quiet_song_heartbeats_then_finishes_once() {
    let rig = rig(Duration::from_secs(3));
    let recorder = Arc::new(Recorder::default());
    let host = streaming_host(&rig, recorder.clone());

    host.start(&CancellationToken::new()).unwrap();
    host.stopped().await;

    assert_eq!(
        recorder.kinds(),
        vec![Call::Score, Call::Score, Call::Score, Call::Finish]
    );
    let calls = recorder.calls.lock();
    let stamps: Vec<_> = calls.iter().map(|(_, p)| p.client_timestamp_ms - EPOCH_MS).collect();
    assert_eq!(stamps, vec![0, 1_000, 2_000, 3_000]);

    let (_, last) = calls.last().unwrap();
    assert_eq!(last.play_state, PlayState::Finished);
    assert_eq!(last.game_progress.ended_at_ms, Some(EPOCH_MS + 3_000));
    assert_eq!(last.game_progress.song_hash, "0123456789ABCDEF0123456789ABCDEF01234567");
}

#[tokio::test(start_paused = true)]
async fn score_changes_are_sent_on_the_next_tick() {
    let rig = rig(Duration::from_secs(10));
    let recorder = Arc::new(Recorder::default());
    let host = streaming_host(&rig, recorder.clone());
    host.start(&CancellationToken::new()).unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    rig.score.score_did_change(115, 115, 115, 115);
    tokio::time::sleep(Duration::from_millis(300)).await;
    host.stop().await;

    let calls = recorder.calls.lock();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].1.game_progress.score.current_score, 115);
    assert_eq!(calls[1].1.client_timestamp_ms - EPOCH_MS, 500);
    assert!(calls.iter().all(|(c, _)| *c == Call::Score));
}

#[tokio::test(start_paused = true)]
async fn stop_mid_song_sends_no_final_update() {
    let rig = rig(Duration::from_secs(60));
    let recorder = Arc::new(Recorder::default());
    let host = streaming_host(&rig, recorder.clone());
    host.start(&CancellationToken::new()).unwrap();

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    host.stop().await;

    assert!(!recorder.kinds().contains(&Call::Finish));
    assert!(!host.is_running());
}

#[tokio::test(start_paused = true)]
async fn submit_errors_do_not_stop_the_loop() {
    let rig = rig(Duration::from_secs(2));
    let recorder = Arc::new(Recorder::default());
    recorder.failing.store(true, Ordering::SeqCst);
    let host = streaming_host(&rig, recorder.clone());

    host.start(&CancellationToken::new()).unwrap();
    host.stopped().await;

    assert_eq!(recorder.kinds(), vec![Call::Score, Call::Score, Call::Finish]);
}

#[tokio::test(start_paused = true)]
async fn session_boundary_runs_and_disposes() {
    let rig = rig(Duration::from_secs(2));
    let recorder = Arc::new(Recorder::default());
    let factory_recorder = recorder.clone();
    let sessions = StreamingSessions::new(
        StreamerConfig::default(),
        rig.clock.clone(),
        Arc::new(move || factory_recorder.clone() as Arc<dyn ScoreSubmitter>),
    );

    let session = sessions.on_session_start(rig.sources.clone()).unwrap();
    // No player id configured: the session id stands in.
    assert_eq!(session.player_id(), session.id());
    session.finished().await;

    let last = session.last_emitted().await.unwrap();
    assert_eq!(last.play_state, PlayState::Finished);
    assert_eq!(last.player_id, session.id());

    sessions.on_session_end(session).await;
    assert_eq!(recorder.disposed.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.kinds().last(), Some(&Call::Finish));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_running_sessions() {
    let rig = rig(Duration::from_secs(60));
    let recorder = Arc::new(Recorder::default());
    let factory_recorder = recorder.clone();
    let config = StreamerConfig {
        player_id: Some("76561198000000000".into()),
        ..Default::default()
    };
    let sessions = StreamingSessions::new(
        config,
        rig.clock.clone(),
        Arc::new(move || factory_recorder.clone() as Arc<dyn ScoreSubmitter>),
    );

    let session = sessions.on_session_start(rig.sources.clone()).unwrap();
    assert_eq!(session.player_id(), "76561198000000000");
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(session.is_streaming());

    sessions.shutdown();
    session.finished().await;
    assert!(!recorder.kinds().contains(&Call::Finish));
}

#[tokio::test(start_paused = true)]
async fn noop_submitter_runs_to_the_final_update() {
    let rig = rig(Duration::from_secs(2));
    let aggregator = ProgressAggregator::new(
        "player",
        rig.sources.clone(),
        rig.clock.clone(),
        Duration::from_secs(1),
    );
    let host = ServiceHost::new(ProgressStreamingService::new(
        "session",
        aggregator,
        Arc::new(NoopSubmitter),
        Duration::from_millis(250),
    ));

    host.start(&CancellationToken::new()).unwrap();
    host.stopped().await;

    let last = host.service().last_emitted().await.unwrap();
    assert_eq!(last.play_state, PlayState::Finished);
    assert_eq!(last.client_timestamp_ms - EPOCH_MS, 2_000);
}

#[tokio::test(start_paused = true)]
async fn empty_song_finishes_on_the_first_tick() {
    let rig = rig(Duration::ZERO);
    let recorder = Arc::new(Recorder::default());
    let host = streaming_host(&rig, recorder.clone());

    host.start(&CancellationToken::new()).unwrap();
    host.stopped().await;

    assert_eq!(recorder.kinds(), vec![Call::Finish]);
}
