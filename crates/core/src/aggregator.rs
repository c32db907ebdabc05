//! Progress aggregation and the streaming loop.
//!
//! Every tick the aggregator reads the latest snapshot of each producer plus
//! the host's song timing, folds them onto the last emitted record and decides
//! whether the result is worth sending. The streaming service runs that
//! decision on a fixed cadence and hands emitted records to a submitter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::host::{HostSource, LevelEnd};
use crate::lifecycle::Service;
use crate::model::{
    GamePlayOptions, GamePlayStatistics, GameProgress, GameplayModifiers, PlayState,
    PlayerGameProgress, ScoreProgress, ScoreProgressDetails, SongProgress,
};
use crate::monitor::{
    ComboSnapshot, EnergySnapshot, PauseStateSnapshot, ScoreSnapshot, SnapshotSource,
};
use crate::submit::ScoreSubmitter;
use crate::util::Clock;

/// Everything the aggregator reads on a tick.
#[derive(Clone)]
pub struct ProgressSources {
    /// Score producer.
    pub score: Arc<dyn SnapshotSource<ScoreSnapshot>>,
    /// Combo producer.
    pub combo: Arc<dyn SnapshotSource<ComboSnapshot>>,
    /// Energy producer.
    pub energy: Arc<dyn SnapshotSource<EnergySnapshot>>,
    /// Pause producer.
    pub pause: Arc<dyn SnapshotSource<PauseStateSnapshot>>,
    /// Song timing and level data.
    pub host: Arc<dyn HostSource>,
}

/// Inputs to [`derive_play_state`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayStateInputs {
    /// Song playhead.
    pub position_ms: i64,
    /// Song length.
    pub length_ms: i64,
    /// Early end reported by the host.
    pub level_end: Option<LevelEnd>,
    /// Pause menu open.
    pub paused: bool,
    /// Energy bar value.
    pub energy: f32,
    /// Active modifiers.
    pub modifiers: GameplayModifiers,
}

/// Play state by fixed priority: finished, failed, quit, paused, soft-failed,
/// playing. A playhead at or past the song length is always finished.
pub fn derive_play_state(inputs: PlayStateInputs) -> PlayState {
    if inputs.position_ms >= inputs.length_ms {
        return PlayState::Finished;
    }
    match inputs.level_end {
        Some(LevelEnd::Failed) => return PlayState::Failed,
        Some(LevelEnd::Quit) => return PlayState::Quit,
        None => {}
    }
    if inputs.paused {
        PlayState::Paused
    } else if inputs.energy <= 0.0 && inputs.modifiers.contains(GameplayModifiers::NO_FAIL) {
        PlayState::SoftFailed
    } else {
        PlayState::Playing
    }
}

/// Wall-clock song start inferred from the playhead.
///
/// Slowed songs take longer than their playhead suggests, so the elapsed time
/// is scaled back up. Time spent paused is subtracted.
pub fn infer_started_at(now_ms: i64, position_ms: i64, speed_mul: f64, total_pause_ms: i64) -> i64 {
    let elapsed_ms = if speed_mul > 0.0 && speed_mul < 1.0 {
        (position_ms as f64 / speed_mul).round() as i64
    } else {
        position_ms
    };
    now_ms - elapsed_ms - total_pause_ms.max(0)
}

/// Why a record was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitReason {
    /// Nothing was emitted before.
    First,
    /// Something other than elapsed time changed.
    Changed,
    /// Nothing changed for a full heartbeat interval.
    Heartbeat,
}

/// Folds producer snapshots into [`PlayerGameProgress`] records.
pub struct ProgressAggregator {
    player_id: String,
    sources: ProgressSources,
    clock: Arc<dyn Clock>,
    heartbeat_ms: i64,
    last: Option<PlayerGameProgress>,
}

impl ProgressAggregator {
    /// Aggregator for one play; unchanged records are resent every `heartbeat`.
    pub fn new(
        player_id: impl Into<String>,
        sources: ProgressSources,
        clock: Arc<dyn Clock>,
        heartbeat: Duration,
    ) -> Self {
        Self {
            player_id: player_id.into(),
            sources,
            clock,
            heartbeat_ms: heartbeat.as_millis() as i64,
            last: None,
        }
    }

    /// Last record handed out by [`poll`](Self::poll).
    pub fn last_emitted(&self) -> Option<&PlayerGameProgress> {
        self.last.as_ref()
    }

    /// Builds this tick's record on top of the last emitted one.
    pub fn sample(&self) -> PlayerGameProgress {
        let now = self.clock.now_ms();
        let score = self.sources.score.latest();
        let combo = self.sources.combo.latest();
        let energy = self.sources.energy.latest();
        let pause = self.sources.pause.latest();
        let host = &self.sources.host;
        let level = host.level();

        let position_ms = host.song_time().as_millis() as i64;
        let length_ms = host.song_length().as_millis() as i64;
        let modifiers = level.modifiers.flags();
        let pause_stats = pause.statistics_at(now);

        let play_state = derive_play_state(PlayStateInputs {
            position_ms,
            length_ms,
            level_end: host.level_end(),
            paused: pause.is_paused,
            energy: energy.energy,
            modifiers,
        });

        let base = self.last.clone().unwrap_or_default();
        let started_at_ms = base.game_progress.started_at_ms.or_else(|| {
            Some(infer_started_at(
                now,
                position_ms,
                level.modifiers.song_speed_mul(),
                pause_stats.total_pause_duration_ms,
            ))
        });
        let ended_at_ms = if play_state.is_terminal() {
            Some(now)
        } else {
            base.game_progress.ended_at_ms
        };

        PlayerGameProgress {
            player_id: self.player_id.clone(),
            client_timestamp_ms: now,
            song_timestamp_ms: position_ms,
            play_state,
            game_mode: level.game_mode(),
            statistics: GamePlayStatistics {
                options: GamePlayOptions { modifiers },
                pause: pause_stats,
            },
            game_progress: GameProgress {
                song_hash: level.song_hash(),
                beatmap_level_id: level.level_id,
                characteristic: level.characteristic,
                difficulty: level.difficulty,
                started_at_ms,
                ended_at_ms,
                score: ScoreProgress {
                    current_score: score.score,
                    current_max_score: score.max_score,
                    current_score_modified: score.modified_score,
                    current_max_score_modified: score.max_modified_score,
                    details: ScoreProgressDetails {
                        notes_total: level.beatmap.notes,
                        bombs_total: level.beatmap.bombs,
                        obstacles_total: level.beatmap.obstacles,
                        max_combo: combo.max_combo,
                        combo: combo.combo,
                        multiplier: score.multiplier,
                        multiplier_progress: score.multiplier_progress,
                        energy: energy.energy,
                        ..base.game_progress.score.details
                    },
                },
            },
            song_progress: SongProgress {
                duration_ms: length_ms,
                position_ms,
            },
        }
    }

    /// Samples and returns the record if it should be sent now.
    pub fn poll(&mut self) -> Option<(PlayerGameProgress, EmitReason)> {
        let next = self.sample();
        let reason = match &self.last {
            None => EmitReason::First,
            Some(last) if !last.same_progress(&next) => EmitReason::Changed,
            Some(last) if next.client_timestamp_ms - last.client_timestamp_ms >= self.heartbeat_ms => {
                EmitReason::Heartbeat
            }
            Some(_) => return None,
        };
        self.last = Some(next.clone());
        Some((next, reason))
    }
}

/// Streams one play session: polls the aggregator on a fixed cadence and
/// submits what it emits until the terminal update has gone out.
pub struct ProgressStreamingService {
    session_id: String,
    aggregator: Mutex<ProgressAggregator>,
    submitter: Arc<dyn ScoreSubmitter>,
    poll_interval: Duration,
}

impl ProgressStreamingService {
    /// Loop polling `aggregator` every `poll_interval`.
    pub fn new(
        session_id: impl Into<String>,
        aggregator: ProgressAggregator,
        submitter: Arc<dyn ScoreSubmitter>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            aggregator: Mutex::new(aggregator),
            submitter,
            poll_interval,
        }
    }

    /// Last record emitted, if any.
    pub async fn last_emitted(&self) -> Option<PlayerGameProgress> {
        self.aggregator.lock().await.last_emitted().cloned()
    }
}

#[async_trait]
impl Service for ProgressStreamingService {
    fn name(&self) -> &str {
        "progress-stream"
    }

    async fn run(&self, stopping: CancellationToken) -> Result<()> {
        loop {
            let tick_started = tokio::time::Instant::now();

            let polled = self.aggregator.lock().await.poll();
            if let Some((progress, reason)) = polled {
                tracing::debug!(
                    session_id = %self.session_id,
                    ?reason,
                    state = ?progress.play_state,
                    score = progress.game_progress.score.current_score,
                    "emitting progress"
                );

                if progress.play_state.is_terminal() {
                    if let Err(e) = self.submitter.submit_finish_score(&progress).await {
                        tracing::error!(session_id = %self.session_id, error = %e, "failed to submit final progress");
                    }
                    tracing::info!(
                        session_id = %self.session_id,
                        state = ?progress.play_state,
                        "play session ended"
                    );
                    return Ok(());
                }

                if let Err(e) = self.submitter.submit_score(&progress).await {
                    tracing::error!(session_id = %self.session_id, error = %e, "failed to submit progress");
                }
            }

            let wait = self.poll_interval.saturating_sub(tick_started.elapsed());
            tokio::select! {
                biased;
                _ = stopping.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn on_starting(&self) {
        tracing::info!(session_id = %self.session_id, "service starting");
    }

    async fn on_completed(&self) {
        tracing::info!(session_id = %self.session_id, "service completed");
    }

    async fn on_cancelled(&self) {
        tracing::info!(session_id = %self.session_id, "service cancelled");
    }

    async fn on_failed(&self, error: &Error) {
        tracing::error!(session_id = %self.session_id, error = %error, "service failed");
    }

    async fn on_stopped(&self) {
        tracing::info!(session_id = %self.session_id, "service stopped");
    }
}
