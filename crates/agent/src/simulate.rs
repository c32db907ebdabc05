//! Scripted stand-in for the game: a pausable song clock and a driver that
//! feeds note results into the monitors.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use scorestream_core::aggregator::ProgressSources;
use scorestream_core::host::{HostSource, LevelEnd, LevelInfo};
use scorestream_core::model::GameplayModifiers;
use scorestream_core::monitor::{ComboMonitor, EnergyMonitor, PauseMonitor, ScoreMonitor};
use scorestream_core::Clock;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const NOTE_SCORE: i32 = 115;
const MAX_MULTIPLIER: i32 = 8;
const TICK: Duration = Duration::from_millis(100);
const BATTERY_LIVES: i32 = 4;

struct Playhead {
    started: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

/// Host whose song advances in tokio time and stops while paused.
pub struct SimulatedHost {
    level: LevelInfo,
    length: Duration,
    playhead: Mutex<Playhead>,
    end: Mutex<Option<LevelEnd>>,
}

impl SimulatedHost {
    /// Starts playing immediately.
    pub fn new(level: LevelInfo, length: Duration) -> Self {
        Self {
            level,
            length,
            playhead: Mutex::new(Playhead {
                started: Instant::now(),
                paused_at: None,
                paused_total: Duration::ZERO,
            }),
            end: Mutex::new(None),
        }
    }

    pub fn pause(&self) {
        let mut playhead = self.playhead.lock();
        if playhead.paused_at.is_none() {
            playhead.paused_at = Some(Instant::now());
        }
    }

    pub fn resume(&self) {
        let mut playhead = self.playhead.lock();
        if let Some(at) = playhead.paused_at.take() {
            playhead.paused_total += at.elapsed();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.playhead.lock().paused_at.is_some()
    }

    /// Marks the level as ended before the song did.
    pub fn end_level(&self, end: LevelEnd) {
        *self.end.lock() = Some(end);
    }
}

impl HostSource for SimulatedHost {
    fn song_time(&self) -> Duration {
        let playhead = self.playhead.lock();
        let now = playhead.paused_at.unwrap_or_else(Instant::now);
        now.saturating_duration_since(playhead.started)
            .saturating_sub(playhead.paused_total)
            .min(self.length)
    }

    fn song_length(&self) -> Duration {
        self.length
    }

    fn level(&self) -> LevelInfo {
        self.level.clone()
    }

    fn level_end(&self) -> Option<LevelEnd> {
        *self.end.lock()
    }
}

/// The four snapshot producers of one play.
#[derive(Clone)]
pub struct Monitors {
    pub score: Arc<ScoreMonitor>,
    pub combo: Arc<ComboMonitor>,
    pub energy: Arc<EnergyMonitor>,
    pub pause: Arc<PauseMonitor>,
}

impl Monitors {
    pub fn new(clock: Arc<dyn Clock>, level: &LevelInfo) -> Self {
        Self {
            score: Arc::new(ScoreMonitor::new(Arc::clone(&clock))),
            combo: Arc::new(ComboMonitor::new(Arc::clone(&clock))),
            energy: Arc::new(EnergyMonitor::new(
                Arc::clone(&clock),
                level.modifiers.energy_type,
                BATTERY_LIVES,
            )),
            pause: Arc::new(PauseMonitor::new(clock)),
        }
    }

    pub fn sources(&self, host: Arc<dyn HostSource>) -> ProgressSources {
        ProgressSources {
            score: self.score.clone(),
            combo: self.combo.clone(),
            energy: self.energy.clone(),
            pause: self.pause.clone(),
            host,
        }
    }
}

/// What the simulated player does.
#[derive(Debug, Clone)]
pub struct PlayScript {
    pub notes_per_second: u32,
    /// Every n-th note is missed. Zero never misses.
    pub miss_every: u32,
    /// Song time at which the pause menu opens, and how long it stays open.
    pub pause: Option<(Duration, Duration)>,
}

impl Default for PlayScript {
    fn default() -> Self {
        Self {
            notes_per_second: 4,
            miss_every: 17,
            pause: None,
        }
    }
}

#[derive(Debug, Default)]
struct Play {
    notes: u32,
    score: i32,
    max_score: i32,
    combo: i32,
    multiplier: i32,
    multiplier_hits: i32,
    max_multiplier: i32,
    max_multiplier_hits: i32,
    energy: f32,
}

impl Play {
    fn new() -> Self {
        Self {
            multiplier: 1,
            max_multiplier: 1,
            energy: 0.5,
            ..Default::default()
        }
    }

    // Multiplier doubles after 2 * multiplier consecutive hits.
    fn step(multiplier: &mut i32, hits: &mut i32) {
        if *multiplier >= MAX_MULTIPLIER {
            return;
        }
        *hits += 1;
        if *hits >= *multiplier * 2 {
            *multiplier *= 2;
            *hits = 0;
        }
    }

    fn progress(multiplier: i32, hits: i32) -> f32 {
        if multiplier >= MAX_MULTIPLIER {
            1.0
        } else {
            hits as f32 / (multiplier * 2) as f32
        }
    }

    fn note(&mut self, missed: bool) {
        self.notes += 1;
        self.max_score += NOTE_SCORE * self.max_multiplier;
        Self::step(&mut self.max_multiplier, &mut self.max_multiplier_hits);
        if missed {
            self.combo = 0;
            self.multiplier = (self.multiplier / 2).max(1);
            self.multiplier_hits = 0;
            self.energy = (self.energy - 0.15).max(0.0);
        } else {
            self.score += NOTE_SCORE * self.multiplier;
            self.combo += 1;
            Self::step(&mut self.multiplier, &mut self.multiplier_hits);
            self.energy = (self.energy + 0.01).min(1.0);
        }
    }
}

/// Plays `script` against `host` until the song ends, the level fails, or
/// `cancel` fires.
pub async fn play(
    script: PlayScript,
    host: Arc<SimulatedHost>,
    monitors: Monitors,
    cancel: CancellationToken,
) {
    let no_fail = host.level.modifiers.flags().contains(GameplayModifiers::NO_FAIL);
    let mut state = Play::new();
    monitors.energy.energy_did_init(state.energy);
    monitors.score.multiplier_did_change(1, 0.0);

    let mut pause_started: Option<Instant> = None;
    let mut paused_once = false;
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if let Some((at, hold)) = script.pause {
            match pause_started {
                None if !paused_once && host.song_time() >= at => {
                    host.pause();
                    monitors.pause.did_pause();
                    pause_started = Some(Instant::now());
                    paused_once = true;
                }
                Some(started) if started.elapsed() >= hold => {
                    host.resume();
                    monitors.pause.did_resume();
                    pause_started = None;
                }
                _ => {}
            }
        }
        if host.is_paused() {
            continue;
        }

        let song_time = host.song_time();
        let due = (song_time.as_secs_f64() * f64::from(script.notes_per_second)) as u32;
        if due > state.notes {
            while state.notes < due {
                let missed = script.miss_every > 0 && (state.notes + 1) % script.miss_every == 0;
                state.note(missed);
            }
            monitors.score.score_did_change(
                state.score,
                state.score,
                state.max_score,
                state.max_score,
            );
            monitors.score.multiplier_did_change(
                state.multiplier,
                Play::progress(state.multiplier, state.multiplier_hits),
            );
            monitors.combo.combo_did_change(state.combo);
            monitors.energy.energy_did_change(state.energy);

            if state.energy <= 0.0 {
                monitors.energy.energy_did_reach_zero();
                if !no_fail {
                    tracing::info!(notes = state.notes, "energy ran out; level failed");
                    host.end_level(LevelEnd::Failed);
                    return;
                }
            }
        }

        if song_time >= host.song_length() {
            tracing::debug!(notes = state.notes, score = state.score, "song finished");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn song_clock_stops_while_paused() {
        let host = SimulatedHost::new(LevelInfo::default(), Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(2)).await;
        host.pause();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(host.song_time(), Duration::from_secs(2));
        host.resume();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(host.song_time(), Duration::from_secs(3));
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(host.song_time(), Duration::from_secs(10));
    }

    #[test]
    fn multiplier_climbs_and_halves_on_miss() {
        let mut play = Play::new();
        for _ in 0..2 {
            play.note(false);
        }
        assert_eq!(play.multiplier, 2);
        for _ in 0..4 {
            play.note(false);
        }
        assert_eq!(play.multiplier, 4);
        play.note(true);
        assert_eq!(play.multiplier, 2);
        assert_eq!(play.combo, 0);
        // 115 * (1 + 1 + 2 * 4)
        assert_eq!(play.score, 1_150);
        assert!(play.max_score > play.score);
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_play_feeds_monitors() {
        use scorestream_core::monitor::SnapshotSource;
        use scorestream_core::ManualClock;

        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));
        let level = LevelInfo::default();
        let monitors = Monitors::new(clock, &level);
        let host = Arc::new(SimulatedHost::new(level, Duration::from_secs(2)));
        let script = PlayScript {
            notes_per_second: 5,
            miss_every: 0,
            pause: Some((Duration::from_millis(500), Duration::from_secs(1))),
        };

        play(script, Arc::clone(&host), monitors.clone(), CancellationToken::new()).await;

        assert_eq!(host.song_time(), Duration::from_secs(2));
        assert_eq!(monitors.combo.latest().combo, 10);
        assert!(monitors.score.latest().score > 0);
        let pause = monitors.pause.latest();
        assert_eq!(pause.pause_count, 1);
        assert!(!pause.is_paused);
        assert!(host.level_end().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn running_out_of_energy_fails_the_level() {
        use scorestream_core::ManualClock;

        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));
        let level = LevelInfo::default();
        let monitors = Monitors::new(clock, &level);
        let host = Arc::new(SimulatedHost::new(level, Duration::from_secs(30)));
        let script = PlayScript {
            notes_per_second: 4,
            miss_every: 1,
            pause: None,
        };

        play(script, Arc::clone(&host), monitors, CancellationToken::new()).await;
        assert_eq!(host.level_end(), Some(LevelEnd::Failed));
        assert!(host.song_time() < Duration::from_secs(30));
    }
}
