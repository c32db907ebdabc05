use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Gameplay modifiers active for a play.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct GameplayModifiers: u32 {
        /// Energy reaching zero does not end the level.
        const NO_FAIL = 1 << 0;
        /// The first miss ends the level.
        const INSTA_FAIL = 1 << 1;
        /// Lives instead of an energy bar.
        const BATTERY_ENERGY = 1 << 2;
        /// Bombs removed.
        const NO_BOMBS = 1 << 3;
        /// Walls removed.
        const NO_OBSTACLES = 1 << 4;
        /// All notes are dot notes.
        const NO_ARROWS = 1 << 5;
        /// Notes vanish before arriving.
        const GHOST_NOTES = 1 << 6;
        /// Arrows vanish before arriving.
        const DISAPPEARING_ARROWS = 1 << 7;
        /// Smaller notes.
        const SMALL_CUBES = 1 << 8;
        /// Stricter hitboxes.
        const PRO_MODE = 1 << 9;
        /// Stricter cut angles.
        const STRICT_ANGLES = 1 << 10;
        /// No fail, no score.
        const ZEN_MODE = 1 << 11;
        /// Song speed 0.85x.
        const SLOWER_SONG = 1 << 12;
        /// Song speed 1.2x.
        const FASTER_SONG = 1 << 13;
        /// Song speed 1.5x.
        const SUPER_FAST_SONG = 1 << 14;
    }
}

/// Derived state of the current play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayState {
    /// Nothing observed yet.
    #[default]
    None,
    /// Song is running.
    Playing,
    /// Pause menu is open.
    Paused,
    /// Song position reached the song length.
    Finished,
    /// Level failed.
    Failed,
    /// Player left the level.
    Quit,
    /// Energy ran out under no-fail; the play continues.
    SoftFailed,
}

impl PlayState {
    /// Whether this state ends the play session.
    pub fn is_terminal(self) -> bool {
        matches!(self, PlayState::Finished | PlayState::Failed | PlayState::Quit)
    }
}

/// How the level was launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Not known yet.
    #[default]
    None,
    /// Solo play.
    Solo,
    /// Party mode.
    Party,
    /// Campaign level.
    Campaign,
    /// Online multiplayer.
    Multiplayer,
    /// Launched from the practice menu.
    Practice,
}

/// Beatmap characteristic (standard, one saber, 360 degree, ...).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Characteristic {
    /// Stable identifier, e.g. `Standard`.
    pub serialized_name: String,
    /// Display name.
    pub name: String,
}

/// Beatmap difficulty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Difficulty {
    /// Display name, e.g. `ExpertPlus`.
    pub name: String,
    /// Ordinal rank, easy = 1.
    pub rank: i32,
}

/// Counters and live multipliers for a play.
///
/// Totals come from the beatmap. Per-hit counters stay zero unless the host
/// tracks them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreProgressDetails {
    /// Notes in the beatmap.
    pub notes_total: i32,
    /// Notes cut correctly.
    pub notes_hit: i32,
    /// Notes missed.
    pub notes_missed: i32,
    /// Notes cut with the wrong saber or direction.
    pub notes_badcut: i32,
    /// Bombs in the beatmap.
    pub bombs_total: i32,
    /// Bombs hit.
    pub bombs_hit: i32,
    /// Bombs avoided.
    pub bombs_passed: i32,
    /// Walls in the beatmap.
    pub obstacles_total: i32,
    /// Walls entered.
    pub obstacles_hit: i32,
    /// Walls avoided.
    pub obstacles_passed: i32,
    /// Times the head entered a wall.
    pub obstacles_hit_count: i32,
    /// Time spent inside walls.
    pub obstacles_hit_duration_ms: i64,
    /// Best combo so far.
    pub max_combo: i32,
    /// Current combo.
    pub combo: i32,
    /// Score multiplier.
    pub multiplier: i32,
    /// Progress toward the next multiplier step, 0 to 1.
    pub multiplier_progress: f32,
    /// Energy bar, 0 to 1.
    pub energy: f32,
}

/// Score totals plus details.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreProgress {
    /// Raw multiplied score.
    pub current_score: i32,
    /// Best possible raw score so far.
    pub current_max_score: i32,
    /// Score after modifier multipliers.
    pub current_score_modified: i32,
    /// Best possible modified score so far.
    pub current_max_score_modified: i32,
    /// Hit and miss counters.
    pub details: ScoreProgressDetails,
}

/// What is being played and how far the score got.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GameProgress {
    /// 40-char custom level hash, empty for official or WIP levels.
    pub song_hash: String,
    /// Host level id.
    pub beatmap_level_id: String,
    /// Beatmap characteristic.
    pub characteristic: Characteristic,
    /// Beatmap difficulty.
    pub difficulty: Difficulty,
    /// Inferred wall-clock start of the song, unix ms.
    pub started_at_ms: Option<i64>,
    /// Stamped on the terminal update, unix ms.
    pub ended_at_ms: Option<i64>,
    /// Score figures.
    pub score: ScoreProgress,
}

/// Pause figures as of the progress timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PauseStatistics {
    /// A pause session is open.
    pub is_currently_paused: bool,
    /// Start of the open pause session.
    pub current_pause_started_at_ms: Option<i64>,
    /// Elapsed time of the open pause session.
    pub current_pause_duration_ms: i64,
    /// All pause time this play, the open session included.
    pub total_pause_duration_ms: i64,
    /// Pause sessions this play.
    pub total_pause_count: u32,
}

/// Options chosen before the play started.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GamePlayOptions {
    /// Active modifiers.
    pub modifiers: GameplayModifiers,
}

/// Options and pause statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GamePlayStatistics {
    /// Options chosen before the level.
    pub options: GamePlayOptions,
    /// Pause figures.
    pub pause: PauseStatistics,
}

/// Song length and playhead, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SongProgress {
    /// Song length.
    pub duration_ms: i64,
    /// Playhead.
    pub position_ms: i64,
}

/// One aggregated progress record, the unit sent to the collector.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerGameProgress {
    /// Configured player id or the session fallback id.
    pub player_id: String,
    /// When this record was built, unix ms.
    pub client_timestamp_ms: i64,
    /// Song playhead when this record was built.
    pub song_timestamp_ms: i64,
    /// Derived play state.
    pub play_state: PlayState,
    /// How the level was launched.
    pub game_mode: GameMode,
    /// Options and pause figures.
    pub statistics: GamePlayStatistics,
    /// Level and score.
    pub game_progress: GameProgress,
    /// Song timing.
    pub song_progress: SongProgress,
}

impl PlayerGameProgress {
    /// Copy with the fields that move on their own zeroed.
    ///
    /// Timestamps, the song playhead and pause durations advance every tick
    /// even when nothing happened, so they take no part in change detection.
    pub fn without_elapsed(&self) -> Self {
        let mut copy = self.clone();
        copy.client_timestamp_ms = 0;
        copy.song_timestamp_ms = 0;
        copy.song_progress.position_ms = 0;
        copy.statistics.pause.current_pause_duration_ms = 0;
        copy.statistics.pause.total_pause_duration_ms = 0;
        copy
    }

    /// Whether the two records differ only in elapsed-time fields.
    pub fn same_progress(&self, other: &Self) -> bool {
        self.without_elapsed() == other.without_elapsed()
    }
}
