//! Read-only view of the running level, supplied by the host game.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{Characteristic, Difficulty, GameMode, GameplayModifiers};

const CUSTOM_LEVEL_PREFIX: &str = "custom_level_";
const SONG_HASH_LEN: usize = 40;

/// Song speed option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SongSpeed {
    /// 1.0x.
    #[default]
    Normal,
    /// 0.85x.
    Slower,
    /// 1.2x.
    Faster,
    /// 1.5x.
    SuperFast,
}

/// Energy bar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyType {
    /// Continuous bar between 0 and 1.
    #[default]
    Bar,
    /// Four lives.
    Battery,
}

/// Modifier toggles as the host exposes them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierSettings {
    /// Keep playing at zero energy.
    pub no_fail_on_0_energy: bool,
    /// Fail on the first miss.
    pub insta_fail: bool,
    /// Bar or battery energy.
    pub energy_type: EnergyType,
    /// Bombs removed.
    pub no_bombs: bool,
    /// Walls removed.
    pub no_obstacles: bool,
    /// Any cut direction counts.
    pub no_arrows: bool,
    /// Notes turn invisible on approach.
    pub ghost_notes: bool,
    /// Arrows vanish on approach.
    pub disappearing_arrows: bool,
    /// Smaller notes.
    pub small_cubes: bool,
    /// Stricter hitboxes.
    pub pro_mode: bool,
    /// Tighter cut angle tolerance.
    pub strict_angles: bool,
    /// No fail and no scoring.
    pub zen_mode: bool,
    /// Playback speed.
    pub song_speed: SongSpeed,
}

impl ModifierSettings {
    /// Collapses the toggles into flag form.
    pub fn flags(&self) -> GameplayModifiers {
        let mut flags = GameplayModifiers::empty();
        flags.set(GameplayModifiers::NO_FAIL, self.no_fail_on_0_energy);
        flags.set(GameplayModifiers::INSTA_FAIL, self.insta_fail);
        flags.set(
            GameplayModifiers::BATTERY_ENERGY,
            self.energy_type == EnergyType::Battery,
        );
        flags.set(GameplayModifiers::NO_BOMBS, self.no_bombs);
        flags.set(GameplayModifiers::NO_OBSTACLES, self.no_obstacles);
        flags.set(GameplayModifiers::NO_ARROWS, self.no_arrows);
        flags.set(GameplayModifiers::GHOST_NOTES, self.ghost_notes);
        flags.set(GameplayModifiers::DISAPPEARING_ARROWS, self.disappearing_arrows);
        flags.set(GameplayModifiers::SMALL_CUBES, self.small_cubes);
        flags.set(GameplayModifiers::PRO_MODE, self.pro_mode);
        flags.set(GameplayModifiers::STRICT_ANGLES, self.strict_angles);
        flags.set(GameplayModifiers::ZEN_MODE, self.zen_mode);
        match self.song_speed {
            SongSpeed::Normal => {}
            SongSpeed::Slower => flags |= GameplayModifiers::SLOWER_SONG,
            SongSpeed::Faster => flags |= GameplayModifiers::FASTER_SONG,
            SongSpeed::SuperFast => flags |= GameplayModifiers::SUPER_FAST_SONG,
        }
        flags
    }

    /// Net playback speed multiplier.
    pub fn song_speed_mul(&self) -> f64 {
        match self.song_speed {
            SongSpeed::Normal => 1.0,
            SongSpeed::Slower => 0.85,
            SongSpeed::Faster => 1.2,
            SongSpeed::SuperFast => 1.5,
        }
    }
}

/// Object counts of the loaded beatmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BeatmapCounts {
    /// Note count.
    pub notes: i32,
    /// Bomb count.
    pub bombs: i32,
    /// Wall count.
    pub obstacles: i32,
}

/// Static description of the level being played.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelInfo {
    /// Host level id, `custom_level_<hash>` for custom songs.
    pub level_id: String,
    /// Song title.
    pub song_name: String,
    /// Song artist.
    pub song_author: String,
    /// Mapper.
    pub level_author: String,
    /// Beatmap characteristic.
    pub characteristic: Characteristic,
    /// Beatmap difficulty.
    pub difficulty: Difficulty,
    /// Object counts.
    pub beatmap: BeatmapCounts,
    /// Modifier toggles.
    pub modifiers: ModifierSettings,
    /// Launched from the practice menu.
    pub practice: bool,
}

impl LevelInfo {
    /// Practice when launched with practice settings, solo otherwise.
    pub fn game_mode(&self) -> GameMode {
        if self.practice {
            GameMode::Practice
        } else {
            GameMode::Solo
        }
    }

    /// See [`song_hash`].
    pub fn song_hash(&self) -> String {
        song_hash(&self.level_id).unwrap_or_default().to_owned()
    }
}

/// How a level ended before the song did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelEnd {
    /// Energy ran out without no-fail.
    Failed,
    /// Player left through the pause menu.
    Quit,
}

/// Host timing and level data, read synchronously on every tick.
pub trait HostSource: Send + Sync {
    /// Current song playhead.
    fn song_time(&self) -> Duration;

    /// Full song length.
    fn song_length(&self) -> Duration;

    /// Level being played.
    fn level(&self) -> LevelInfo;

    /// Set once the level ended early.
    fn level_end(&self) -> Option<LevelEnd> {
        None
    }
}

/// Extracts the custom level hash from a level id.
///
/// Only `custom_level_` ids followed by 40 hex digits qualify; work-in-progress
/// levels (` WIP` suffix) have no stable hash.
pub fn song_hash(level_id: &str) -> Option<&str> {
    if level_id.ends_with(" WIP") {
        return None;
    }
    let start = CUSTOM_LEVEL_PREFIX.len();
    let prefix = level_id.get(..start)?;
    if !prefix.eq_ignore_ascii_case(CUSTOM_LEVEL_PREFIX) {
        return None;
    }
    let hash = level_id.get(start..start + SONG_HASH_LEN)?;
    hash.bytes()
        .all(|b| b.is_ascii_hexdigit())
        .then_some(hash)
}
