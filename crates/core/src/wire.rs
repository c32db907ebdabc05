//! Mapping between progress records and their protobuf form.
//!
//! Wire timestamps are unix milliseconds with 0 meaning "unset", song times are
//! seconds, pause durations milliseconds, and modifiers a repeated enum holding
//! one entry per active flag.

use scorestream_proto as pb;

use crate::error::Error;
use crate::model::{
    Characteristic, Difficulty, GameMode, GamePlayOptions, GamePlayStatistics, GameProgress,
    GameplayModifiers, PauseStatistics, PlayState, PlayerGameProgress, ScoreProgress,
    ScoreProgressDetails, SongProgress,
};

impl From<PlayState> for pb::PlayState {
    fn from(state: PlayState) -> Self {
        match state {
            PlayState::None => pb::PlayState::Unspecified,
            PlayState::Playing => pb::PlayState::Playing,
            PlayState::Paused => pb::PlayState::Paused,
            PlayState::Finished => pb::PlayState::Finished,
            PlayState::Failed => pb::PlayState::Failed,
            PlayState::Quit => pb::PlayState::Quit,
            PlayState::SoftFailed => pb::PlayState::SoftFailed,
        }
    }
}

impl From<pb::PlayState> for PlayState {
    fn from(state: pb::PlayState) -> Self {
        match state {
            pb::PlayState::Unspecified => PlayState::None,
            pb::PlayState::Playing => PlayState::Playing,
            pb::PlayState::Paused => PlayState::Paused,
            pb::PlayState::Finished => PlayState::Finished,
            pb::PlayState::Failed => PlayState::Failed,
            pb::PlayState::Quit => PlayState::Quit,
            pb::PlayState::SoftFailed => PlayState::SoftFailed,
        }
    }
}

impl From<GameMode> for pb::GameMode {
    fn from(mode: GameMode) -> Self {
        match mode {
            GameMode::None => pb::GameMode::Unspecified,
            GameMode::Solo => pb::GameMode::Solo,
            GameMode::Party => pb::GameMode::Party,
            GameMode::Campaign => pb::GameMode::Campaign,
            GameMode::Multiplayer => pb::GameMode::Multiplayer,
            GameMode::Practice => pb::GameMode::Practice,
        }
    }
}

impl From<pb::GameMode> for GameMode {
    fn from(mode: pb::GameMode) -> Self {
        match mode {
            pb::GameMode::Unspecified => GameMode::None,
            pb::GameMode::Solo => GameMode::Solo,
            pb::GameMode::Party => GameMode::Party,
            pb::GameMode::Campaign => GameMode::Campaign,
            pb::GameMode::Multiplayer => GameMode::Multiplayer,
            pb::GameMode::Practice => GameMode::Practice,
        }
    }
}

fn modifiers_to_wire(flags: GameplayModifiers) -> Vec<i32> {
    flags.iter().map(|flag| flag.bits() as i32).collect()
}

// Each entry must name exactly one modifier.
fn modifiers_from_wire(values: &[i32]) -> Result<GameplayModifiers, Error> {
    values.iter().try_fold(GameplayModifiers::empty(), |acc, &value| {
        match pb::GamePlayModifier::try_from(value) {
            Ok(pb::GamePlayModifier::Unspecified) | Err(_) => {
                Err(Error::InvalidWire(format!("unknown modifier {value}")))
            }
            Ok(modifier) => Ok(acc | GameplayModifiers::from_bits_retain(modifier as u32)),
        }
    })
}

fn ms_to_secs(ms: i64) -> f64 {
    ms as f64 / 1000.0
}

fn secs_to_ms(secs: f64) -> i64 {
    (secs * 1000.0).round() as i64
}

fn opt_ms(ms: i64) -> Option<i64> {
    (ms != 0).then_some(ms)
}

impl From<&PlayerGameProgress> for pb::PlayerGameProgress {
    fn from(p: &PlayerGameProgress) -> Self {
        let score = &p.game_progress.score;
        let details = &score.details;
        let pause = &p.statistics.pause;
        pb::PlayerGameProgress {
            player_id: p.player_id.clone(),
            client_timestamp: p.client_timestamp_ms,
            song_timestamp: ms_to_secs(p.song_timestamp_ms),
            play_state: pb::PlayState::from(p.play_state) as i32,
            game_mode: pb::GameMode::from(p.game_mode) as i32,
            statistics: Some(pb::GamePlayStatistics {
                options: Some(pb::GamePlayOptions {
                    modifiers: modifiers_to_wire(p.statistics.options.modifiers),
                }),
                pause: Some(pb::PauseStatistics {
                    is_currently_paused: pause.is_currently_paused,
                    current_pause_started_at: pause.current_pause_started_at_ms.unwrap_or(0),
                    current_pause_duration: pause.current_pause_duration_ms,
                    total_pause_duration: pause.total_pause_duration_ms,
                    total_pause_count: pause.total_pause_count as i32,
                }),
            }),
            game_progress: Some(pb::GameProgress {
                song_hash: p.game_progress.song_hash.clone(),
                beatmap_level_id: p.game_progress.beatmap_level_id.clone(),
                characteristic: Some(pb::Characteristic {
                    serialized_name: p.game_progress.characteristic.serialized_name.clone(),
                    name: p.game_progress.characteristic.name.clone(),
                }),
                difficulty: Some(pb::Difficulty {
                    name: p.game_progress.difficulty.name.clone(),
                    rank: p.game_progress.difficulty.rank,
                }),
                started_at: p.game_progress.started_at_ms.unwrap_or(0),
                ended_at: p.game_progress.ended_at_ms.unwrap_or(0),
                score_progress: Some(pb::ScoreProgress {
                    current_score: score.current_score,
                    current_max_score: score.current_max_score,
                    current_score_modified: score.current_score_modified,
                    current_max_score_modified: score.current_max_score_modified,
                    details: Some(pb::ScoreProgressDetails {
                        notes_total: details.notes_total,
                        notes_hit: details.notes_hit,
                        notes_missed: details.notes_missed,
                        notes_badcut: details.notes_badcut,
                        bombs_total: details.bombs_total,
                        bombs_hit: details.bombs_hit,
                        bombs_passed: details.bombs_passed,
                        obstacles_total: details.obstacles_total,
                        obstacles_hit: details.obstacles_hit,
                        obstacles_passed: details.obstacles_passed,
                        obstacles_hit_count: details.obstacles_hit_count,
                        obstacles_hit_duration: details.obstacles_hit_duration_ms,
                        max_combo: details.max_combo,
                        combo: details.combo,
                        multiplier: details.multiplier,
                        multiplier_progress: details.multiplier_progress,
                        energy: details.energy,
                    }),
                }),
            }),
            song_progress: Some(pb::SongProgress {
                duration: ms_to_secs(p.song_progress.duration_ms),
                position: ms_to_secs(p.song_progress.position_ms),
            }),
        }
    }
}

impl TryFrom<pb::PlayerGameProgress> for PlayerGameProgress {
    type Error = Error;

    fn try_from(msg: pb::PlayerGameProgress) -> Result<Self, Self::Error> {
        if msg.player_id.trim().is_empty() {
            return Err(Error::InvalidWire("player_id is empty".into()));
        }
        let play_state = pb::PlayState::try_from(msg.play_state)
            .map_err(|_| Error::InvalidWire(format!("unknown play state {}", msg.play_state)))?;
        let game_mode = pb::GameMode::try_from(msg.game_mode)
            .map_err(|_| Error::InvalidWire(format!("unknown game mode {}", msg.game_mode)))?;

        let statistics = msg.statistics.unwrap_or_default();
        let modifiers = modifiers_from_wire(&statistics.options.unwrap_or_default().modifiers)?;
        let pause = statistics.pause.unwrap_or_default();
        let game = msg.game_progress.unwrap_or_default();
        let characteristic = game.characteristic.unwrap_or_default();
        let difficulty = game.difficulty.unwrap_or_default();
        let score = game.score_progress.unwrap_or_default();
        let details = score.details.unwrap_or_default();
        let song = msg.song_progress.unwrap_or_default();

        Ok(PlayerGameProgress {
            player_id: msg.player_id,
            client_timestamp_ms: msg.client_timestamp,
            song_timestamp_ms: secs_to_ms(msg.song_timestamp),
            play_state: play_state.into(),
            game_mode: game_mode.into(),
            statistics: GamePlayStatistics {
                options: GamePlayOptions { modifiers },
                pause: PauseStatistics {
                    is_currently_paused: pause.is_currently_paused,
                    current_pause_started_at_ms: opt_ms(pause.current_pause_started_at),
                    current_pause_duration_ms: pause.current_pause_duration,
                    total_pause_duration_ms: pause.total_pause_duration,
                    total_pause_count: pause.total_pause_count.max(0) as u32,
                },
            },
            game_progress: GameProgress {
                song_hash: game.song_hash,
                beatmap_level_id: game.beatmap_level_id,
                characteristic: Characteristic {
                    serialized_name: characteristic.serialized_name,
                    name: characteristic.name,
                },
                difficulty: Difficulty {
                    name: difficulty.name,
                    rank: difficulty.rank,
                },
                started_at_ms: opt_ms(game.started_at),
                ended_at_ms: opt_ms(game.ended_at),
                score: ScoreProgress {
                    current_score: score.current_score,
                    current_max_score: score.current_max_score,
                    current_score_modified: score.current_score_modified,
                    current_max_score_modified: score.current_max_score_modified,
                    details: ScoreProgressDetails {
                        notes_total: details.notes_total,
                        notes_hit: details.notes_hit,
                        notes_missed: details.notes_missed,
                        notes_badcut: details.notes_badcut,
                        bombs_total: details.bombs_total,
                        bombs_hit: details.bombs_hit,
                        bombs_passed: details.bombs_passed,
                        obstacles_total: details.obstacles_total,
                        obstacles_hit: details.obstacles_hit,
                        obstacles_passed: details.obstacles_passed,
                        obstacles_hit_count: details.obstacles_hit_count,
                        obstacles_hit_duration_ms: details.obstacles_hit_duration,
                        max_combo: details.max_combo,
                        combo: details.combo,
                        multiplier: details.multiplier,
                        multiplier_progress: details.multiplier_progress,
                        energy: details.energy,
                    },
                },
            },
            song_progress: SongProgress {
                duration_ms: secs_to_ms(song.duration),
                position_ms: secs_to_ms(song.position),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_travel_as_one_entry_per_flag() {
        let flags = GameplayModifiers::NO_FAIL | GameplayModifiers::FASTER_SONG;
        let wire = modifiers_to_wire(flags);
        assert_eq!(
            wire,
            vec![
                pb::GamePlayModifier::NoFail as i32,
                pb::GamePlayModifier::FasterSong as i32
            ]
        );
        assert_eq!(modifiers_from_wire(&wire).unwrap(), flags);
        assert!(modifiers_from_wire(&[3]).is_err());
        assert!(modifiers_from_wire(&[0]).is_err());
        assert!(modifiers_from_wire(&[-1]).is_err());
        assert!(modifiers_from_wire(&[1 << 20]).is_err());
    }

    #[test]
    fn song_times_are_seconds_on_the_wire() {
        let progress = PlayerGameProgress {
            player_id: "p".into(),
            song_timestamp_ms: 12_345,
            song_progress: SongProgress {
                duration_ms: 90_000,
                position_ms: 12_345,
            },
            ..Default::default()
        };
        let msg = pb::PlayerGameProgress::from(&progress);
        assert_eq!(msg.song_timestamp, 12.345);
        assert_eq!(msg.song_progress.as_ref().map(|s| s.duration), Some(90.0));
    }

    #[test]
    fn unset_times_encode_as_zero() {
        let mut progress = PlayerGameProgress {
            player_id: "p".into(),
            play_state: PlayState::Finished,
            ..Default::default()
        };
        progress.game_progress.ended_at_ms = Some(1_700_000_000_000);

        let msg = pb::PlayerGameProgress::from(&progress);
        let game = msg.game_progress.clone().unwrap();
        assert_eq!(game.started_at, 0);
        assert_eq!(game.ended_at, 1_700_000_000_000);
        assert_eq!(msg.play_state, pb::PlayState::Finished as i32);

        let back = PlayerGameProgress::try_from(msg).unwrap();
        assert_eq!(back, progress);
    }

    #[test]
    fn malformed_messages_are_rejected() {
        let empty_player = pb::PlayerGameProgress::default();
        assert!(PlayerGameProgress::try_from(empty_player).is_err());

        let bad_state = pb::PlayerGameProgress {
            player_id: "p".into(),
            play_state: 3,
            ..Default::default()
        };
        assert!(PlayerGameProgress::try_from(bad_state).is_err());
    }
}
