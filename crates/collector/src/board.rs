use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use scorestream_core::model::PlayerGameProgress;
use scorestream_core::now_ms;

/// What the collector knows about one player.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerRecord {
    /// Most recent progress received.
    pub latest: PlayerGameProgress,
    /// Updates received for this player, all streams combined.
    pub updates: u64,
    /// The latest update was terminal.
    pub finished: bool,
    /// Collector time of the latest update, unix ms.
    pub last_seen_ms: i64,
}

/// Latest progress per player.
#[derive(Debug, Default)]
pub struct ProgressBoard {
    players: RwLock<HashMap<String, PlayerRecord>>,
}

impl ProgressBoard {
    /// Empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `progress` as the player's latest and returns their update count.
    pub fn record(&self, progress: PlayerGameProgress) -> u64 {
        let finished = progress.play_state.is_terminal();
        let mut players = self.players.write();
        let entry = players
            .entry(progress.player_id.clone())
            .or_insert_with(|| PlayerRecord {
                latest: progress.clone(),
                updates: 0,
                finished,
                last_seen_ms: 0,
            });
        entry.latest = progress;
        entry.updates += 1;
        entry.finished = finished;
        entry.last_seen_ms = now_ms();
        entry.updates
    }

    /// Snapshot of one player's record.
    pub fn get(&self, player_id: &str) -> Option<PlayerRecord> {
        self.players.read().get(player_id).cloned()
    }

    /// Player ids seen so far, sorted.
    pub fn players(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.players.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
