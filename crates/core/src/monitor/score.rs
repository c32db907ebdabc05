use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::{Snapshot, SnapshotCell, SnapshotSource};
use crate::util::Clock;

/// Score figures at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    /// Capture time, unix ms.
    pub timestamp_ms: i64,
    /// Raw multiplied score.
    pub score: i32,
    /// Best possible raw score so far.
    pub max_score: i32,
    /// Score after modifier multipliers.
    pub modified_score: i32,
    /// Best possible modified score so far.
    pub max_modified_score: i32,
    /// Combo multiplier.
    pub multiplier: i32,
    /// Progress toward the next multiplier step.
    pub multiplier_progress: f32,
}

impl Default for ScoreSnapshot {
    fn default() -> Self {
        Self {
            timestamp_ms: 0,
            score: 0,
            max_score: 0,
            modified_score: 0,
            max_modified_score: 0,
            multiplier: 1,
            multiplier_progress: 0.0,
        }
    }
}

impl Snapshot for ScoreSnapshot {
    fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    fn same_state(&self, other: &Self) -> bool {
        Self {
            timestamp_ms: other.timestamp_ms,
            ..self.clone()
        } == *other
    }
}

/// Tracks score and multiplier.
pub struct ScoreMonitor {
    clock: Arc<dyn Clock>,
    cell: SnapshotCell<ScoreSnapshot>,
}

impl ScoreMonitor {
    /// Creates a monitor at zero score and multiplier 1.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let initial = ScoreSnapshot {
            timestamp_ms: clock.now_ms(),
            ..Default::default()
        };
        Self {
            clock,
            cell: SnapshotCell::new(initial),
        }
    }

    /// Host callback: raw and modified score plus their current maxima.
    pub fn score_did_change(
        &self,
        score: i32,
        modified_score: i32,
        max_score: i32,
        max_modified_score: i32,
    ) {
        let now = self.clock.now_ms();
        if self.cell.update(|prev| ScoreSnapshot {
            timestamp_ms: now,
            score,
            modified_score,
            max_score,
            max_modified_score,
            ..prev.clone()
        }) {
            tracing::trace!(score, modified_score, "score changed");
        }
    }

    /// Host callback: combo multiplier and progress toward the next step.
    pub fn multiplier_did_change(&self, multiplier: i32, progress: f32) {
        let now = self.clock.now_ms();
        self.cell.update(|prev| ScoreSnapshot {
            timestamp_ms: now,
            multiplier,
            multiplier_progress: progress,
            ..prev.clone()
        });
    }
}

impl SnapshotSource<ScoreSnapshot> for ScoreMonitor {
    fn latest(&self) -> Arc<ScoreSnapshot> {
        self.cell.latest()
    }

    fn subscribe(&self) -> watch::Receiver<Arc<ScoreSnapshot>> {
        self.cell.subscribe()
    }
}
