use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::{Snapshot, SnapshotCell, SnapshotSource};
use crate::util::Clock;

/// Combo figures at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComboSnapshot {
    /// Capture time, unix ms.
    pub timestamp_ms: i64,
    /// Current combo.
    pub combo: i32,
    /// Best combo this play.
    pub max_combo: i32,
}

impl Snapshot for ComboSnapshot {
    fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    fn same_state(&self, other: &Self) -> bool {
        self.combo == other.combo && self.max_combo == other.max_combo
    }
}

/// Tracks the running combo and its best value this play.
pub struct ComboMonitor {
    clock: Arc<dyn Clock>,
    cell: SnapshotCell<ComboSnapshot>,
}

impl ComboMonitor {
    /// Monitor starting at zero combo.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let initial = ComboSnapshot {
            timestamp_ms: clock.now_ms(),
            ..Default::default()
        };
        Self {
            clock,
            cell: SnapshotCell::new(initial),
        }
    }

    /// Host callback: new combo value. Zero means the combo broke.
    pub fn combo_did_change(&self, combo: i32) {
        let now = self.clock.now_ms();
        self.cell.update(|prev| ComboSnapshot {
            timestamp_ms: now,
            combo,
            max_combo: prev.max_combo.max(combo),
        });
    }
}

impl SnapshotSource<ComboSnapshot> for ComboMonitor {
    fn latest(&self) -> Arc<ComboSnapshot> {
        self.cell.latest()
    }

    fn subscribe(&self) -> watch::Receiver<Arc<ComboSnapshot>> {
        self.cell.subscribe()
    }
}
