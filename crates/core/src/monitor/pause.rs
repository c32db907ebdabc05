use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use super::{Snapshot, SnapshotCell, SnapshotSource};
use crate::model::PauseStatistics;
use crate::util::Clock;

const EVENT_CAPACITY: usize = 16;

/// Whether a pause session is still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseSessionState {
    /// Still open.
    Paused,
    /// Closed; duration is final.
    Ended,
}

/// One stretch of time spent in the pause menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseSession {
    /// Open or closed.
    pub state: PauseSessionState,
    /// Pause menu opened, unix ms.
    pub started_at_ms: i64,
    /// Final once ended; zero while open.
    pub duration_ms: i64,
}

/// Pause figures at one instant.
///
/// `current` is `Some` exactly while a session is open, and an open session is
/// always in the `Paused` state. Closed sessions move to `history` and their
/// duration into `total_pause_duration_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PauseStateSnapshot {
    /// Capture time, unix ms.
    pub timestamp_ms: i64,
    /// A pause session is open.
    pub is_paused: bool,
    /// Sessions opened this play.
    pub pause_count: u32,
    /// Duration of closed sessions.
    pub total_pause_duration_ms: i64,
    /// Open session, if any.
    pub current: Option<PauseSession>,
    /// Closed sessions, oldest first.
    pub history: Vec<PauseSession>,
}

impl PauseStateSnapshot {
    /// Pause statistics as of `now_ms`, counting the open session's elapsed
    /// time toward the current and total durations.
    pub fn statistics_at(&self, now_ms: i64) -> PauseStatistics {
        let (started_at, elapsed) = match &self.current {
            Some(session) => (
                Some(session.started_at_ms),
                (now_ms - session.started_at_ms).max(0),
            ),
            None => (None, 0),
        };
        PauseStatistics {
            is_currently_paused: self.is_paused,
            current_pause_started_at_ms: started_at,
            current_pause_duration_ms: elapsed,
            total_pause_duration_ms: self.total_pause_duration_ms + elapsed,
            total_pause_count: self.pause_count,
        }
    }

    fn open(&mut self, now_ms: i64) -> PauseSession {
        let session = PauseSession {
            state: PauseSessionState::Paused,
            started_at_ms: now_ms,
            duration_ms: 0,
        };
        self.current = Some(session.clone());
        self.is_paused = true;
        self.pause_count += 1;
        session
    }

    fn close(&mut self, now_ms: i64) -> Option<PauseSession> {
        let mut session = self.current.take()?;
        session.state = PauseSessionState::Ended;
        session.duration_ms = (now_ms - session.started_at_ms).max(0);
        self.total_pause_duration_ms += session.duration_ms;
        self.history.push(session.clone());
        self.is_paused = false;
        Some(session)
    }
}

impl Snapshot for PauseStateSnapshot {
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

/// Pause session transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseEvent {
    /// A session opened.
    SessionStarted(PauseSession),
    /// A session closed.
    SessionEnded(PauseSession),
}

/// Tracks pause sessions for one play.
pub struct PauseMonitor {
    clock: Arc<dyn Clock>,
    cell: SnapshotCell<PauseStateSnapshot>,
    events: broadcast::Sender<PauseEvent>,
}

impl PauseMonitor {
    /// Monitor with no pause recorded.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let initial = PauseStateSnapshot {
            timestamp_ms: clock.now_ms(),
            ..Default::default()
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            clock,
            cell: SnapshotCell::new(initial),
            events,
        }
    }

    /// Host callback: the pause menu opened.
    pub fn did_pause(&self) {
        let now = self.clock.now_ms();
        let mut fired = Vec::with_capacity(2);
        self.cell.update(|prev| {
            let mut next = PauseStateSnapshot {
                timestamp_ms: now,
                ..prev.clone()
            };
            if let Some(stale) = next.close(now) {
                tracing::warn!(
                    started_at_ms = stale.started_at_ms,
                    "pause while a pause session is open; closing it"
                );
                fired.push(PauseEvent::SessionEnded(stale));
            }
            fired.push(PauseEvent::SessionStarted(next.open(now)));
            next
        });
        self.emit(fired);
    }

    /// Host callback: play resumed.
    pub fn did_resume(&self) {
        let now = self.clock.now_ms();
        let mut fired = Vec::with_capacity(1);
        self.cell.update(|prev| {
            let mut next = PauseStateSnapshot {
                timestamp_ms: now,
                ..prev.clone()
            };
            if next.current.is_none() {
                tracing::warn!("resume without an open pause session; recording an empty one");
                next.open(now);
            }
            if let Some(ended) = next.close(now) {
                fired.push(PauseEvent::SessionEnded(ended));
            }
            next
        });
        self.emit(fired);
    }

    /// Host callback: player left the level from the pause menu.
    pub fn did_return_to_menu(&self) {
        let now = self.clock.now_ms();
        let mut fired = Vec::with_capacity(1);
        self.cell.update(|prev| {
            let mut next = PauseStateSnapshot {
                timestamp_ms: now,
                ..prev.clone()
            };
            match next.close(now) {
                Some(ended) => fired.push(PauseEvent::SessionEnded(ended)),
                None => tracing::warn!("return to menu without an open pause session"),
            }
            next
        });
        self.emit(fired);
    }

    /// Receiver for session start/end transitions.
    pub fn subscribe_events(&self) -> broadcast::Receiver<PauseEvent> {
        self.events.subscribe()
    }

    fn emit(&self, fired: Vec<PauseEvent>) {
        for event in fired {
            let _ = self.events.send(event);
        }
    }
}

impl SnapshotSource<PauseStateSnapshot> for PauseMonitor {
    fn latest(&self) -> Arc<PauseStateSnapshot> {
        self.cell.latest()
    }

    fn subscribe(&self) -> watch::Receiver<Arc<PauseStateSnapshot>> {
        self.cell.subscribe()
    }
}
