//! Snapshot producers.
//!
//! Each monitor turns host callbacks into immutable, timestamped snapshots.
//! The latest snapshot is always readable without blocking the host; a new
//! value is published only when something other than the timestamp changed.

use std::sync::Arc;

use tokio::sync::watch;

mod combo;
mod energy;
mod pause;
mod score;

pub use combo::{ComboMonitor, ComboSnapshot};
pub use energy::{EnergyEvent, EnergyMonitor, EnergySnapshot};
pub use pause::{PauseEvent, PauseMonitor, PauseSession, PauseSessionState, PauseStateSnapshot};
pub use score::{ScoreMonitor, ScoreSnapshot};

/// Immutable state captured by a monitor.
pub trait Snapshot: Clone + Send + Sync + 'static {
    /// When the snapshot was taken, unix ms.
    fn timestamp_ms(&self) -> i64;

    /// Equality ignoring the timestamp.
    fn same_state(&self, other: &Self) -> bool;
}

/// Pull side of a producer.
pub trait SnapshotSource<T>: Send + Sync {
    /// Most recently published snapshot. Always valid.
    fn latest(&self) -> Arc<T>;

    /// Receiver notified on every published change.
    fn subscribe(&self) -> watch::Receiver<Arc<T>>;
}

/// Latest-value cell with change notification.
#[derive(Debug)]
pub struct SnapshotCell<T> {
    tx: watch::Sender<Arc<T>>,
}

impl<T: Snapshot> SnapshotCell<T> {
    /// Creates a cell holding `initial`.
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx }
    }

    /// Most recently published snapshot.
    pub fn latest(&self) -> Arc<T> {
        Arc::clone(&self.tx.borrow())
    }

    /// Receiver notified on every published change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<T>> {
        self.tx.subscribe()
    }

    /// Derives the next snapshot from the current one and publishes it if it
    /// differs. Concurrent updates are serialized.
    pub fn update(&self, next: impl FnOnce(&T) -> T) -> bool {
        self.tx.send_if_modified(|current| {
            let next = next(current);
            if current.same_state(&next) {
                false
            } else {
                *current = Arc::new(next);
                true
            }
        })
    }

    /// Publishes `next` if it differs from the current snapshot.
    pub fn publish(&self, next: T) -> bool {
        self.update(|_| next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        at: i64,
        value: i32,
    }

    impl Snapshot for Counter {
        fn timestamp_ms(&self) -> i64 {
            self.at
        }

        fn same_state(&self, other: &Self) -> bool {
            self.value == other.value
        }
    }

    #[test]
    fn timestamp_only_changes_are_not_published() {
        let cell = SnapshotCell::new(Counter { at: 0, value: 1 });
        let mut rx = cell.subscribe();

        assert!(!cell.publish(Counter { at: 10, value: 1 }));
        assert_eq!(cell.latest().at, 0);
        assert!(!rx.has_changed().unwrap());

        assert!(cell.publish(Counter { at: 20, value: 2 }));
        assert_eq!(*cell.latest(), Counter { at: 20, value: 2 });
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn earlier_snapshots_stay_intact() {
        let cell = SnapshotCell::new(Counter { at: 0, value: 1 });
        let before = cell.latest();
        cell.update(|c| Counter {
            at: 5,
            value: c.value + 1,
        });
        assert_eq!(before.value, 1);
        assert_eq!(cell.latest().value, 2);
    }
}
