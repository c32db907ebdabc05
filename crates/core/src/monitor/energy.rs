use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use super::{Snapshot, SnapshotCell, SnapshotSource};
use crate::host::EnergyType;
use crate::util::Clock;

const EVENT_CAPACITY: usize = 16;

/// Energy figures at one instant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnergySnapshot {
    /// Capture time, unix ms.
    pub timestamp_ms: i64,
    /// Bar value between 0 and 1.
    pub energy: f32,
    /// Remaining lives, battery mode only.
    pub battery_energy: i32,
    /// Battery mode.
    pub is_battery_energy: bool,
}

impl Snapshot for EnergySnapshot {
    fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    fn same_state(&self, other: &Self) -> bool {
        self.energy == other.energy
            && self.battery_energy == other.battery_energy
            && self.is_battery_energy == other.is_battery_energy
    }
}

/// Discrete energy transitions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnergyEvent {
    /// Starting energy is known.
    Initialized(f32),
    /// Energy moved.
    Changed(f32),
    /// Energy hit zero.
    ReachedZero,
}

/// Tracks the energy bar or battery lives.
pub struct EnergyMonitor {
    clock: Arc<dyn Clock>,
    battery_lives: i32,
    cell: SnapshotCell<EnergySnapshot>,
    events: broadcast::Sender<EnergyEvent>,
}

impl EnergyMonitor {
    /// `battery_lives` is only used in battery mode.
    pub fn new(clock: Arc<dyn Clock>, energy_type: EnergyType, battery_lives: i32) -> Self {
        let is_battery_energy = energy_type == EnergyType::Battery;
        let initial = EnergySnapshot {
            timestamp_ms: clock.now_ms(),
            is_battery_energy,
            ..Default::default()
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            clock,
            battery_lives: if is_battery_energy { battery_lives } else { 0 },
            cell: SnapshotCell::new(initial),
            events,
        }
    }

    /// Host callback: energy counter is ready.
    pub fn energy_did_init(&self, energy: f32) {
        self.set(energy);
        let _ = self.events.send(EnergyEvent::Initialized(energy));
    }

    /// Host callback: energy moved.
    pub fn energy_did_change(&self, energy: f32) {
        if self.set(energy) {
            let _ = self.events.send(EnergyEvent::Changed(energy));
        }
    }

    /// Host callback: energy reached zero.
    pub fn energy_did_reach_zero(&self) {
        self.set(0.0);
        tracing::debug!("energy reached zero");
        let _ = self.events.send(EnergyEvent::ReachedZero);
    }

    /// Receiver for discrete energy transitions.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EnergyEvent> {
        self.events.subscribe()
    }

    fn set(&self, energy: f32) -> bool {
        let now = self.clock.now_ms();
        let energy = energy.clamp(0.0, 1.0);
        let battery_energy = (energy * self.battery_lives as f32).round() as i32;
        self.cell.update(|prev| EnergySnapshot {
            timestamp_ms: now,
            energy,
            battery_energy,
            is_battery_energy: prev.is_battery_energy,
        })
    }
}

impl SnapshotSource<EnergySnapshot> for EnergyMonitor {
    fn latest(&self) -> Arc<EnergySnapshot> {
        self.cell.latest()
    }

    fn subscribe(&self) -> watch::Receiver<Arc<EnergySnapshot>> {
        self.cell.subscribe()
    }
}
