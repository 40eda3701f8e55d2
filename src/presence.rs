// src/presence.rs
//
// Shared sensor state. The MQTT ingress task writes individual lane bits
// and the emergency slot; the cycle loop reads a snapshot once per decision.
// Per-lane bits are independent atomics, so a reader can never observe a
// torn vector beyond the benign race on individual bits.

use crate::types::{LaneId, PresenceVector, LANE_COUNT};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct PresenceTracker {
    lanes: [AtomicU8; LANE_COUNT],
    emergency: Mutex<Option<LaneId>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the raw presence bit for a lane, clamped to {0, 1}.
    pub fn update(&self, lane_index: usize, value: u8) {
        if let Some(slot) = self.lanes.get(lane_index) {
            slot.store(value.min(1), Ordering::Relaxed);
        }
    }

    /// Last writer wins; `None` clears the override.
    pub fn set_emergency(&self, lane: Option<LaneId>) {
        *lock_ignore_poison(&self.emergency) = lane;
    }

    pub fn emergency(&self) -> Option<LaneId> {
        *lock_ignore_poison(&self.emergency)
    }

    /// Momentary copy of the raw vector, taken once per cycle.
    pub fn snapshot(&self) -> PresenceVector {
        let mut out = [0u8; LANE_COUNT];
        for (slot, value) in self.lanes.iter().zip(out.iter_mut()) {
            *value = slot.load(Ordering::Relaxed);
        }
        out
    }
}

fn lock_ignore_poison<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
