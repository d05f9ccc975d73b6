//! Per-actuator state table shared between the dispatch thread and readers.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::types::{Actuator, DeviceState};
use crate::util::lock;

#[derive(Debug, Default)]
pub(crate) struct StateTable {
    states: Mutex<[Option<DeviceState>; 4]>,
}

impl StateTable {
    /// Table with one entry per configured actuator.
    pub(crate) fn new(configured: &[Actuator]) -> Self {
        let mut states: [Option<DeviceState>; 4] = Default::default();
        for a in configured {
            states[a.index()] = Some(DeviceState::default());
        }
        Self {
            states: Mutex::new(states),
        }
    }

    pub(crate) fn contains(&self, target: Actuator) -> bool {
        lock(&self.states)[target.index()].is_some()
    }

    pub(crate) fn snapshot(&self, target: Actuator) -> Option<DeviceState> {
        lock(&self.states)[target.index()].clone()
    }

    pub(crate) fn update(&self, target: Actuator, f: impl FnOnce(&mut DeviceState)) {
        if let Some(state) = lock(&self.states)[target.index()].as_mut() {
            f(state);
        }
    }

    /// True when no configured actuator has anything pending or in flight.
    pub(crate) fn all_settled(&self) -> bool {
        lock(&self.states)
            .iter()
            .flatten()
            .all(|s| !s.pending && !s.in_flight)
    }
}

/// Re-entry guard for the feeder: armed from submission until the driver
/// acknowledges, then closed for the rest of the feed cycle.
#[derive(Debug)]
pub(crate) struct FeedGate {
    armed: AtomicBool,
    last_feed: Mutex<Option<Instant>>,
    cycle: Duration,
}

impl FeedGate {
    pub(crate) fn new(cycle: Duration) -> Self {
        Self {
            armed: AtomicBool::new(false),
            last_feed: Mutex::new(None),
            cycle,
        }
    }

    /// Claim the feeder. False if a feed is pending, in flight or its cycle
    /// is still running.
    pub(crate) fn try_arm(&self, now: Instant) -> bool {
        let cycling = lock(&self.last_feed)
            .is_some_and(|t| now.saturating_duration_since(t) < self.cycle);
        if cycling {
            return false;
        }
        self.armed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release after the driver answered; `fed_at` starts the cycle.
    pub(crate) fn release(&self, fed_at: Option<Instant>) {
        if let Some(t) = fed_at {
            *lock(&self.last_feed) = Some(t);
        }
        self.armed.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_only_tracks_configured_actuators() {
        let table = StateTable::new(&[Actuator::Pump, Actuator::Lighting]);
        assert!(table.contains(Actuator::Pump));
        assert!(!table.contains(Actuator::Feeder));
        table.update(Actuator::Feeder, |s| s.pending = true);
        assert!(table.snapshot(Actuator::Feeder).is_none());
        table.update(Actuator::Pump, |s| s.in_flight = true);
        assert!(!table.all_settled());
        table.update(Actuator::Pump, |s| s.in_flight = false);
        assert!(table.all_settled());
    }

    #[test]
    fn feed_gate_blocks_until_cycle_ends() {
        let gate = FeedGate::new(Duration::from_secs(3));
        let t0 = Instant::now();
        assert!(gate.try_arm(t0));
        assert!(!gate.try_arm(t0));
        gate.release(Some(t0));
        assert!(!gate.try_arm(t0 + Duration::from_secs(2)));
        assert!(gate.try_arm(t0 + Duration::from_secs(3)));
        // failed dispense: no cycle started
        gate.release(None);
        assert!(gate.try_arm(t0 + Duration::from_secs(3)));
    }
}
