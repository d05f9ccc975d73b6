//! Fault aggregation.
//!
//! Driver failures and prolonged stale telemetry become `FaultRecord`s keyed by
//! (device, kind). Re-reporting an active key refreshes it instead of adding a
//! record; the next successful check for the device clears it.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::status::Health;
use crate::types::{Device, FaultKind, FaultRecord};
use crate::util::lock;

#[derive(Debug)]
pub struct FaultMonitor {
    stale_grace: Duration,
    active: Mutex<BTreeMap<(Device, FaultKind), FaultRecord>>,
}

impl FaultMonitor {
    pub fn new(stale_grace: Duration) -> Self {
        Self {
            stale_grace,
            active: Mutex::new(BTreeMap::new()),
        }
    }

    /// Record a fault. Returns true when the key was not already active.
    pub fn report(&self, device: Device, kind: FaultKind, now: Instant) -> bool {
        let mut active = lock(&self.active);
        match active.get_mut(&(device, kind)) {
            Some(rec) => {
                rec.detected_at = now;
                rec.occurrences = rec.occurrences.saturating_add(1);
                tracing::trace!(%device, %kind, occurrences = rec.occurrences, "fault refreshed");
                false
            }
            None => {
                active.insert(
                    (device, kind),
                    FaultRecord {
                        device,
                        kind,
                        detected_at: now,
                        occurrences: 1,
                    },
                );
                tracing::warn!(%device, %kind, "fault raised");
                true
            }
        }
    }

    /// Clear one key. Returns true if it was active.
    pub fn clear(&self, device: Device, kind: FaultKind) -> bool {
        let removed = lock(&self.active).remove(&(device, kind)).is_some();
        if removed {
            tracing::info!(%device, %kind, "fault cleared");
        }
        removed
    }

    /// Clear every fault of `device` after a successful check. Returns how
    /// many were cleared.
    pub fn clear_device(&self, device: Device) -> usize {
        let mut active = lock(&self.active);
        let before = active.len();
        active.retain(|(d, _), _| *d != device);
        let cleared = before - active.len();
        if cleared > 0 {
            tracing::info!(%device, cleared, "device faults cleared");
        }
        cleared
    }

    /// Raise (PowerMonitor, Timeout) once telemetry has been stale for the
    /// grace period. `stale_since` is None while telemetry is healthy.
    pub fn observe_stale(&self, stale_since: Option<Instant>, now: Instant) -> bool {
        match stale_since {
            Some(since) if now.saturating_duration_since(since) >= self.stale_grace => {
                self.report(Device::PowerMonitor, FaultKind::Timeout, now);
                true
            }
            _ => false,
        }
    }

    /// Currently active faults, ordered by device then kind.
    pub fn active(&self) -> Vec<FaultRecord> {
        lock(&self.active).values().copied().collect()
    }

    pub fn is_faulted(&self, device: Device) -> bool {
        lock(&self.active).keys().any(|(d, _)| *d == device)
    }

    pub fn health(&self) -> Health {
        match lock(&self.active).len() {
            0 => Health::Nominal,
            faults => Health::Degraded { faults },
        }
    }

    pub fn stale_grace(&self) -> Duration {
        self.stale_grace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_reports_refresh_instead_of_adding() {
        let m = FaultMonitor::new(Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(m.report(Device::Pump, FaultKind::Timeout, t0));
        let t1 = t0 + Duration::from_secs(1);
        assert!(!m.report(Device::Pump, FaultKind::Timeout, t1));
        let active = m.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].detected_at, t1);
        assert_eq!(active[0].occurrences, 2);
    }

    #[test]
    fn distinct_kinds_are_distinct_records() {
        let m = FaultMonitor::new(Duration::from_secs(10));
        let now = Instant::now();
        m.report(Device::Pump, FaultKind::Timeout, now);
        m.report(Device::Pump, FaultKind::DriverError, now);
        m.report(Device::Lighting, FaultKind::DriverError, now);
        assert_eq!(m.active().len(), 3);
        assert_eq!(m.health(), Health::Degraded { faults: 3 });
        assert_eq!(m.clear_device(Device::Pump), 2);
        assert!(!m.is_faulted(Device::Pump));
        assert!(m.is_faulted(Device::Lighting));
        assert!(m.clear(Device::Lighting, FaultKind::DriverError));
        assert!(!m.clear(Device::Lighting, FaultKind::DriverError));
        assert_eq!(m.health(), Health::Nominal);
    }

    #[test]
    fn stale_fault_waits_for_grace() {
        let m = FaultMonitor::new(Duration::from_secs(10));
        let since = Instant::now();
        assert!(!m.observe_stale(Some(since), since + Duration::from_secs(6)));
        assert!(m.active().is_empty());
        assert!(m.observe_stale(Some(since), since + Duration::from_secs(10)));
        let active = m.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].device, Device::PowerMonitor);
        assert_eq!(active[0].kind, FaultKind::Timeout);
        assert!(!m.observe_stale(None, since + Duration::from_secs(20)));
    }
}
