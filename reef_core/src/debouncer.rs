//! Actuation debouncing policy.
//!
//! Pure bookkeeping: callers feed it commands, completions and the current
//! time, and it says what to send to which driver. The dispatch thread in
//! `dispatch` is its only user at runtime.
//!
//! Per actuator:
//! - The first command of a burst opens a window of `interval`; later commands
//!   inside the window replace the pending value. When the window closes the
//!   latest value is dispatched, so a burst costs one bus transaction.
//! - At most one call is in flight. A value that becomes due while the driver
//!   is still busy is queued (depth 1, replacing) and released by `complete`.
//! - Triggers are never coalesced and are due immediately.

use std::time::{Duration, Instant};

use crate::types::{Actuator, Setpoint};
use crate::util::later;

#[derive(Debug, Default, Clone)]
struct Slot {
    pending: Option<Setpoint>,
    due_at: Option<Instant>,
    queued: Option<Setpoint>,
    in_flight: Option<(Setpoint, Instant)>,
    overdue_reported: bool,
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    interval: Duration,
    actuation_timeout: Duration,
    slots: [Slot; 4],
}

impl Debouncer {
    pub fn new(interval: Duration, actuation_timeout: Duration) -> Self {
        Self {
            interval,
            actuation_timeout,
            slots: Default::default(),
        }
    }

    /// Accept a value for `target`. Returns true if it superseded a pending one.
    pub fn offer(&mut self, target: Actuator, setpoint: Setpoint, now: Instant) -> bool {
        let interval = self.interval;
        let slot = &mut self.slots[target.index()];
        let replaced = slot.pending.replace(setpoint).is_some();
        if matches!(setpoint, Setpoint::Trigger) {
            slot.due_at = Some(now);
        } else if !replaced {
            slot.due_at = Some(later(now, interval));
        }
        replaced
    }

    /// Values whose window has closed and whose device is idle. They are
    /// marked in flight; the caller must hand them to the driver and report
    /// back through `complete`.
    pub fn take_due(&mut self, now: Instant) -> Vec<(Actuator, Setpoint)> {
        let mut out = Vec::new();
        for target in Actuator::ALL {
            let slot = &mut self.slots[target.index()];
            let due = slot.due_at.is_some_and(|d| d <= now);
            if !due {
                continue;
            }
            let Some(sp) = slot.pending.take() else {
                slot.due_at = None;
                continue;
            };
            slot.due_at = None;
            if slot.in_flight.is_some() {
                slot.queued = Some(sp);
            } else {
                slot.in_flight = Some((sp, now));
                slot.overdue_reported = false;
                out.push((target, sp));
            }
        }
        out
    }

    /// The in-flight call of `target` finished. Returns the queued value, which
    /// is now in flight and must be dispatched right away.
    pub fn complete(&mut self, target: Actuator, now: Instant) -> Option<Setpoint> {
        let slot = &mut self.slots[target.index()];
        slot.in_flight = None;
        slot.overdue_reported = false;
        let next = slot.queued.take()?;
        slot.in_flight = Some((next, now));
        Some(next)
    }

    /// In-flight calls that just exceeded the actuation timeout. Each call is
    /// reported once.
    pub fn overdue(&mut self, now: Instant) -> Vec<Actuator> {
        let timeout = self.actuation_timeout;
        let mut out = Vec::new();
        for target in Actuator::ALL {
            let slot = &mut self.slots[target.index()];
            if let Some((_, started)) = slot.in_flight
                && !slot.overdue_reported
                && now.saturating_duration_since(started) >= timeout
            {
                slot.overdue_reported = true;
                out.push(target);
            }
        }
        out
    }

    /// Earliest instant at which `take_due` or `overdue` could return something.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots
            .iter()
            .flat_map(|s| {
                let due = s.pending.and(s.due_at);
                let overdue = match s.in_flight {
                    Some((_, started)) if !s.overdue_reported => {
                        Some(later(started, self.actuation_timeout))
                    }
                    _ => None,
                };
                [due, overdue]
            })
            .flatten()
            .min()
    }

    pub fn pending(&self, target: Actuator) -> Option<Setpoint> {
        let slot = &self.slots[target.index()];
        slot.pending.or(slot.queued)
    }

    pub fn in_flight(&self, target: Actuator) -> Option<Setpoint> {
        self.slots[target.index()].in_flight.map(|(sp, _)| sp)
    }

    /// Nothing pending, queued or in flight for `target`.
    pub fn is_idle(&self, target: Actuator) -> bool {
        let slot = &self.slots[target.index()];
        slot.pending.is_none() && slot.queued.is_none() && slot.in_flight.is_none()
    }
}
