//! Test and helper mocks for reef_core.
//!
//! `Spy` implements every actuator trait and records what reached it, so
//! tests can assert on the exact driver traffic a command sequence produced.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reef_traits::{
    AutoFeederDriver, DriverResult, LightingDriver, PowerMonitorDriver, PowerReadings, PumpDriver,
    WaveMakerDriver,
};

use crate::util::lock;

/// One driver call as seen by a `Spy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Speed(u8),
    Enabled(bool),
    Dispense,
    Intensity(u8),
}

/// Recording actuator driver. Clones share the call log and failure script.
#[derive(Debug, Clone, Default)]
pub struct Spy {
    calls: Arc<Mutex<Vec<Call>>>,
    failures: Arc<Mutex<VecDeque<String>>>,
    delay: Arc<Mutex<Duration>>,
}

impl Spy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call blocks for `delay` before returning.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    /// Change the delay for this spy and all of its clones.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = delay;
    }

    /// The next call fails with `message`. Queued failures are used in order.
    pub fn fail_next(&self, message: impl Into<String>) {
        lock(&self.failures).push_back(message.into());
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn count(&self) -> usize {
        lock(&self.calls).len()
    }

    fn record(&self, call: Call) -> DriverResult<()> {
        let delay = *lock(&self.delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        lock(&self.calls).push(call);
        match lock(&self.failures).pop_front() {
            Some(msg) => Err(msg.into()),
            None => Ok(()),
        }
    }
}

impl PumpDriver for Spy {
    fn set_speed(&mut self, percent: u8) -> DriverResult<()> {
        self.record(Call::Speed(percent))
    }
}

impl WaveMakerDriver for Spy {
    fn set_enabled(&mut self, enabled: bool) -> DriverResult<()> {
        self.record(Call::Enabled(enabled))
    }
}

impl AutoFeederDriver for Spy {
    fn dispense(&mut self) -> DriverResult<()> {
        self.record(Call::Dispense)
    }
}

impl LightingDriver for Spy {
    fn set_intensity(&mut self, percent: u8) -> DriverResult<()> {
        self.record(Call::Intensity(percent))
    }
}

/// Power monitor returning fixed readings until its failure switch is set.
#[derive(Debug, Clone)]
pub struct ScriptedMonitor {
    readings: PowerReadings,
    fail: Arc<AtomicBool>,
    reads: Arc<AtomicU64>,
    delay: Duration,
}

impl ScriptedMonitor {
    pub fn new(readings: PowerReadings) -> Self {
        Self {
            readings,
            fail: Arc::new(AtomicBool::new(false)),
            reads: Arc::new(AtomicU64::new(0)),
            delay: Duration::ZERO,
        }
    }

    /// Every read blocks for `delay`, ignoring the timeout it is given.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// While set, every read fails with a timeout.
    pub fn failure_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail)
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Acquire)
    }
}

impl Default for ScriptedMonitor {
    fn default() -> Self {
        Self::new(PowerReadings {
            pv_voltage: 18.2,
            load_voltage: 12.6,
            current: 1.5,
        })
    }
}

impl PowerMonitorDriver for ScriptedMonitor {
    fn readings(&mut self, _timeout: Duration) -> DriverResult<PowerReadings> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.reads.fetch_add(1, Ordering::AcqRel);
        if self.fail.load(Ordering::Acquire) {
            Err("power monitor read timeout".into())
        } else {
            Ok(self.readings)
        }
    }
}

/// A power monitor that always errors; for tests that only exercise actuators.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl PowerMonitorDriver for NoopMonitor {
    fn readings(&mut self, _timeout: Duration) -> DriverResult<PowerReadings> {
        Err(Box::new(std::io::Error::other("noop power monitor")))
    }
}
