//! Capability interfaces for reef controller drivers.
//!
//! Every actuator and sensor the controller talks to implements exactly one of
//! these traits. Concrete variants (simulated or GPIO/I²C backed) live in
//! `reef_hardware`; the control core only ever sees the traits.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::time::Duration;

/// Error type crossing the driver boundary.
pub type DriverResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Raw electrical readings returned by a power monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerReadings {
    /// Solar panel voltage (V).
    pub pv_voltage: f32,
    /// Battery/load bus voltage (V).
    pub load_voltage: f32,
    /// Load current (A).
    pub current: f32,
}

/// Variable-speed return pump.
pub trait PumpDriver {
    /// Set the pump speed in percent. Values above 100 must be rejected.
    fn set_speed(&mut self, percent: u8) -> DriverResult<()>;
}

/// Wavemaker power switch.
pub trait WaveMakerDriver {
    fn set_enabled(&mut self, enabled: bool) -> DriverResult<()>;
}

/// Auto-feeder trigger.
///
/// A feed cycle keeps running after `dispense` returns; a second trigger while
/// the cycle is still in progress must fail with a busy error.
pub trait AutoFeederDriver {
    fn dispense(&mut self) -> DriverResult<()>;
}

/// Dimmable lighting channel.
pub trait LightingDriver {
    /// Set the intensity in percent. Values above 100 must be rejected.
    fn set_intensity(&mut self, percent: u8) -> DriverResult<()>;
}

/// Solar input and load telemetry source.
pub trait PowerMonitorDriver {
    /// Read the current values, giving up after `timeout`.
    fn readings(&mut self, timeout: Duration) -> DriverResult<PowerReadings>;
}

impl<T: PumpDriver + ?Sized> PumpDriver for Box<T> {
    fn set_speed(&mut self, percent: u8) -> DriverResult<()> {
        (**self).set_speed(percent)
    }
}

impl<T: WaveMakerDriver + ?Sized> WaveMakerDriver for Box<T> {
    fn set_enabled(&mut self, enabled: bool) -> DriverResult<()> {
        (**self).set_enabled(enabled)
    }
}

impl<T: AutoFeederDriver + ?Sized> AutoFeederDriver for Box<T> {
    fn dispense(&mut self) -> DriverResult<()> {
        (**self).dispense()
    }
}

impl<T: LightingDriver + ?Sized> LightingDriver for Box<T> {
    fn set_intensity(&mut self, percent: u8) -> DriverResult<()> {
        (**self).set_intensity(percent)
    }
}

impl<T: PowerMonitorDriver + ?Sized> PowerMonitorDriver for Box<T> {
    fn readings(&mut self, timeout: Duration) -> DriverResult<PowerReadings> {
        (**self).readings(timeout)
    }
}
