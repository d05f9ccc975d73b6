//! Domain types shared by the validator, debouncer, sampler and fault monitor.

use std::fmt;
use std::time::{Duration, Instant};

use crate::status::SamplerState;

/// Anything the controller can command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Actuator {
    Pump,
    WaveMaker,
    Feeder,
    Lighting,
}

impl Actuator {
    pub const ALL: [Actuator; 4] = [
        Actuator::Pump,
        Actuator::WaveMaker,
        Actuator::Feeder,
        Actuator::Lighting,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Actuator::Pump => "pump",
            Actuator::WaveMaker => "wavemaker",
            Actuator::Feeder => "feeder",
            Actuator::Lighting => "lighting",
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            Actuator::Pump => 0,
            Actuator::WaveMaker => 1,
            Actuator::Feeder => 2,
            Actuator::Lighting => 3,
        }
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fault key: every actuator plus the power monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Device {
    Pump,
    WaveMaker,
    Feeder,
    Lighting,
    PowerMonitor,
}

impl Device {
    pub fn name(self) -> &'static str {
        match self {
            Device::Pump => "pump",
            Device::WaveMaker => "wavemaker",
            Device::Feeder => "feeder",
            Device::Lighting => "lighting",
            Device::PowerMonitor => "power_monitor",
        }
    }
}

impl From<Actuator> for Device {
    fn from(a: Actuator) -> Self {
        match a {
            Actuator::Pump => Device::Pump,
            Actuator::WaveMaker => Device::WaveMaker,
            Actuator::Feeder => Device::Feeder,
            Actuator::Lighting => Device::Lighting,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw value as submitted by a caller (slider position, checkbox, button).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandValue {
    Percent(i32),
    Switch(bool),
    Trigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCommand {
    pub target: Actuator,
    pub value: CommandValue,
}

impl DeviceCommand {
    pub fn pump_speed(percent: i32) -> Self {
        Self {
            target: Actuator::Pump,
            value: CommandValue::Percent(percent),
        }
    }

    pub fn lighting_intensity(percent: i32) -> Self {
        Self {
            target: Actuator::Lighting,
            value: CommandValue::Percent(percent),
        }
    }

    pub fn wavemaker(enabled: bool) -> Self {
        Self {
            target: Actuator::WaveMaker,
            value: CommandValue::Switch(enabled),
        }
    }

    pub fn feed() -> Self {
        Self {
            target: Actuator::Feeder,
            value: CommandValue::Trigger,
        }
    }
}

/// A value that passed validation. Percentages are always within 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setpoint {
    Percent(u8),
    Switch(bool),
    Trigger,
}

impl fmt::Display for Setpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setpoint::Percent(p) => write!(f, "{p}%"),
            Setpoint::Switch(true) => f.write_str("on"),
            Setpoint::Switch(false) => f.write_str("off"),
            Setpoint::Trigger => f.write_str("trigger"),
        }
    }
}

/// Output of the validator; only constructible inside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidCommand {
    target: Actuator,
    setpoint: Setpoint,
}

impl ValidCommand {
    pub(crate) fn new(target: Actuator, setpoint: Setpoint) -> Self {
        Self { target, setpoint }
    }

    pub fn target(&self) -> Actuator {
        self.target
    }

    pub fn setpoint(&self) -> Setpoint {
        self.setpoint
    }
}

/// Read-only view of one actuator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceState {
    /// Most recent accepted value (may still be waiting in the debounce window).
    pub commanded: Option<Setpoint>,
    /// Last value the driver acknowledged.
    pub confirmed: Option<Setpoint>,
    /// Any active fault for this device.
    pub fault: bool,
    /// A value is waiting for its debounce window or for the in-flight call.
    pub pending: bool,
    /// A driver call is running.
    pub in_flight: bool,
    /// Driver calls issued so far.
    pub dispatches: u64,
}

/// One accepted power monitor reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub pv_voltage: f32,
    pub load_voltage: f32,
    pub current: f32,
    pub timestamp: Instant,
}

impl TelemetrySample {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.timestamp)
    }
}

/// Latest telemetry as seen by a caller, tagged stale when it cannot be trusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySnapshot {
    /// Last valid sample, if any read ever succeeded.
    pub sample: Option<TelemetrySample>,
    /// True when there is no sample, the sampler is stale, or the sample is
    /// older than the configured max age.
    pub stale: bool,
    pub state: SamplerState,
    pub age: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FaultKind {
    Timeout,
    OutOfRange,
    DriverError,
}

impl FaultKind {
    pub fn name(self) -> &'static str {
        match self {
            FaultKind::Timeout => "timeout",
            FaultKind::OutOfRange => "out_of_range",
            FaultKind::DriverError => "driver_error",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultRecord {
    pub device: Device,
    pub kind: FaultKind,
    /// Last time the condition was observed.
    pub detected_at: Instant,
    /// How many times the condition was observed while active.
    pub occurrences: u32,
}
