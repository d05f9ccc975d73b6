#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the reef controller.
//!
//! `Config` and its sections are deserialized from TOML and validated. Every
//! section is optional; an empty document yields the built-in defaults.
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Debounce {
    /// Minimum spacing between two dispatches to the same actuator (ms).
    pub interval_ms: u64,
    /// A driver call running longer than this raises a Timeout fault (ms).
    pub actuation_timeout_ms: u64,
}

impl Default for Debounce {
    fn default() -> Self {
        Self {
            interval_ms: 50,
            actuation_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Telemetry {
    /// Poll period of the power monitor (ms).
    pub period_ms: u64,
    /// Per-read timeout handed to the driver (ms).
    pub read_timeout_ms: u64,
    /// Samples older than this are reported stale (ms).
    pub max_age_ms: u64,
    /// Readings above these limits are treated as out of range.
    pub max_voltage: f32,
    pub max_current: f32,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            period_ms: 1_000,
            read_timeout_ms: 2_000,
            max_age_ms: 5_000,
            max_voltage: 60.0,
            max_current: 30.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Faults {
    /// How long telemetry may stay stale before a Timeout fault is raised (ms).
    pub stale_grace_ms: u64,
}

impl Default for Faults {
    fn default() -> Self {
        Self {
            stale_grace_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Out-of-range percentages are refused.
    #[default]
    Reject,
    /// Out-of-range percentages are clamped to 0..=100.
    Clamp,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Validation {
    pub policy: Policy,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Devices {
    pub pump: bool,
    pub wavemaker: bool,
    pub feeder: bool,
    pub lighting: bool,
    /// Length of one feed cycle; triggers inside a running cycle are busy (ms).
    pub feed_cycle_ms: u64,
}

impl Default for Devices {
    fn default() -> Self {
        Self {
            pump: true,
            wavemaker: true,
            feeder: true,
            lighting: true,
            feed_cycle_ms: 3_000,
        }
    }
}

/// GPIO/I²C assignments used by the `hardware` driver set.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Pins {
    pub pump_pwm: u8,
    pub lighting_pwm: u8,
    pub wavemaker_relay: u8,
    pub feeder_relay: u8,
    /// Relay boards that switch on a low level
    pub relay_active_low: bool,
    /// How long the feeder relay stays closed per dispense (ms).
    pub feeder_pulse_ms: u64,
    pub i2c_bus: u8,
    pub ina219_pv_addr: u16,
    pub ina219_load_addr: u16,
    pub shunt_ohms: f32,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            pump_pwm: 18,
            lighting_pwm: 13,
            wavemaker_relay: 23,
            feeder_relay: 24,
            relay_active_low: true,
            feeder_pulse_ms: 800,
            i2c_bus: 1,
            ina219_pv_addr: 0x40,
            ina219_load_addr: 0x41,
            shunt_ohms: 0.1,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub debounce: Debounce,
    pub telemetry: Telemetry,
    pub faults: Faults,
    pub validation: Validation,
    pub devices: Devices,
    pub pins: Pins,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read and validate a config file. A missing file yields the defaults.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("invalid configuration {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Debounce
        if self.debounce.interval_ms > 10_000 {
            eyre::bail!("debounce.interval_ms is unreasonably large (>10s)");
        }
        if self.debounce.actuation_timeout_ms == 0 {
            eyre::bail!("debounce.actuation_timeout_ms must be >= 1");
        }
        if self.debounce.actuation_timeout_ms > 60 * 60 * 1000 {
            eyre::bail!("debounce.actuation_timeout_ms is unreasonably large (>1h)");
        }

        // Telemetry
        if self.telemetry.period_ms == 0 {
            eyre::bail!("telemetry.period_ms must be >= 1");
        }
        if self.telemetry.read_timeout_ms == 0 {
            eyre::bail!("telemetry.read_timeout_ms must be >= 1");
        }
        if self.telemetry.max_age_ms < self.telemetry.period_ms {
            eyre::bail!("telemetry.max_age_ms must be >= telemetry.period_ms");
        }
        if !(self.telemetry.max_voltage.is_finite() && self.telemetry.max_voltage > 0.0) {
            eyre::bail!("telemetry.max_voltage must be > 0");
        }
        if !(self.telemetry.max_current.is_finite() && self.telemetry.max_current > 0.0) {
            eyre::bail!("telemetry.max_current must be > 0");
        }

        // Faults
        if self.faults.stale_grace_ms > 24 * 60 * 60 * 1000 {
            eyre::bail!("faults.stale_grace_ms is unreasonably large (>24h)");
        }

        // Devices
        if self.devices.feed_cycle_ms == 0 {
            eyre::bail!("devices.feed_cycle_ms must be >= 1");
        }

        // Pins
        if !(self.pins.shunt_ohms.is_finite() && self.pins.shunt_ohms > 0.0) {
            eyre::bail!("pins.shunt_ohms must be > 0");
        }
        if self.pins.feeder_pulse_ms > self.devices.feed_cycle_ms {
            eyre::bail!("pins.feeder_pulse_ms must not exceed devices.feed_cycle_ms");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
