//! Runtime settings for the control core.
//!
//! These are separate from the TOML-deserialized config in `reef_config`;
//! see `conversions` for the mapping.

use std::time::Duration;

use crate::error::BuildError;
use crate::validator::ValidationPolicy;

/// Actuation debounce and in-flight supervision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebounceCfg {
    /// Commands to one device inside this window are coalesced. Default: 50 ms.
    pub interval: Duration,
    /// Driver calls running longer than this raise a Timeout fault. Default: 2 s.
    pub actuation_timeout: Duration,
}

impl Default for DebounceCfg {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(50),
            actuation_timeout: Duration::from_secs(2),
        }
    }
}

/// Power monitor polling.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryCfg {
    /// Poll period. Default: 1 s.
    pub period: Duration,
    /// Per-read timeout; slower reads count as failures. Default: 2 s.
    pub read_timeout: Duration,
    /// Samples older than this are reported stale. Default: 5 s.
    pub max_age: Duration,
    /// Upper plausibility bound for both voltages (V).
    pub max_voltage: f32,
    /// Upper plausibility bound for the load current (A).
    pub max_current: f32,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            read_timeout: Duration::from_secs(2),
            max_age: Duration::from_secs(5),
            max_voltage: 60.0,
            max_current: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultCfg {
    /// Stale telemetry longer than this raises (PowerMonitor, Timeout). Default: 10 s.
    pub stale_grace: Duration,
}

impl Default for FaultCfg {
    fn default() -> Self {
        Self {
            stale_grace: Duration::from_secs(10),
        }
    }
}

const MAX_DEBOUNCE: Duration = Duration::from_secs(10);
const MAX_ACTUATION_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct CoreSettings {
    pub debounce: DebounceCfg,
    pub telemetry: TelemetryCfg,
    pub faults: FaultCfg,
    pub policy: ValidationPolicy,
    /// After a confirmed dispense, further feeds are refused as Busy for
    /// this long. Default: 3 s.
    pub feed_cycle: Duration,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            debounce: DebounceCfg::default(),
            telemetry: TelemetryCfg::default(),
            faults: FaultCfg::default(),
            policy: ValidationPolicy::default(),
            feed_cycle: Duration::from_secs(3),
        }
    }
}

impl CoreSettings {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.debounce.interval > MAX_DEBOUNCE {
            return Err(BuildError::InvalidConfig(
                "debounce interval is unreasonably large (>10s)",
            ));
        }
        if self.debounce.actuation_timeout > MAX_ACTUATION_TIMEOUT {
            return Err(BuildError::InvalidConfig(
                "actuation_timeout is unreasonably large (>1h)",
            ));
        }
        if self.debounce.actuation_timeout.is_zero() {
            return Err(BuildError::InvalidConfig(
                "actuation_timeout must be > 0",
            ));
        }
        if self.telemetry.period.is_zero() {
            return Err(BuildError::InvalidConfig("telemetry period must be > 0"));
        }
        if self.telemetry.read_timeout.is_zero() {
            return Err(BuildError::InvalidConfig("read_timeout must be > 0"));
        }
        if self.telemetry.max_age < self.telemetry.period {
            return Err(BuildError::InvalidConfig(
                "max_age must be >= telemetry period",
            ));
        }
        if !(self.telemetry.max_voltage.is_finite() && self.telemetry.max_voltage > 0.0) {
            return Err(BuildError::InvalidConfig("max_voltage must be > 0"));
        }
        if !(self.telemetry.max_current.is_finite() && self.telemetry.max_current > 0.0) {
            return Err(BuildError::InvalidConfig("max_current must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(CoreSettings::default().validate(), Ok(()));
    }

    #[test]
    fn max_age_below_period_is_rejected() {
        let mut s = CoreSettings::default();
        s.telemetry.max_age = Duration::from_millis(500);
        assert!(matches!(s.validate(), Err(BuildError::InvalidConfig(m)) if m.contains("max_age")));
    }
}
