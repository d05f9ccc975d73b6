//! `From` implementations bridging `reef_config` types to `reef_core` types.

use std::time::Duration;

use crate::config::{CoreSettings, DebounceCfg, FaultCfg, TelemetryCfg};
use crate::validator::ValidationPolicy;

// ── DebounceCfg ──────────────────────────────────────────────────────────────

impl From<&reef_config::Debounce> for DebounceCfg {
    fn from(c: &reef_config::Debounce) -> Self {
        Self {
            interval: Duration::from_millis(c.interval_ms),
            actuation_timeout: Duration::from_millis(c.actuation_timeout_ms),
        }
    }
}

// ── TelemetryCfg ─────────────────────────────────────────────────────────────

impl From<&reef_config::Telemetry> for TelemetryCfg {
    fn from(c: &reef_config::Telemetry) -> Self {
        Self {
            period: Duration::from_millis(c.period_ms),
            read_timeout: Duration::from_millis(c.read_timeout_ms),
            max_age: Duration::from_millis(c.max_age_ms),
            max_voltage: c.max_voltage,
            max_current: c.max_current,
        }
    }
}

// ── FaultCfg ─────────────────────────────────────────────────────────────────

impl From<&reef_config::Faults> for FaultCfg {
    fn from(c: &reef_config::Faults) -> Self {
        Self {
            stale_grace: Duration::from_millis(c.stale_grace_ms),
        }
    }
}

impl From<reef_config::Policy> for ValidationPolicy {
    fn from(p: reef_config::Policy) -> Self {
        match p {
            reef_config::Policy::Reject => ValidationPolicy::Reject,
            reef_config::Policy::Clamp => ValidationPolicy::Clamp,
        }
    }
}

// ── CoreSettings ─────────────────────────────────────────────────────────────

impl From<&reef_config::Config> for CoreSettings {
    fn from(c: &reef_config::Config) -> Self {
        Self {
            debounce: (&c.debounce).into(),
            telemetry: (&c.telemetry).into(),
            faults: (&c.faults).into(),
            policy: c.validation.policy.into(),
            feed_cycle: Duration::from_millis(c.devices.feed_cycle_ms),
        }
    }
}
