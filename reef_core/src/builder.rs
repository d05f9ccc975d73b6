//! Type-state builder for `ReefCore`.
//!
//! The power monitor is mandatory, so `build()` only exists once
//! `with_power_monitor` has been called. Actuators are optional; commands to
//! an actuator that was never attached fail with `NotConfigured`.
//! `try_build()` is available in any state for dynamic wiring.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use crossbeam_channel as xch;
use reef_traits::{
    AutoFeederDriver, LightingDriver, MonotonicClock, PowerMonitorDriver, PumpDriver,
    WaveMakerDriver,
};

use crate::config::CoreSettings;
use crate::core::ReefCore;
use crate::dispatch::{self, Actuate};
use crate::error::{BuildError, Result};
use crate::faults::FaultMonitor;
use crate::sampler::TelemetrySampler;
use crate::state::{FeedGate, StateTable};
use crate::types::Actuator;
use crate::util::SharedClock;

type BoxedMonitor = Box<dyn PowerMonitorDriver + Send>;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct ReefCoreBuilder<P> {
    actuators: Vec<(Actuator, Actuate)>,
    monitor: Option<BoxedMonitor>,
    settings: CoreSettings,
    clock: Option<SharedClock>,
    _p: PhantomData<P>,
}

impl Default for ReefCoreBuilder<Missing> {
    fn default() -> Self {
        Self {
            actuators: Vec::new(),
            monitor: None,
            settings: CoreSettings::default(),
            clock: None,
            _p: PhantomData,
        }
    }
}

impl<P> std::fmt::Debug for ReefCoreBuilder<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let attached: Vec<_> = self.actuators.iter().map(|(a, _)| *a).collect();
        f.debug_struct("ReefCoreBuilder")
            .field("actuators", &attached)
            .field("power_monitor", &self.monitor.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Chainable setters that do not affect type-state.
impl<P> ReefCoreBuilder<P> {
    fn attach(mut self, target: Actuator, actuate: Actuate) -> Self {
        self.actuators.retain(|(a, _)| *a != target);
        self.actuators.push((target, actuate));
        self
    }

    pub fn with_pump(self, driver: impl PumpDriver + Send + 'static) -> Self {
        self.attach(Actuator::Pump, dispatch::pump(driver))
    }

    pub fn with_wavemaker(self, driver: impl WaveMakerDriver + Send + 'static) -> Self {
        self.attach(Actuator::WaveMaker, dispatch::wavemaker(driver))
    }

    pub fn with_feeder(self, driver: impl AutoFeederDriver + Send + 'static) -> Self {
        self.attach(Actuator::Feeder, dispatch::feeder(driver))
    }

    pub fn with_lighting(self, driver: impl LightingDriver + Send + 'static) -> Self {
        self.attach(Actuator::Lighting, dispatch::lighting(driver))
    }

    pub fn with_settings(mut self, settings: CoreSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Provide a custom clock; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<ReefCore> {
        let monitor = self
            .monitor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingPowerMonitor))?;
        assemble(self.actuators, monitor, self.settings, self.clock)
    }
}

impl ReefCoreBuilder<Missing> {
    pub fn with_power_monitor(
        self,
        monitor: impl PowerMonitorDriver + Send + 'static,
    ) -> ReefCoreBuilder<Set> {
        ReefCoreBuilder {
            actuators: self.actuators,
            monitor: Some(Box::new(monitor)),
            settings: self.settings,
            clock: self.clock,
            _p: PhantomData,
        }
    }
}

impl ReefCoreBuilder<Set> {
    /// Validate settings, start the telemetry and dispatch threads.
    pub fn build(self) -> Result<ReefCore> {
        self.try_build()
    }
}

fn assemble(
    actuators: Vec<(Actuator, Actuate)>,
    monitor: BoxedMonitor,
    settings: CoreSettings,
    clock: Option<SharedClock>,
) -> Result<ReefCore> {
    settings.validate().map_err(eyre::Report::new)?;
    let clock: SharedClock = clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));

    let configured: Vec<Actuator> = actuators.iter().map(|(a, _)| *a).collect();
    let faults = Arc::new(FaultMonitor::new(settings.faults.stale_grace));
    let shared = dispatch::Shared {
        states: Arc::new(StateTable::new(&configured)),
        faults: Arc::clone(&faults),
        feed_gate: Arc::new(FeedGate::new(settings.feed_cycle)),
        processed: Arc::new(AtomicU64::new(0)),
        clock: Arc::clone(&clock),
    };

    let sampler = TelemetrySampler::new(
        monitor,
        settings.telemetry.clone(),
        Arc::clone(&clock),
        Arc::clone(&faults),
    );
    let telemetry = sampler.feed();
    let sampler = sampler.spawn().map_err(eyre::Report::new)?;

    let (cmd_tx, cmd_rx) = xch::unbounded();
    let dispatcher = dispatch::spawn(actuators, cmd_rx, &settings.debounce, shared.clone())
        .map_err(eyre::Report::new)?;

    tracing::info!(
        actuators = ?configured,
        debounce_ms = crate::util::millis(settings.debounce.interval),
        telemetry_period_ms = crate::util::millis(settings.telemetry.period),
        "reef core started"
    );

    Ok(ReefCore::new(
        cmd_tx, shared, telemetry, settings.policy, dispatcher, sampler,
    ))
}
