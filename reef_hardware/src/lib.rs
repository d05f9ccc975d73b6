//! Concrete driver variants for the reef controller.
//!
//! `Simulated*` drivers stand in for real hardware on a desktop and in tests.
//! With the `hardware` feature the `hardware` module provides GPIO/PWM relays
//! and an INA219-based power monitor for a Raspberry Pi.
pub mod error;
pub mod util;

#[cfg(feature = "hardware")]
pub mod ina219;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use reef_traits::clock::{Clock, MonotonicClock};
use reef_traits::{
    AutoFeederDriver, DriverResult, LightingDriver, PowerMonitorDriver, PowerReadings, PumpDriver,
    WaveMakerDriver,
};

use crate::error::{HwError, check_percent};

/// Default feed cycle of the simulated feeder (auger turn + settle).
pub const DEFAULT_FEED_CYCLE: Duration = Duration::from_secs(3);

/// Simulated return pump; starts at 50 %.
#[derive(Debug)]
pub struct SimulatedPump {
    speed: u8,
}

impl SimulatedPump {
    pub fn new() -> Self {
        Self { speed: 50 }
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }
}

impl Default for SimulatedPump {
    fn default() -> Self {
        Self::new()
    }
}

impl PumpDriver for SimulatedPump {
    fn set_speed(&mut self, percent: u8) -> DriverResult<()> {
        self.speed = check_percent(percent)?;
        tracing::info!(percent, "pump speed set (simulated)");
        Ok(())
    }
}

/// Simulated wavemaker; starts enabled.
#[derive(Debug)]
pub struct SimulatedWaveMaker {
    enabled: bool,
}

impl SimulatedWaveMaker {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for SimulatedWaveMaker {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveMakerDriver for SimulatedWaveMaker {
    fn set_enabled(&mut self, enabled: bool) -> DriverResult<()> {
        self.enabled = enabled;
        tracing::info!(enabled, "wavemaker toggled (simulated)");
        Ok(())
    }
}

/// Simulated auto-feeder. A dispense starts a feed cycle that keeps running
/// for `cycle`; triggering again before it ends fails with `HwError::Busy`.
#[derive(Debug)]
pub struct SimulatedFeeder<C: Clock = MonotonicClock> {
    cycle: Duration,
    started: Option<Instant>,
    feeds: u32,
    clock: C,
}

impl SimulatedFeeder<MonotonicClock> {
    pub fn new() -> Self {
        Self::with_clock(DEFAULT_FEED_CYCLE, MonotonicClock::new())
    }
}

impl Default for SimulatedFeeder<MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> SimulatedFeeder<C> {
    pub fn with_clock(cycle: Duration, clock: C) -> Self {
        Self {
            cycle,
            started: None,
            feeds: 0,
            clock,
        }
    }

    /// Number of completed triggers.
    pub fn feeds(&self) -> u32 {
        self.feeds
    }

    fn cycle_running(&self, now: Instant) -> bool {
        self.started
            .is_some_and(|t| now.saturating_duration_since(t) < self.cycle)
    }
}

impl<C: Clock> AutoFeederDriver for SimulatedFeeder<C> {
    fn dispense(&mut self) -> DriverResult<()> {
        let now = self.clock.now();
        if self.cycle_running(now) {
            tracing::warn!("feeder busy, dispense rejected (simulated)");
            return Err(Box::new(HwError::Busy));
        }
        self.started = Some(now);
        self.feeds = self.feeds.saturating_add(1);
        tracing::info!(feeds = self.feeds, "feeder dispensing (simulated)");
        Ok(())
    }
}

/// Simulated LED channel; starts at 75 %.
#[derive(Debug)]
pub struct SimulatedLighting {
    intensity: u8,
}

impl SimulatedLighting {
    pub fn new() -> Self {
        Self { intensity: 75 }
    }

    pub fn intensity(&self) -> u8 {
        self.intensity
    }
}

impl Default for SimulatedLighting {
    fn default() -> Self {
        Self::new()
    }
}

impl LightingDriver for SimulatedLighting {
    fn set_intensity(&mut self, percent: u8) -> DriverResult<()> {
        self.intensity = check_percent(percent)?;
        tracing::info!(percent, "lighting intensity set (simulated)");
        Ok(())
    }
}

/// Simulated solar/load monitor.
///
/// Values wander slightly around a nominal operating point so consecutive
/// samples are distinguishable. Failures can be injected through the shared
/// switch returned by `failure_switch()`.
#[derive(Debug)]
pub struct SimulatedPowerMonitor {
    nominal: PowerReadings,
    reads: u32,
    fail: Arc<AtomicBool>,
}

impl SimulatedPowerMonitor {
    pub fn new() -> Self {
        Self::with_nominal(PowerReadings {
            pv_voltage: 18.5,
            load_voltage: 12.6,
            current: 1.4,
        })
    }

    pub fn with_nominal(nominal: PowerReadings) -> Self {
        Self {
            nominal,
            reads: 0,
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start in the failing state (sensor unplugged).
    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::Relaxed);
        self
    }

    /// Shared flag: while true every read fails with a timeout.
    pub fn failure_switch(&self) -> Arc<AtomicBool> {
        self.fail.clone()
    }
}

impl Default for SimulatedPowerMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerMonitorDriver for SimulatedPowerMonitor {
    fn readings(&mut self, _timeout: Duration) -> DriverResult<PowerReadings> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(Box::new(HwError::Timeout));
        }
        self.reads = self.reads.wrapping_add(1);
        // Small deterministic ripple: -0.2..=+0.2 on voltages, -0.05..=+0.05 A
        let phase = (self.reads % 5) as f32 - 2.0;
        let r = PowerReadings {
            pv_voltage: (self.nominal.pv_voltage + phase * 0.1).max(0.0),
            load_voltage: (self.nominal.load_voltage + phase * 0.05).max(0.0),
            current: (self.nominal.current + phase * 0.025).max(0.0),
        };
        tracing::trace!(?r, "power readings (simulated)");
        Ok(r)
    }
}

#[cfg(feature = "hardware")]
pub mod hardware {
    //! Raspberry Pi drivers (rppal). Pumps and lights use software PWM on a
    //! GPIO pin; the wavemaker and feeder are relay outputs.
    use super::*;
    use crate::ina219::Ina219;
    use rppal::gpio::{Gpio, OutputPin};

    const PWM_FREQUENCY_HZ: f64 = 1_000.0;

    fn output_pin(pin: u8) -> crate::error::Result<OutputPin> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let p = gpio.get(pin).map_err(|e| HwError::Gpio(e.to_string()))?;
        Ok(p.into_output_low())
    }

    fn apply_duty(pin: &mut OutputPin, percent: u8) -> crate::error::Result<()> {
        let percent = check_percent(percent)?;
        if percent == 0 {
            pin.clear_pwm().map_err(|e| HwError::Gpio(e.to_string()))?;
            pin.set_low();
            return Ok(());
        }
        pin.set_pwm_frequency(PWM_FREQUENCY_HZ, f64::from(percent) / 100.0)
            .map_err(|e| HwError::Gpio(e.to_string()))
    }

    pub struct PwmPump {
        pin: OutputPin,
    }

    impl PwmPump {
        pub fn new(pin: u8) -> crate::error::Result<Self> {
            Ok(Self {
                pin: output_pin(pin)?,
            })
        }
    }

    impl PumpDriver for PwmPump {
        fn set_speed(&mut self, percent: u8) -> DriverResult<()> {
            apply_duty(&mut self.pin, percent)?;
            tracing::debug!(percent, "pump pwm duty applied");
            Ok(())
        }
    }

    pub struct PwmLighting {
        pin: OutputPin,
    }

    impl PwmLighting {
        pub fn new(pin: u8) -> crate::error::Result<Self> {
            Ok(Self {
                pin: output_pin(pin)?,
            })
        }
    }

    impl LightingDriver for PwmLighting {
        fn set_intensity(&mut self, percent: u8) -> DriverResult<()> {
            apply_duty(&mut self.pin, percent)?;
            tracing::debug!(percent, "lighting pwm duty applied");
            Ok(())
        }
    }

    pub struct RelayWaveMaker {
        pin: OutputPin,
        active_low: bool,
    }

    impl RelayWaveMaker {
        pub fn new(pin: u8, active_low: bool) -> crate::error::Result<Self> {
            Ok(Self {
                pin: output_pin(pin)?,
                active_low,
            })
        }
    }

    impl WaveMakerDriver for RelayWaveMaker {
        fn set_enabled(&mut self, enabled: bool) -> DriverResult<()> {
            if enabled != self.active_low {
                self.pin.set_high();
            } else {
                self.pin.set_low();
            }
            tracing::debug!(enabled, "wavemaker relay switched");
            Ok(())
        }
    }

    /// Feeder motor on a relay: the relay is closed for `pulse`, then the
    /// mechanism needs until `cycle` has elapsed before it can feed again.
    pub struct RelayFeeder {
        pin: OutputPin,
        pulse: Duration,
        cycle: Duration,
        started: Option<Instant>,
    }

    impl RelayFeeder {
        pub fn new(pin: u8, pulse: Duration, cycle: Duration) -> crate::error::Result<Self> {
            Ok(Self {
                pin: output_pin(pin)?,
                pulse,
                cycle: cycle.max(pulse),
                started: None,
            })
        }
    }

    impl AutoFeederDriver for RelayFeeder {
        fn dispense(&mut self) -> DriverResult<()> {
            let now = Instant::now();
            if self
                .started
                .is_some_and(|t| now.saturating_duration_since(t) < self.cycle)
            {
                return Err(Box::new(HwError::Busy));
            }
            self.started = Some(now);
            self.pin.set_high();
            std::thread::sleep(self.pulse);
            self.pin.set_low();
            tracing::debug!(pulse_ms = crate::util::millis_u64(self.pulse), "feeder pulsed");
            Ok(())
        }
    }

    /// Two INA219s: one on the PV input, one on the load bus (which also
    /// measures load current).
    pub struct Ina219Monitor {
        pv: Ina219,
        load: Ina219,
    }

    impl Ina219Monitor {
        pub fn new(
            bus: u8,
            pv_address: u16,
            load_address: u16,
            shunt_ohms: f32,
        ) -> crate::error::Result<Self> {
            Ok(Self {
                pv: Ina219::new(bus, pv_address, shunt_ohms)?,
                load: Ina219::new(bus, load_address, shunt_ohms)?,
            })
        }
    }

    impl PowerMonitorDriver for Ina219Monitor {
        fn readings(&mut self, timeout: Duration) -> DriverResult<PowerReadings> {
            let pv_voltage = self.pv.bus_voltage(timeout)?;
            let load_voltage = self.load.bus_voltage(timeout)?;
            let current = self.load.current()?;
            Ok(PowerReadings {
                pv_voltage,
                load_voltage,
                current,
            })
        }
    }
}
