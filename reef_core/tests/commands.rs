//! End-to-end command handling through `ReefCore` with recording drivers.

use std::time::Duration;

use reef_core::mocks::{Call, ScriptedMonitor, Spy};
use reef_core::{
    Actuator, CommandError, CoreSettings, Device, DeviceCommand, FaultKind, Health, ReefCore, Setpoint,
    ValidationPolicy,
};
use rstest::rstest;

const SETTLE: Duration = Duration::from_secs(3);

fn fast_settings() -> CoreSettings {
    let mut s = CoreSettings::default();
    s.debounce.interval = Duration::from_millis(30);
    s.debounce.actuation_timeout = Duration::from_millis(500);
    s.telemetry.period = Duration::from_millis(20);
    s.feed_cycle = Duration::ZERO;
    s
}

struct Rig {
    core: ReefCore,
    pump: Spy,
    wave: Spy,
    feeder: Spy,
    lights: Spy,
}

fn rig_with(settings: CoreSettings, pump: Spy, feeder: Spy) -> Rig {
    let (wave, lights) = (Spy::new(), Spy::new());
    let core = ReefCore::builder()
        .with_pump(pump.clone())
        .with_wavemaker(wave.clone())
        .with_feeder(feeder.clone())
        .with_lighting(lights.clone())
        .with_settings(settings)
        .with_power_monitor(ScriptedMonitor::default())
        .build()
        .expect("core builds");
    Rig {
        core,
        pump,
        wave,
        feeder,
        lights,
    }
}

fn rig() -> Rig {
    rig_with(fast_settings(), Spy::new(), Spy::new())
}

#[rstest]
#[case(DeviceCommand::pump_speed(150), 150)]
#[case(DeviceCommand::pump_speed(-5), -5)]
#[case(DeviceCommand::lighting_intensity(101), 101)]
fn out_of_range_never_reaches_driver(#[case] cmd: DeviceCommand, #[case] value: i32) {
    let r = rig();
    let err = r.core.submit_command(cmd).unwrap_err();
    assert_eq!(
        err,
        CommandError::OutOfRange {
            target: cmd.target,
            value
        }
    );
    assert!(r.core.wait_idle(SETTLE));
    assert_eq!(r.pump.count() + r.lights.count(), 0);
    let state = r.core.device_state(cmd.target).unwrap();
    assert_eq!(state.commanded, None);
    assert_eq!(state.dispatches, 0);
}

#[test]
fn rejected_value_leaves_prior_state_untouched() {
    let r = rig();
    r.core.submit_command(DeviceCommand::pump_speed(40)).unwrap();
    assert!(r.core.wait_idle(SETTLE));

    assert!(matches!(
        r.core.submit_command(DeviceCommand::pump_speed(150)),
        Err(CommandError::OutOfRange { value: 150, .. })
    ));
    assert!(r.core.wait_idle(SETTLE));
    let state = r.core.device_state(Actuator::Pump).unwrap();
    assert_eq!(state.commanded, Some(Setpoint::Percent(40)));
    assert_eq!(state.confirmed, Some(Setpoint::Percent(40)));
    assert_eq!(state.dispatches, 1);
    assert_eq!(r.pump.calls(), vec![Call::Speed(40)]);
}

#[test]
fn clamp_policy_sends_clamped_value() {
    let mut settings = fast_settings();
    settings.policy = ValidationPolicy::Clamp;
    let r = rig_with(settings, Spy::new(), Spy::new());
    r.core.submit_command(DeviceCommand::pump_speed(150)).unwrap();
    assert!(r.core.wait_idle(SETTLE));
    assert_eq!(r.pump.calls(), vec![Call::Speed(100)]);
}

#[test]
fn slider_burst_collapses_to_last_value() {
    let r = rig();
    for p in [10, 20, 30, 40] {
        r.core.submit_command(DeviceCommand::pump_speed(p)).unwrap();
    }
    assert!(r.core.wait_idle(SETTLE));
    assert_eq!(r.pump.calls(), vec![Call::Speed(40)]);
    let state = r.core.device_state(Actuator::Pump).unwrap();
    assert_eq!(state.commanded, Some(Setpoint::Percent(40)));
    assert_eq!(state.confirmed, Some(Setpoint::Percent(40)));
    assert_eq!(state.dispatches, 1);
    assert!(!state.pending && !state.in_flight && !state.fault);
}

#[test]
fn wavemaker_toggle_within_window_sends_final_state() {
    let r = rig();
    r.core.submit_command(DeviceCommand::wavemaker(true)).unwrap();
    r.core.submit_command(DeviceCommand::wavemaker(false)).unwrap();
    assert!(r.core.wait_idle(SETTLE));
    assert_eq!(r.wave.calls(), vec![Call::Enabled(false)]);
}

#[test]
fn devices_debounce_independently() {
    let r = rig();
    r.core.submit_command(DeviceCommand::pump_speed(25)).unwrap();
    r.core
        .submit_command(DeviceCommand::lighting_intensity(80))
        .unwrap();
    r.core.submit_command(DeviceCommand::pump_speed(35)).unwrap();
    assert!(r.core.wait_idle(SETTLE));
    assert_eq!(r.pump.calls(), vec![Call::Speed(35)]);
    assert_eq!(r.lights.calls(), vec![Call::Intensity(80)]);
}

#[test]
fn value_arriving_during_slow_call_is_sent_after_it() {
    let r = rig_with(
        fast_settings(),
        Spy::new().with_delay(Duration::from_millis(150)),
        Spy::new(),
    );
    r.core.submit_command(DeviceCommand::pump_speed(10)).unwrap();
    // let the first call start, then pile up behind it
    std::thread::sleep(Duration::from_millis(80));
    for p in [20, 30, 60] {
        r.core.submit_command(DeviceCommand::pump_speed(p)).unwrap();
    }
    assert!(r.core.wait_idle(SETTLE));
    assert_eq!(r.pump.calls(), vec![Call::Speed(10), Call::Speed(60)]);
    assert_eq!(r.core.device_state(Actuator::Pump).unwrap().dispatches, 2);
}

#[test]
fn second_feed_while_first_in_flight_is_busy() {
    let r = rig_with(
        fast_settings(),
        Spy::new(),
        Spy::new().with_delay(Duration::from_millis(100)),
    );
    r.core.submit_command(DeviceCommand::feed()).unwrap();
    assert_eq!(
        r.core.submit_command(DeviceCommand::feed()),
        Err(CommandError::Busy(Actuator::Feeder))
    );
    assert!(r.core.wait_idle(SETTLE));
    assert_eq!(r.feeder.calls(), vec![Call::Dispense]);
    // acknowledged and no cycle configured: feeding is allowed again
    r.core.submit_command(DeviceCommand::feed()).unwrap();
    assert!(r.core.wait_idle(SETTLE));
    assert_eq!(r.feeder.count(), 2);
}

#[test]
fn feed_cycle_keeps_feeder_busy_after_ack() {
    let mut settings = fast_settings();
    settings.feed_cycle = Duration::from_secs(60);
    let r = rig_with(settings, Spy::new(), Spy::new());
    r.core.submit_command(DeviceCommand::feed()).unwrap();
    assert!(r.core.wait_idle(SETTLE));
    assert_eq!(
        r.core.submit_command(DeviceCommand::feed()),
        Err(CommandError::Busy(Actuator::Feeder))
    );
    assert_eq!(r.feeder.count(), 1);
}

#[test]
fn driver_failure_raises_fault_until_next_success() {
    let r = rig();
    r.lights.fail_next("i2c nack");
    r.core
        .submit_command(DeviceCommand::lighting_intensity(40))
        .unwrap();
    assert!(r.core.wait_idle(SETTLE));

    let faults = r.core.faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].kind, FaultKind::DriverError);
    assert_eq!(faults[0].device, Device::Lighting);
    let state = r.core.device_state(Actuator::Lighting).unwrap();
    assert!(state.fault);
    assert_eq!(state.confirmed, None);
    assert_eq!(r.core.health(), Health::Degraded { faults: 1 });

    r.core
        .submit_command(DeviceCommand::lighting_intensity(45))
        .unwrap();
    assert!(r.core.wait_idle(SETTLE));
    assert!(r.core.faults().is_empty());
    assert_eq!(
        r.core.device_state(Actuator::Lighting).unwrap().confirmed,
        Some(Setpoint::Percent(45))
    );
}

#[test]
fn slow_driver_raises_timeout_then_clears() {
    let mut settings = fast_settings();
    settings.debounce.actuation_timeout = Duration::from_millis(100);
    let r = rig_with(
        settings,
        Spy::new().with_delay(Duration::from_millis(400)),
        Spy::new(),
    );
    r.core.submit_command(DeviceCommand::pump_speed(70)).unwrap();

    std::thread::sleep(Duration::from_millis(300));
    let faults = r.core.faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].kind, FaultKind::Timeout);
    assert!(r.core.device_state(Actuator::Pump).unwrap().in_flight);

    // the call eventually succeeds, which clears the fault
    assert!(r.core.wait_idle(SETTLE));
    assert!(r.core.faults().is_empty());

    // later successful calls keep it cleared
    r.pump.set_delay(Duration::ZERO);
    r.core.submit_command(DeviceCommand::pump_speed(20)).unwrap();
    assert!(r.core.wait_idle(SETTLE));
    std::thread::sleep(Duration::from_millis(150));
    assert!(r.core.faults().is_empty());
    assert_eq!(
        r.core.device_state(Actuator::Pump).unwrap().confirmed,
        Some(Setpoint::Percent(20))
    );
}

#[test]
fn unattached_actuator_is_not_configured() {
    let core = ReefCore::builder()
        .with_pump(Spy::new())
        .with_settings(fast_settings())
        .with_power_monitor(ScriptedMonitor::default())
        .build()
        .unwrap();
    assert_eq!(core.actuators(), vec![Actuator::Pump]);
    assert_eq!(
        core.submit_command(DeviceCommand::feed()),
        Err(CommandError::NotConfigured(Actuator::Feeder))
    );
    assert!(core.device_state(Actuator::Feeder).is_none());
}

#[test]
fn commands_after_shutdown_are_closed() {
    let mut r = rig();
    r.core.submit_command(DeviceCommand::pump_speed(5)).unwrap();
    assert!(r.core.wait_idle(SETTLE));
    r.core.shutdown();
    assert_eq!(
        r.core.submit_command(DeviceCommand::pump_speed(6)),
        Err(CommandError::Closed)
    );
    // idempotent
    r.core.shutdown();
    assert_eq!(r.pump.calls(), vec![Call::Speed(5)]);
}
