//! Thread lifecycle: every thread the core starts is joined on shutdown.
//!
//! Verifies that:
//! - The telemetry thread stops when its handle is dropped
//! - Cores can be built and torn down repeatedly without hanging
//! - Shutdown waits for an in-flight driver call instead of abandoning it

use std::sync::Arc;
use std::time::{Duration, Instant};

use reef_core::faults::FaultMonitor;
use reef_core::mocks::{Call, NoopMonitor, ScriptedMonitor, Spy};
use reef_core::sampler::TelemetrySampler;
use reef_core::{CoreSettings, DeviceCommand, ReefCore, TelemetryCfg};
use reef_traits::MonotonicClock;

fn fast() -> TelemetryCfg {
    TelemetryCfg {
        period: Duration::from_millis(10),
        ..TelemetryCfg::default()
    }
}

#[test]
fn sampler_thread_exits_on_drop() {
    let faults = Arc::new(FaultMonitor::new(Duration::from_secs(10)));
    let monitor = ScriptedMonitor::default();
    let seen = monitor.clone();
    let sampler = TelemetrySampler::new(monitor, fast(), Arc::new(MonotonicClock::new()), faults);
    let handle = sampler.spawn().expect("spawn");
    std::thread::sleep(Duration::from_millis(50));
    assert!(handle.is_running());

    drop(handle);
    let reads = seen.reads();
    assert!(reads > 0);
    std::thread::sleep(Duration::from_millis(50));
    // nothing polls after the join
    assert_eq!(seen.reads(), reads);
}

#[test]
fn stop_interrupts_a_long_period() {
    let faults = Arc::new(FaultMonitor::new(Duration::from_secs(10)));
    let cfg = TelemetryCfg {
        period: Duration::from_secs(60),
        max_age: Duration::from_secs(60),
        ..TelemetryCfg::default()
    };
    let sampler = TelemetrySampler::new(NoopMonitor, cfg, Arc::new(MonotonicClock::new()), faults);
    let mut handle = sampler.spawn().expect("spawn");
    std::thread::sleep(Duration::from_millis(20));
    let t0 = Instant::now();
    handle.stop();
    assert!(t0.elapsed() < Duration::from_secs(5));
    assert!(!handle.is_running());
}

#[test]
fn multiple_cores_dont_leak_threads() {
    let mut settings = CoreSettings::default();
    settings.telemetry.period = Duration::from_millis(10);
    for _ in 0..10 {
        let core = ReefCore::builder()
            .with_pump(Spy::new())
            .with_lighting(Spy::new())
            .with_settings(settings.clone())
            .with_power_monitor(ScriptedMonitor::default())
            .build()
            .expect("core builds");
        std::thread::sleep(Duration::from_millis(5));
        let _ = core.telemetry();
        drop(core);
    }
    // Test passes if we reach here without hanging or panicking
}

#[test]
fn shutdown_waits_for_in_flight_call() {
    let mut settings = CoreSettings::default();
    settings.debounce.interval = Duration::ZERO;
    let pump = Spy::new().with_delay(Duration::from_millis(150));
    let mut core = ReefCore::builder()
        .with_pump(pump.clone())
        .with_settings(settings)
        .with_power_monitor(ScriptedMonitor::default())
        .build()
        .expect("core builds");
    core.submit_command(DeviceCommand::pump_speed(55)).unwrap();
    std::thread::sleep(Duration::from_millis(30));
    core.shutdown();
    assert_eq!(pump.calls(), vec![Call::Speed(55)]);
}

#[test]
fn stop_waits_out_a_hung_read_then_joins() {
    let faults = Arc::new(FaultMonitor::new(Duration::from_secs(10)));
    let cfg = TelemetryCfg {
        read_timeout: Duration::from_millis(50),
        ..fast()
    };
    let monitor = ScriptedMonitor::default().with_delay(Duration::from_millis(300));
    let sampler = TelemetrySampler::new(monitor, cfg, Arc::new(MonotonicClock::new()), faults);
    let feed = sampler.feed();
    let mut handle = sampler.spawn().expect("spawn");
    std::thread::sleep(Duration::from_millis(120));
    // the tick loop kept running while the driver was stuck
    assert!(feed.polls() >= 1);
    assert!(feed.snapshot().stale);

    let t0 = Instant::now();
    handle.stop();
    assert!(t0.elapsed() < Duration::from_secs(2));
    assert!(!handle.is_running());
}
