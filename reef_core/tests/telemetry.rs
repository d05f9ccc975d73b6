//! Telemetry staleness and power monitor faults, driven by a manual clock.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use reef_core::mocks::ScriptedMonitor;
use reef_core::{CoreSettings, Device, FaultKind, Health, ReefCore, SamplerState};
use reef_traits::clock::TestClock;

const WAIT: Duration = Duration::from_secs(3);

fn settings() -> CoreSettings {
    let mut s = CoreSettings::default();
    s.telemetry.period = Duration::from_millis(10);
    s
}

fn start(monitor: ScriptedMonitor, clock: &TestClock) -> ReefCore {
    ReefCore::builder()
        .with_settings(settings())
        .with_clock(Arc::new(clock.clone()))
        .with_power_monitor(monitor)
        .build()
        .expect("core builds")
}

/// Block (wall clock) until the sampler completes `n` more polls.
fn polls(core: &ReefCore, n: u64) {
    let target = core.telemetry_polls() + n;
    let deadline = Instant::now() + WAIT;
    while core.telemetry_polls() < target {
        assert!(Instant::now() < deadline, "sampler stopped polling");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn fresh_sample_is_not_stale() {
    let clock = TestClock::new();
    let core = start(ScriptedMonitor::default(), &clock);
    polls(&core, 2);
    let snap = core.telemetry();
    assert!(!snap.stale);
    let sample = snap.sample.expect("sample");
    assert!((sample.load_voltage - 12.6).abs() < f32::EPSILON);
    assert_eq!(core.health(), Health::Nominal);
}

#[test]
fn failed_reads_keep_last_sample_and_mark_stale() {
    let clock = TestClock::new();
    let monitor = ScriptedMonitor::default();
    let fail = monitor.failure_switch();
    let core = start(monitor, &clock);
    polls(&core, 1);
    let good = core.telemetry().sample.expect("sample");

    fail.store(true, Ordering::Release);
    clock.advance(Duration::from_secs(6));
    polls(&core, 2);

    let snap = core.telemetry();
    assert!(snap.stale);
    assert_eq!(snap.state, SamplerState::Stale);
    assert_eq!(snap.sample, Some(good));
    assert!(snap.age.expect("age") >= Duration::from_secs(6));
    // timeouts alone do not fault inside the grace period
    assert!(core.faults().is_empty());
}

#[test]
fn stale_past_grace_raises_power_monitor_timeout_and_recovers() {
    let clock = TestClock::new();
    let monitor = ScriptedMonitor::default();
    let fail = monitor.failure_switch();
    let core = start(monitor, &clock);
    polls(&core, 1);

    fail.store(true, Ordering::Release);
    polls(&core, 2);
    assert!(core.faults().is_empty());

    clock.advance(Duration::from_secs(11));
    polls(&core, 2);
    let faults = core.faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].device, Device::PowerMonitor);
    assert_eq!(faults[0].kind, FaultKind::Timeout);
    assert!(matches!(core.health(), Health::Degraded { faults: 1 }));

    fail.store(false, Ordering::Release);
    polls(&core, 2);
    assert!(core.faults().is_empty());
    assert!(!core.telemetry().stale);
}

#[test]
fn sample_older_than_max_age_is_stale_even_without_failures() {
    let clock = TestClock::new();
    let mut s = settings();
    // long period so no poll lands while we look
    s.telemetry.period = Duration::from_secs(30);
    s.telemetry.max_age = Duration::from_secs(30);
    let core = ReefCore::builder()
        .with_settings(s)
        .with_clock(Arc::new(clock.clone()))
        .with_power_monitor(ScriptedMonitor::default())
        .build()
        .expect("core builds");
    // the first poll runs as soon as the thread starts
    let deadline = Instant::now() + WAIT;
    while core.telemetry_polls() == 0 {
        assert!(Instant::now() < deadline, "sampler never polled");
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(!core.telemetry().stale);
    clock.advance(Duration::from_secs(31));
    let snap = core.telemetry();
    assert!(snap.stale);
    assert_eq!(snap.state, SamplerState::Idle);
}

#[test]
fn hung_read_goes_stale_and_faults_after_grace() {
    let mut s = settings();
    s.telemetry.period = Duration::from_millis(20);
    s.telemetry.read_timeout = Duration::from_millis(100);
    s.faults.stale_grace = Duration::from_millis(300);
    // real clock: the driver ignores its timeout and sleeps far past it
    let core = ReefCore::builder()
        .with_settings(s)
        .with_power_monitor(ScriptedMonitor::default().with_delay(Duration::from_millis(1500)))
        .build()
        .expect("core builds");

    let deadline = Instant::now() + WAIT;
    while core.faults().is_empty() {
        assert!(Instant::now() < deadline, "no fault while the read hangs");
        std::thread::sleep(Duration::from_millis(10));
    }
    let faults = core.faults();
    assert_eq!(faults[0].device, Device::PowerMonitor);
    assert_eq!(faults[0].kind, FaultKind::Timeout);

    let snap = core.telemetry();
    assert_eq!(snap.state, SamplerState::Stale);
    assert!(snap.stale);
    assert!(snap.sample.is_none());
}
