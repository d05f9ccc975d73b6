//! Driver assembly and command execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use reef_core::{
    Actuator, CoreError, CoreSettings, Device, DeviceCommand, DeviceState, FaultKind, FaultRecord, Health,
    ReefCore, Setpoint, TelemetrySnapshot,
};
use serde_json::json;

/// Set to make the simulated power monitor fail every read.
pub const SIM_POWER_FAIL_ENV: &str = "REEF_SIM_POWER_FAIL";

pub struct Output {
    pub json: bool,
}

/// Assemble a `ReefCore` from config, with simulated drivers unless built
/// with the `hardware` feature.
pub fn build_core(cfg: &reef_config::Config) -> eyre::Result<ReefCore> {
    let settings = CoreSettings::from(cfg);
    let builder = ReefCore::builder().with_settings(settings);
    let builder = attach_drivers(builder, cfg)?;
    builder.build().wrap_err("start reef core")
}

#[cfg(not(feature = "hardware"))]
fn attach_drivers(
    mut b: reef_core::ReefCoreBuilder<reef_core::builder::Missing>,
    cfg: &reef_config::Config,
) -> eyre::Result<reef_core::ReefCoreBuilder<reef_core::builder::Set>> {
    use reef_hardware::{
        SimulatedFeeder, SimulatedLighting, SimulatedPowerMonitor, SimulatedPump,
        SimulatedWaveMaker,
    };
    use reef_traits::MonotonicClock;

    let d = &cfg.devices;
    if d.pump {
        b = b.with_pump(SimulatedPump::new());
    }
    if d.wavemaker {
        b = b.with_wavemaker(SimulatedWaveMaker::new());
    }
    if d.feeder {
        b = b.with_feeder(SimulatedFeeder::with_clock(
            Duration::from_millis(d.feed_cycle_ms),
            MonotonicClock::new(),
        ));
    }
    if d.lighting {
        b = b.with_lighting(SimulatedLighting::new());
    }
    let mut monitor = SimulatedPowerMonitor::new();
    if std::env::var(SIM_POWER_FAIL_ENV).is_ok_and(|v| v == "1") {
        tracing::warn!("simulated power monitor forced to fail");
        monitor = monitor.failing();
    }
    Ok(b.with_power_monitor(monitor))
}

#[cfg(feature = "hardware")]
fn attach_drivers(
    mut b: reef_core::ReefCoreBuilder<reef_core::builder::Missing>,
    cfg: &reef_config::Config,
) -> eyre::Result<reef_core::ReefCoreBuilder<reef_core::builder::Set>> {
    use reef_hardware::hardware::{
        Ina219Monitor, PwmLighting, PwmPump, RelayFeeder, RelayWaveMaker,
    };

    let (d, p) = (&cfg.devices, &cfg.pins);
    if d.pump {
        b = b.with_pump(PwmPump::new(p.pump_pwm).wrap_err("open pump pwm pin")?);
    }
    if d.wavemaker {
        b = b.with_wavemaker(
            RelayWaveMaker::new(p.wavemaker_relay, p.relay_active_low)
                .wrap_err("open wavemaker relay pin")?,
        );
    }
    if d.feeder {
        b = b.with_feeder(
            RelayFeeder::new(
                p.feeder_relay,
                Duration::from_millis(p.feeder_pulse_ms),
                Duration::from_millis(d.feed_cycle_ms),
            )
            .wrap_err("open feeder relay pin")?,
        );
    }
    if d.lighting {
        b = b.with_lighting(PwmLighting::new(p.lighting_pwm).wrap_err("open lighting pwm pin")?);
    }
    let monitor = Ina219Monitor::new(
        p.i2c_bus,
        p.ina219_pv_addr,
        p.ina219_load_addr,
        p.shunt_ohms,
    )
    .wrap_err("open ina219 power monitor")?;
    Ok(b.with_power_monitor(monitor))
}

/// Submit one command, wait for the driver to answer, and print the result.
/// A device left faulted by this command is an error.
pub fn set_and_report(core: &ReefCore, cmd: DeviceCommand, out: &Output) -> eyre::Result<()> {
    let target = cmd.target;
    core.submit_command(cmd)?;
    // Debounce window plus one full actuation timeout, with slack
    if !core.wait_idle(Duration::from_secs(5)) {
        return Err(eyre::Report::new(CoreError::Timeout))
            .wrap_err(format!("{target} did not acknowledge"));
    }
    let state = core
        .device_state(target)
        .ok_or_else(|| eyre::eyre!("{target} disappeared"))?;
    if let Some(fault) = core
        .faults()
        .into_iter()
        .find(|f| f.device == Device::from(target))
    {
        return Err(eyre::Report::new(fault_error(target, fault.kind)))
            .wrap_err(format!("{target} command failed"));
    }
    if out.json {
        println!("{}", device_json(target, &state));
    } else {
        println!("{}", device_line(target, &state));
    }
    Ok(())
}

fn fault_error(target: Actuator, kind: FaultKind) -> CoreError {
    match kind {
        FaultKind::Timeout => CoreError::Timeout,
        FaultKind::OutOfRange => CoreError::OutOfRange(target.to_string()),
        FaultKind::DriverError => CoreError::Driver(format!("{target} driver reported an error")),
    }
}

/// Wait for the first telemetry poll, then print everything the core knows.
pub fn status(core: &ReefCore, out: &Output) -> eyre::Result<()> {
    wait_first_poll(core, Duration::from_secs(3));
    let devices: Vec<(Actuator, DeviceState)> = core
        .actuators()
        .into_iter()
        .filter_map(|a| core.device_state(a).map(|s| (a, s)))
        .collect();
    let telemetry = core.telemetry();
    let faults = core.faults();
    let health = core.health();

    if out.json {
        let devs: Vec<_> = devices.iter().map(|(a, s)| device_json(*a, s)).collect();
        let v = json!({
            "health": health_name(health),
            "devices": devs,
            "telemetry": telemetry_json(&telemetry),
            "faults": faults.iter().map(fault_json).collect::<Vec<_>>(),
        });
        println!("{v}");
        return Ok(());
    }

    println!("health: {}", health_name(health));
    for (a, s) in &devices {
        println!("{}", device_line(*a, s));
    }
    println!("{}", telemetry_line(&telemetry));
    for f in &faults {
        println!("fault: {} {} (x{})", f.device, f.kind, f.occurrences);
    }
    Ok(())
}

/// Stream telemetry once per poll period.
pub fn monitor(
    core: &ReefCore,
    cfg: &reef_config::Config,
    seconds: u64,
    stop: &AtomicBool,
    out: &Output,
) -> eyre::Result<()> {
    let period = Duration::from_millis(cfg.telemetry.period_ms);
    // None runs until Ctrl-C, including when the end is past Instant's range
    let until = (seconds > 0)
        .then(|| Instant::now().checked_add(Duration::from_secs(seconds)))
        .flatten();
    tracing::info!(seconds, period_ms = cfg.telemetry.period_ms, "monitor start");
    wait_first_poll(core, period * 3);
    loop {
        let snap = core.telemetry();
        if out.json {
            let mut v = telemetry_json(&snap);
            v["health"] = json!(health_name(core.health()));
            println!("{v}");
        } else {
            println!("{}", telemetry_line(&snap));
        }
        if stop.load(Ordering::Relaxed) || until.is_some_and(|t| Instant::now() >= t) {
            break;
        }
        std::thread::sleep(period);
    }
    tracing::info!("monitor stop");
    Ok(())
}

/// Fail unless telemetry is fresh and no faults are active.
pub fn self_check(core: &ReefCore, cfg: &reef_config::Config, out: &Output) -> eyre::Result<()> {
    let budget = Duration::from_millis(
        cfg.telemetry
            .period_ms
            .saturating_add(cfg.telemetry.read_timeout_ms),
    );
    wait_first_poll(core, budget);
    let snap = core.telemetry();
    if snap.stale {
        return Err(eyre::Report::new(CoreError::Timeout)).wrap_err("power monitor telemetry stale");
    }
    if let Some(f) = core.faults().first() {
        return Err(eyre::Report::new(CoreError::State(format!(
            "{} {} fault active",
            f.device, f.kind
        ))));
    }
    if out.json {
        println!(
            "{}",
            json!({ "ok": true, "actuators": core.actuators().iter().map(|a| a.name()).collect::<Vec<_>>() })
        );
    } else {
        println!("ok");
    }
    Ok(())
}

fn wait_first_poll(core: &ReefCore, budget: Duration) {
    let deadline = Instant::now().checked_add(budget);
    while core.telemetry_polls() == 0 && deadline.is_none_or(|d| Instant::now() < d) {
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn health_name(h: Health) -> &'static str {
    match h {
        Health::Nominal => "nominal",
        Health::Degraded { .. } => "degraded",
    }
}

fn setpoint_json(sp: Option<Setpoint>) -> serde_json::Value {
    match sp {
        Some(Setpoint::Percent(p)) => json!(p),
        Some(Setpoint::Switch(on)) => json!(on),
        Some(Setpoint::Trigger) => json!("trigger"),
        None => serde_json::Value::Null,
    }
}

fn device_json(a: Actuator, s: &DeviceState) -> serde_json::Value {
    json!({
        "device": a.name(),
        "commanded": setpoint_json(s.commanded),
        "confirmed": setpoint_json(s.confirmed),
        "fault": s.fault,
        "dispatches": s.dispatches,
    })
}

fn device_line(a: Actuator, s: &DeviceState) -> String {
    let show = |sp: Option<Setpoint>| sp.map_or_else(|| "-".to_string(), |v| v.to_string());
    format!(
        "{a}: commanded {} confirmed {}{}",
        show(s.commanded),
        show(s.confirmed),
        if s.fault { " [FAULT]" } else { "" }
    )
}

fn telemetry_json(t: &TelemetrySnapshot) -> serde_json::Value {
    let s = t.sample;
    json!({
        "pv_voltage": s.map(|s| s.pv_voltage),
        "load_voltage": s.map(|s| s.load_voltage),
        "current": s.map(|s| s.current),
        "age_ms": t.age.map(reef_core::util::millis),
        "stale": t.stale,
    })
}

fn telemetry_line(t: &TelemetrySnapshot) -> String {
    match t.sample {
        Some(s) => format!(
            "telemetry: pv {:.2} V, load {:.2} V, {:.2} A{}",
            s.pv_voltage,
            s.load_voltage,
            s.current,
            if t.stale { " (stale)" } else { "" }
        ),
        None => "telemetry: no sample (stale)".to_string(),
    }
}

fn fault_json(f: &FaultRecord) -> serde_json::Value {
    json!({
        "device": f.device.name(),
        "kind": f.kind.name(),
        "occurrences": f.occurrences,
    })
}
