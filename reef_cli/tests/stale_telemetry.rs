use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

#[rstest]
fn failing_power_monitor_fails_self_check() {
    let dir = tempdir().unwrap();
    let toml = r#"
[telemetry]
period_ms = 20
read_timeout_ms = 20
max_age_ms = 200
"#;
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, toml).unwrap();

    let mut cmd = Command::cargo_bin("reef").unwrap();
    cmd.env("REEF_SIM_POWER_FAIL", "1");
    cmd.arg("--config").arg(&cfg).arg("self-check");
    cmd.assert()
        .code(6)
        .stderr(predicate::str::contains(
            "What happened: Power monitor telemetry is stale",
        ));
}

#[rstest]
fn failing_power_monitor_still_allows_commands() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, "[telemetry]\nperiod_ms = 20\nmax_age_ms = 200\n").unwrap();

    let mut cmd = Command::cargo_bin("reef").unwrap();
    cmd.env("REEF_SIM_POWER_FAIL", "1");
    cmd.arg("--config")
        .arg(&cfg)
        .arg("lighting")
        .arg("--percent")
        .arg("30");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("confirmed 30%"));
}
