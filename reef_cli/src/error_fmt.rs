//! Human-readable error descriptions and structured JSON error formatting.

use reef_core::{BuildError, CommandError, CoreError};

/// Whole error chain on one line, outermost context first.
fn chain_text(err: &eyre::Report) -> String {
    err.chain()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingPowerMonitor => {
                "What happened: No power monitor was attached to the controller.\nLikely causes: The INA219 driver failed to initialize or was not wired into the builder.\nHow to fix: Make sure the power monitor is created and passed via with_power_monitor(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid controller settings ({msg}).\nLikely causes: A zero period or timeout, or max_age shorter than the poll period.\nHow to fix: Edit [debounce]/[telemetry]/[faults] in the config, then rerun."
            ),
            BuildError::Spawn(what) => format!(
                "What happened: Could not start the {what} thread.\nLikely causes: The system is out of threads or memory.\nHow to fix: Free resources and rerun."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<CommandError>() {
        return match ce {
            CommandError::OutOfRange { target, value } => format!(
                "What happened: {target} value {value} is out of range.\nLikely causes: Percentages must be between 0 and 100.\nHow to fix: Pass a value in 0..=100, or set [validation] policy = \"clamp\"."
            ),
            CommandError::InvalidCommand { target, .. } => format!(
                "What happened: {target} does not accept that kind of value.\nLikely causes: A switch value was sent to a percentage device or the other way around.\nHow to fix: Use the matching subcommand for {target}."
            ),
            CommandError::Busy(target) => format!(
                "What happened: The {target} is busy.\nLikely causes: A previous feed cycle is still running.\nHow to fix: Wait for the cycle to finish (see [devices] feed_cycle_ms) and try again."
            ),
            CommandError::NotConfigured(target) => format!(
                "What happened: The {target} is not attached.\nLikely causes: It is disabled under [devices] in the config.\nHow to fix: Set {target} = true under [devices] if the hardware is present."
            ),
            CommandError::Closed => {
                "What happened: The controller was already shut down.\nLikely causes: The command raced with Ctrl-C.\nHow to fix: Rerun the command.".to_string()
            }
        };
    }

    if let Some(de) = err.downcast_ref::<CoreError>() {
        let context = err.to_string();
        return match de {
            CoreError::Timeout if context.contains("telemetry") => {
                "What happened: Power monitor telemetry is stale.\nLikely causes: INA219 not wired, wrong I2C address, or the read timeout is too low.\nHow to fix: Check [pins] i2c_bus and ina219_*_addr, and consider raising telemetry.read_timeout_ms.".to_string()
            }
            CoreError::Timeout => {
                "What happened: A device did not answer in time.\nLikely causes: Driver hung, bus contention, or debounce.actuation_timeout_ms too low.\nHow to fix: Check wiring and consider raising debounce.actuation_timeout_ms.".to_string()
            }
            _ => format!(
                "What happened: {}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail.",
                chain_text(err)
            ),
        };
    }

    // String heuristics for errors from config loading and driver init
    let msg = chain_text(err);
    let lower = msg.to_ascii_lowercase();

    if lower.contains("invalid configuration") || lower.contains("must be") {
        return format!(
            "What happened: Configuration is invalid or incomplete.\nLikely causes: A zero period, a max_age shorter than the poll period, or a TOML syntax error.\nHow to fix: Edit the TOML config and try again. Details: {msg}"
        );
    }

    if lower.contains("pwm pin") || lower.contains("relay pin") || lower.contains("ina219") {
        return format!(
            "What happened: Failed to initialize hardware.\nLikely causes: Incorrect pin numbers, I2C disabled, or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config and check permissions. Details: {msg}"
        );
    }

    format!(
        "Something went wrong: {msg}\nHow to fix: Re-run with --log-level=debug for details."
    )
}

/// Stable name for the error category, used in JSON output.
fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(ce) = err.downcast_ref::<CommandError>() {
        return match ce {
            CommandError::OutOfRange { .. } => "OutOfRange",
            CommandError::InvalidCommand { .. } => "InvalidCommand",
            CommandError::Busy(_) => "Busy",
            CommandError::NotConfigured(_) => "NotConfigured",
            CommandError::Closed => "Closed",
        };
    }
    if let Some(de) = err.downcast_ref::<CoreError>() {
        return match de {
            CoreError::Timeout => "Timeout",
            CoreError::OutOfRange(_) => "DeviceOutOfRange",
            _ => "DeviceFault",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    "Error"
}

/// Exit codes: 1 generic, 2 usage (clap), 3 rejected value, 4 busy,
/// 5 device not configured, 6 device fault or timeout.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ce) = err.downcast_ref::<CommandError>() {
        return match ce {
            CommandError::OutOfRange { .. } | CommandError::InvalidCommand { .. } => 3,
            CommandError::Busy(_) => 4,
            CommandError::NotConfigured(_) => 5,
            CommandError::Closed => 1,
        };
    }
    if err.downcast_ref::<CoreError>().is_some() {
        return 6;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({ "reason": reason_name(err), "message": humanize(err) }).to_string()
}
