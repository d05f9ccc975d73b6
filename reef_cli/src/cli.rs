//! CLI argument definitions and shared statics.

use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "reef", version, about = "Reef controller CLI")]
pub struct Cli {
    /// Path to config TOML; a missing file means built-in defaults
    #[arg(long, value_name = "FILE", default_value = "etc/reef.toml")]
    pub config: PathBuf,

    /// Log and print results as JSON lines instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Set the return pump speed
    Pump {
        /// Speed in percent (0..=100)
        #[arg(long, allow_negative_numbers = true)]
        percent: i32,
    },
    /// Set the LED intensity
    Lighting {
        /// Intensity in percent (0..=100)
        #[arg(long, allow_negative_numbers = true)]
        percent: i32,
    },
    /// Switch the wave maker on or off
    #[command(group(ArgGroup::new("state").required(true).args(["on", "off"])))]
    Wavemaker {
        #[arg(long, action = ArgAction::SetTrue)]
        on: bool,
        #[arg(long, action = ArgAction::SetTrue)]
        off: bool,
    },
    /// Trigger one feed cycle
    Feed,
    /// Print device states, telemetry and active faults
    Status,
    /// Print telemetry every period until the time is up or Ctrl-C
    Monitor {
        /// How long to run; 0 runs until interrupted
        #[arg(long, value_name = "SECS", default_value_t = 10)]
        seconds: u64,
    },
    /// Quick health check (drivers respond, telemetry fresh, no faults)
    SelfCheck,
}
