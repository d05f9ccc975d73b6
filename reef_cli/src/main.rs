use clap::Parser;
use eyre::WrapErr;
use std::io::IsTerminal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod app;
mod cli;
mod error_fmt;

use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};

fn main() {
    // Install color-eyre only when both stdout and stderr are terminals
    if std::io::stdout().is_terminal() && std::io::stderr().is_terminal() {
        let _ = color_eyre::install();
    }

    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run(cli) {
        let code = error_fmt::exit_code_for_error(&e);
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", error_fmt::format_error_json(&e));
        } else {
            eprintln!("{}", error_fmt::humanize(&e));
        }
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    let cfg = reef_config::load_file(&cli.config)
        .wrap_err_with(|| format!("load config {}", cli.config.display()))?;
    init_tracing(&cli, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
            .wrap_err("install Ctrl-C handler")?;
    }

    let mut core = app::build_core(&cfg)?;
    let out = app::Output { json: cli.json };
    let res = match cli.cmd {
        Commands::Pump { percent } => {
            app::set_and_report(&core, reef_core::DeviceCommand::pump_speed(percent), &out)
        }
        Commands::Lighting { percent } => app::set_and_report(
            &core,
            reef_core::DeviceCommand::lighting_intensity(percent),
            &out,
        ),
        Commands::Wavemaker { on, off } => {
            // clap's group guarantees exactly one of the two
            let enabled = on && !off;
            app::set_and_report(&core, reef_core::DeviceCommand::wavemaker(enabled), &out)
        }
        Commands::Feed => app::set_and_report(&core, reef_core::DeviceCommand::feed(), &out),
        Commands::Status => app::status(&core, &out),
        Commands::Monitor { seconds } => app::monitor(&core, &cfg, seconds, &stop, &out),
        Commands::SelfCheck => app::self_check(&core, &cfg, &out),
    };
    core.shutdown();
    res
}

fn init_tracing(cli: &Cli, logging: &reef_config::Logging) -> eyre::Result<()> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    // RUST_LOG wins; then --log-level; then [logging] level
    let level = if cli.log_level == "info" {
        logging.level.clone().unwrap_or_else(|| cli.log_level.clone())
    } else {
        cli.log_level.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    // Console logs go to stderr so stdout stays parseable
    let console = if cli.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name: {}", path.display()))?;
            let appender = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_writer(writer).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| eyre::eyre!("init tracing: {e}"))
}
