use anyhow::Context;
use deploy_core::config::LogConfig;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Log to stderr and append to `<log.dir>/deploy.log`.
/// `RUST_LOG` overrides the configured level.
pub fn init(log: &LogConfig) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(&log.dir)
        .with_context(|| format!("Failed to create log directory {}", log.dir.display()))?;
    let path = log.dir.join("deploy.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log.level.as_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(path)
}
