pub mod check;
pub mod config;
pub mod plan;
pub mod run;
pub mod version;

use anyhow::Context;
use deploy_core::config::Config;
use std::path::Path;

/// Load and validate the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::load_default().with_context(|| {
            format!(
                "Failed to load config from {}. Run `auto-deploy config --init` to create one.",
                Config::default_path().display()
            )
        }),
    }
}

/// `1m 05s` / `3.2s` style durations for tables.
pub fn format_duration(duration: Option<chrono::Duration>) -> String {
    let Some(duration) = duration else {
        return "-".into();
    };
    let millis = duration.num_milliseconds().max(0);
    if millis >= 60_000 {
        format!("{}m {:02}s", millis / 60_000, (millis % 60_000) / 1000)
    } else {
        format!("{:.1}s", millis as f64 / 1000.0)
    }
}
