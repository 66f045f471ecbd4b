use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "auto-deploy")]
#[command(about = "Unattended software installation across a fleet of nodes", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.config/auto-deploy/deploy.yml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy every configured software entry to every node
    Run {
        /// Run playbooks in check mode without changing the nodes
        #[arg(long)]
        dry_run: bool,

        /// Directory for the JSON run report (default: <data_dir>/reports)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Print the final summary as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Run pre-installation checks against every node
    Check {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the nodes and software that would be deployed
    Plan {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show or initialize the configuration file
    Config {
        /// Print the config file path
        #[arg(long)]
        path: bool,

        /// Write a sample config if none exists
        #[arg(long)]
        init: bool,

        /// Print the sample config to stdout
        #[arg(long)]
        sample: bool,
    },

    /// Output version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    use Commands::*;

    match cli.command {
        Run { dry_run, report, json } => {
            let config = commands::load_config(config_path)?;
            logging::init(&config.log)?;
            let failed = commands::run::run(&config, dry_run, report, json).await?;
            if failed {
                std::process::exit(1);
            }
        }
        Check { json } => {
            let config = commands::load_config(config_path)?;
            logging::init(&config.log)?;
            if commands::check::run(&config, json).await? {
                std::process::exit(1);
            }
        }
        Plan { json } => {
            let config = commands::load_config(config_path)?;
            commands::plan::run(&config, json)?;
        }
        Config { path, init, sample } => {
            commands::config::run(config_path, path, init, sample)?;
        }
        Version => commands::version::run(),
    }

    Ok(())
}
