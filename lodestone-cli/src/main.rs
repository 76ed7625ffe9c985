use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use lodestone_config::{ConfigLoader, LodestoneConfig};
use lodestone_engine::worker_main;
use lodestone_logging::init_simple_tracing;
use lodestone_tasks::builtin_registry;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::{check_command, list_tasks, run_command};

/// Load configuration from file or use defaults
fn load_config(config_path: Option<&PathBuf>) -> Result<LodestoneConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) => {
            if path.exists() {
                loader
                    .from_file(path)
                    .context(format!("Failed to load configuration from {:?}", path))
            } else {
                warn!("Configuration file not found: {:?}. Using defaults.", path);
                loader
                    .from_env()
                    .context("Failed to load configuration from environment")
            }
        }
        None => {
            debug!("No configuration file specified. Loading from environment or defaults.");
            loader
                .from_env()
                .context("Failed to load configuration from environment")
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle worker mode first: stdout carries the protocol, so no console
    // logging may be set up
    if cli.worker {
        let Some(options) = cli.worker_args.into_options(cli.log_level) else {
            bail!("--signals is required in worker mode");
        };
        let status = worker_main(options, builtin_registry()).await;
        std::process::exit(status);
    }

    let config = load_config(cli.config.as_ref())?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.to_string());
    init_simple_tracing(&level)?;
    info!("Lodestone CLI starting");

    match cli.command {
        Some(Commands::Run(args)) => {
            let worker_level = cli
                .log_level
                .unwrap_or_else(|| config.logging.effective_worker_level().to_string());
            run_command(&config, &worker_level, args).await
        }
        Some(Commands::Check { task_file }) => check_command(&builtin_registry(), &task_file),
        Some(Commands::Tasks) => {
            list_tasks(&builtin_registry());
            Ok(())
        }
        None => {
            println!("No command specified. Use --help for usage information.");
            Ok(())
        }
    }
}
