//! Standalone worker process for the Lodestone engine

use anyhow::{bail, Result};
use clap::Parser;

use lodestone_engine::{worker_main, WorkerArgs};
use lodestone_tasks::builtin_registry;

#[derive(Parser, Debug)]
#[command(name = "lodestone-worker")]
#[command(about = "Runs Lodestone task trees submitted by an engine")]
#[command(version)]
struct Cli {
    /// Accepted for compatibility with the default worker arguments
    #[arg(long, hide = true)]
    worker: bool,

    /// Log filter for records relayed to the engine
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(flatten)]
    worker_args: WorkerArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let Some(options) = cli.worker_args.into_options(cli.log_level) else {
        bail!("--signals is required");
    };

    let status = worker_main(options, builtin_registry()).await;
    // Blocking stdin reads would otherwise hold up runtime shutdown
    std::process::exit(status);
}
