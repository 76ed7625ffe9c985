//! CLI argument parsing definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use lodestone_engine::WorkerArgs;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Run as worker process (internal use)
    #[arg(long, hide = true)]
    pub worker: bool,

    #[command(flatten)]
    pub worker_args: WorkerArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a task tree in a worker process
    Run(RunArgs),

    /// Check a task tree without running it
    Check {
        /// YAML file holding the root task configuration
        #[arg(value_name = "TASK_FILE")]
        task_file: PathBuf,
    },

    /// List the task kinds that can be rebuilt
    Tasks,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// YAML file holding the root task configuration
    #[arg(value_name = "TASK_FILE")]
    pub task_file: PathBuf,

    /// Execution id, also used to name the run log (random when omitted)
    #[arg(long, value_name = "ID")]
    pub id: Option<String>,

    /// Database entry to print whenever it changes (repeatable)
    #[arg(long, value_name = "ENTRY")]
    pub observe: Vec<String>,

    /// Run the tree without checking it first
    #[arg(long)]
    pub skip_checks: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_command_line() {
        let cli = Cli::try_parse_from([
            "lodestone",
            "--worker",
            "--signals",
            "/tmp/signals",
            "--poll-interval-ms",
            "20",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert!(cli.worker);
        assert!(cli.command.is_none());
        let options = cli.worker_args.into_options(cli.log_level).unwrap();
        assert_eq!(options.signals, PathBuf::from("/tmp/signals"));
        assert_eq!(options.poll_interval.as_millis(), 20);
        assert_eq!(options.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "lodestone",
            "run",
            "sweep.yaml",
            "--observe",
            "voltage",
            "--observe",
            "current",
            "--skip-checks",
            "--log-level",
            "warn",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("warn"));
        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.task_file, PathBuf::from("sweep.yaml"));
                assert_eq!(args.observe, vec!["voltage", "current"]);
                assert!(args.skip_checks);
                assert!(args.id.is_none());
            }
            _ => panic!("expected the run command"),
        }
    }
}
