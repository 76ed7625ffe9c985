use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use uuid::Uuid;

use lodestone_config::LodestoneConfig;
use lodestone_core::{ConfiguredTree, ExecutionDescriptor};
use lodestone_engine::{ChannelObserver, ProcessEngine};

use super::{load_task_file, print_errors};
use crate::cli::RunArgs;

/// Run a task tree in a worker process, printing observed entries as they
/// change.
///
/// The first Ctrl-C asks the tree to stop after the current task, the second
/// one kills the worker.
pub async fn run_command(config: &LodestoneConfig, worker_level: &str, args: RunArgs) -> Result<()> {
    let task = load_task_file(&args.task_file)?;
    let id = args.id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut descriptor = ExecutionDescriptor::new(id.clone(), Arc::new(ConfiguredTree::new(task)))
        .with_checks(!args.skip_checks);
    for entry in args.observe {
        descriptor = descriptor.observe(entry);
    }

    let engine = Arc::new(
        ProcessEngine::new(config.engine.clone()).with_worker_level(worker_level),
    );
    let (observer, mut updates) = ChannelObserver::channel();
    engine.attach_monitor(Some(Arc::new(observer)));
    let printer = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            println!("{} = {}", update.path, update.value);
        }
    });

    let interrupts = {
        let engine = engine.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("Interrupted, stopping after the current task (Ctrl-C again to force)");
            engine.stop(false).await;

            if signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("Interrupted again, terminating the worker");
            engine.stop(true).await;
        })
    };

    info!("Running execution '{}'", id);
    let outcome = engine.perform(&descriptor).await;
    interrupts.abort();
    engine.shutdown(false).await;
    engine.attach_monitor(None);
    let _ = printer.await;

    let result = outcome?;
    if let Some(failure) = result.engine_error() {
        bail!("Execution '{}' failed in the engine: {}", id, failure);
    }
    if !result.success {
        if result.errors.is_empty() {
            bail!("Execution '{}' was stopped", id);
        }
        eprintln!("Execution '{}' failed:", id);
        print_errors(&result.errors);
        bail!("Execution '{}' failed", id);
    }

    println!("Execution '{}' succeeded", id);
    Ok(())
}
