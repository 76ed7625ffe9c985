use anyhow::{bail, Context, Result};
use serde_json::Map as JsonMap;
use std::path::Path;
use tracing::info;

use lodestone_tasks::TaskRegistry;

use super::{load_task_file, print_errors};

/// Rebuild a task tree in this process and run its checks
pub fn check_command(registry: &TaskRegistry, task_file: &Path) -> Result<()> {
    let config = load_task_file(task_file)?;
    let root = registry
        .rebuild(&config, &JsonMap::new())
        .context("Failed to build task tree")?;
    info!("Checking task tree '{}'", root.name());

    let (ok, errors) = root.check();
    if !ok {
        eprintln!("Checks failed:");
        print_errors(&errors);
        bail!("{} check(s) failed", errors.len());
    }

    println!("Checks passed");
    Ok(())
}
