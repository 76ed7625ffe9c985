//! CLI command implementations

pub mod check;
pub mod run;
pub mod tasks;

pub use check::*;
pub use run::*;
pub use tasks::*;

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

use lodestone_core::TaskConfig;

/// Read a root task configuration from a YAML file
pub fn load_task_file(path: &Path) -> Result<TaskConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read task file {:?}", path))?;
    let config: TaskConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse task file {:?}", path))?;
    if !config.is_root() {
        bail!(
            "Task file {:?} must hold a root task, found '{}'",
            path,
            config.task_id
        );
    }
    Ok(config)
}

fn print_errors(errors: &BTreeMap<String, String>) {
    for (path, message) in errors {
        eprintln!("  {}: {}", path, message);
    }
}
