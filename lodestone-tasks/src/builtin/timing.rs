use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use lodestone_core::TaskConfig;

use super::{SLEEP, WAIT_FOR_FILE};
use crate::context::TaskContext;
use crate::error::{TaskError, TaskResult};
use crate::registry::TaskRegistry;
use crate::task::{task_path, CheckReport, Task};

const FILE_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct SleepTask {
    name: String,
    duration_ms: u64,
}

impl SleepTask {
    pub fn from_config(config: &TaskConfig, _registry: &TaskRegistry) -> TaskResult<Box<dyn Task>> {
        let duration_ms = match config.param("duration_ms") {
            None => return Err(TaskError::missing(&config.name, "duration_ms")),
            Some(value) => value.as_u64().ok_or_else(|| {
                TaskError::invalid(&config.name, "duration_ms", "expected milliseconds")
            })?,
        };
        Ok(Box::new(Self {
            name: config.name.clone(),
            duration_ms,
        }))
    }
}

impl Task for SleepTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        SLEEP
    }

    fn perform(&mut self, ctx: &TaskContext) -> TaskResult<()> {
        ctx.sleep(Duration::from_millis(self.duration_ms))
    }

    fn to_config(&self) -> TaskConfig {
        TaskConfig::new(SLEEP, &self.name).with_param("duration_ms", self.duration_ms)
    }
}

/// Blocks until a file appears.
///
/// When `marker` is given that file is created as soon as the task starts
/// waiting, which lets an outside party synchronise with the run.
pub struct WaitForFileTask {
    name: String,
    path: PathBuf,
    marker: Option<PathBuf>,
}

impl WaitForFileTask {
    pub fn from_config(config: &TaskConfig, _registry: &TaskRegistry) -> TaskResult<Box<dyn Task>> {
        let path = config
            .str_param("path")
            .ok_or_else(|| TaskError::missing(&config.name, "path"))?;
        let marker = match config.param("marker") {
            None => None,
            Some(value) => Some(value.as_str().ok_or_else(|| {
                TaskError::invalid(&config.name, "marker", "expected a file path")
            })?),
        };
        Ok(Box::new(Self {
            name: config.name.clone(),
            path: PathBuf::from(path),
            marker: marker.map(PathBuf::from),
        }))
    }
}

impl Task for WaitForFileTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        WAIT_FOR_FILE
    }

    fn check(&self, _ctx: &TaskContext, parent: &str, report: &mut CheckReport) {
        let parent_dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = parent_dir {
            if !dir.is_dir() {
                report.fail(
                    task_path(parent, &self.name),
                    format!("Directory {} does not exist", dir.display()),
                );
            }
        }
    }

    fn perform(&mut self, ctx: &TaskContext) -> TaskResult<()> {
        if let Some(marker) = &self.marker {
            fs::write(marker, b"")?;
        }
        log::debug!("Waiting for {}", self.path.display());
        while !self.path.exists() {
            ctx.sleep(FILE_POLL_INTERVAL)?;
        }
        Ok(())
    }

    fn to_config(&self) -> TaskConfig {
        let mut config = TaskConfig::new(WAIT_FOR_FILE, &self.name)
            .with_param("path", self.path.to_string_lossy().into_owned());
        if let Some(marker) = &self.marker {
            config = config.with_param("marker", marker.to_string_lossy().into_owned());
        }
        config
    }
}
