//! Top of every task tree

use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use lodestone_core::{
    ControlSignals, TaskConfig, TaskTreeHandle, DEFAULT_PATH_PARAM, ROOT_TASK_KIND,
};

use crate::context::TaskContext;
use crate::database::TaskDatabase;
use crate::error::{TaskError, TaskResult};
use crate::registry::TaskRegistry;
use crate::task::{check_children, task_path, CheckReport, Task};

/// Root of a rebuilt task tree.
///
/// Owns the tree database and the execution context its children run in.
/// Errors are keyed by task path, starting with the root name.
pub struct RootTask {
    name: String,
    default_path: PathBuf,
    children: Vec<Box<dyn Task>>,
    ctx: TaskContext,
}

impl RootTask {
    pub fn from_config(config: &TaskConfig, registry: &TaskRegistry) -> TaskResult<Self> {
        let default_path = config
            .default_path()
            .ok_or_else(|| TaskError::missing(&config.name, DEFAULT_PATH_PARAM))?;

        Ok(Self {
            name: config.name.clone(),
            default_path: PathBuf::from(default_path),
            children: registry.build_children(config)?,
            ctx: TaskContext::new(TaskDatabase::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_path(&self) -> &Path {
        &self.default_path
    }

    pub fn database(&self) -> &TaskDatabase {
        &self.ctx.database
    }

    pub fn context_mut(&mut self) -> &mut TaskContext {
        &mut self.ctx
    }

    /// Write initial values into the database
    pub fn seed(&self, values: impl IntoIterator<Item = (String, JsonValue)>) {
        for (entry, value) in values {
            self.ctx.database.write(entry, value);
        }
    }

    pub fn attach_runtime(&mut self, runtime: JsonMap<String, JsonValue>) {
        self.ctx.set_runtime(runtime);
    }

    pub fn attach_signals(&mut self, signals: ControlSignals) {
        self.ctx.set_signals(signals);
    }

    pub fn set_stdout(&mut self, stdout: Box<dyn Write + Send>) {
        self.ctx.set_stdout(stdout);
    }

    fn publish_default_path(&self) {
        self.ctx.database.write(
            DEFAULT_PATH_PARAM,
            self.default_path.to_string_lossy().into_owned(),
        );
    }

    /// Validate the whole tree without running it
    pub fn check(&self) -> (bool, BTreeMap<String, String>) {
        let mut report = CheckReport::new();
        if !self.default_path.is_dir() {
            report.fail(
                self.name.clone(),
                format!(
                    "default_path '{}' is not a directory",
                    self.default_path.display()
                ),
            );
        }
        self.publish_default_path();
        check_children(&self.children, &self.ctx, &self.name, &mut report);

        (report.is_ok(), report.into_errors())
    }

    /// Run every child in order.
    ///
    /// Stops at the first failing child. A stop request makes the outcome
    /// unsuccessful without adding an error.
    pub fn perform(&mut self) -> (bool, BTreeMap<String, String>) {
        self.publish_default_path();

        let mut errors = BTreeMap::new();
        let mut stopped = false;
        for child in self.children.iter_mut() {
            let outcome = self
                .ctx
                .checkpoint()
                .and_then(|()| child.perform(&self.ctx));
            match outcome {
                Ok(()) => {}
                Err(TaskError::Stopped) => {
                    log::info!("Execution of '{}' stopped", self.name);
                    stopped = true;
                    break;
                }
                Err(e) => {
                    log::error!("Task '{}' failed: {}", child.name(), e);
                    errors.insert(task_path(&self.name, child.name()), e.to_string());
                    break;
                }
            }
        }

        let success = errors.is_empty() && !stopped && !self.ctx.stop_requested();
        (success, errors)
    }

    pub fn to_config(&self) -> TaskConfig {
        let mut config = TaskConfig::root(&self.default_path);
        config.name = self.name.clone();
        config.children = self.children.iter().map(|c| c.to_config()).collect();
        config
    }
}

impl TaskTreeHandle for RootTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn serialize(&self) -> TaskConfig {
        self.to_config()
    }

    fn root_values(&self) -> BTreeMap<String, JsonValue> {
        self.ctx.database.snapshot()
    }
}

impl std::fmt::Debug for RootTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootTask")
            .field("kind", &ROOT_TASK_KIND)
            .field("name", &self.name)
            .field("default_path", &self.default_path)
            .field("children", &self.children.len())
            .finish()
    }
}
