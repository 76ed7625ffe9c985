//! Task kinds and how to rebuild them from their configuration

use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use lodestone_core::TaskConfig;

use crate::error::{TaskError, TaskResult};
use crate::root::RootTask;
use crate::task::Task;

/// Build dependency listing the task kinds a tree may be rebuilt from.
///
/// When present it must be an array of kind names; any other kind found in
/// the configuration is refused.
pub const ALLOWED_TASKS_DEP: &str = "tasks";

/// Builds a task of one kind from its configuration
pub trait TaskFactory: Send + Sync {
    fn build(&self, config: &TaskConfig, registry: &TaskRegistry) -> TaskResult<Box<dyn Task>>;
}

impl<F> TaskFactory for F
where
    F: Fn(&TaskConfig, &TaskRegistry) -> TaskResult<Box<dyn Task>> + Send + Sync,
{
    fn build(&self, config: &TaskConfig, registry: &TaskRegistry) -> TaskResult<Box<dyn Task>> {
        self(config, registry)
    }
}

/// Registered task kinds
#[derive(Default, Clone)]
pub struct TaskRegistry {
    factories: BTreeMap<String, Arc<dyn TaskFactory>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: TaskFactory + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build one task and, through its factory, its children
    pub fn build(&self, config: &TaskConfig) -> TaskResult<Box<dyn Task>> {
        let factory = self
            .factories
            .get(&config.task_id)
            .ok_or_else(|| TaskError::UnknownTask(config.task_id.clone()))?;
        factory.build(config, self)
    }

    pub fn build_children(&self, config: &TaskConfig) -> TaskResult<Vec<Box<dyn Task>>> {
        config.children.iter().map(|child| self.build(child)).collect()
    }

    /// Rebuild a whole tree from a root configuration
    pub fn rebuild(
        &self,
        config: &TaskConfig,
        build_deps: &JsonMap<String, JsonValue>,
    ) -> TaskResult<RootTask> {
        if !config.is_root() {
            return Err(TaskError::NotRoot(config.task_id.clone()));
        }
        if let Some(allowed) = allowed_kinds(build_deps)? {
            for child in &config.children {
                ensure_allowed(child, &allowed)?;
            }
        }
        RootTask::from_config(config, self)
    }
}

fn allowed_kinds(build_deps: &JsonMap<String, JsonValue>) -> TaskResult<Option<BTreeSet<String>>> {
    let Some(value) = build_deps.get(ALLOWED_TASKS_DEP) else {
        return Ok(None);
    };
    let kinds = value
        .as_array()
        .ok_or_else(|| TaskError::invalid("root", ALLOWED_TASKS_DEP, "expected an array of task kinds"))?;
    Ok(Some(
        kinds
            .iter()
            .filter_map(JsonValue::as_str)
            .map(str::to_string)
            .collect(),
    ))
}

fn ensure_allowed(config: &TaskConfig, allowed: &BTreeSet<String>) -> TaskResult<()> {
    if !allowed.contains(&config.task_id) {
        return Err(TaskError::NotAllowed(config.task_id.clone()));
    }
    config
        .children
        .iter()
        .try_for_each(|child| ensure_allowed(child, allowed))
}
