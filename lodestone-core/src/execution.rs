//! Execution descriptors and results

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::dependency::{Dependency, DependencyMap};
use crate::error::CoreError;
use crate::task::TaskTreeHandle;

/// Key under which engine-level failures are reported in [`ExecutionResult::errors`]
pub const ENGINE_ERROR_KEY: &str = "engine";

/// A request to execute one task tree in the worker process.
///
/// Built by the caller, then only read by the engine for the duration of a
/// single `perform` call.
#[derive(Clone)]
pub struct ExecutionDescriptor {
    pub id: String,
    pub task: Arc<dyn TaskTreeHandle>,
    pub build_deps: DependencyMap,
    pub runtime_deps: DependencyMap,
    pub observed_entries: BTreeSet<String>,
    pub run_checks: bool,
}

impl ExecutionDescriptor {
    pub fn new(id: impl Into<String>, task: Arc<dyn TaskTreeHandle>) -> Self {
        Self {
            id: id.into(),
            task,
            build_deps: DependencyMap::new(),
            runtime_deps: DependencyMap::new(),
            observed_entries: BTreeSet::new(),
            run_checks: true,
        }
    }

    pub fn with_build_dep<D>(mut self, key: impl Into<String>, value: D) -> Self
    where
        D: Dependency + 'static,
    {
        self.build_deps.insert(key.into(), Arc::new(value));
        self
    }

    pub fn with_runtime_dep<D>(mut self, key: impl Into<String>, value: D) -> Self
    where
        D: Dependency + 'static,
    {
        self.runtime_deps.insert(key.into(), Arc::new(value));
        self
    }

    /// Forward changes of a database entry to the monitor relay
    pub fn observe(mut self, entry: impl Into<String>) -> Self {
        self.observed_entries.insert(entry.into());
        self
    }

    pub fn with_checks(mut self, run_checks: bool) -> Self {
        self.run_checks = run_checks;
        self
    }
}

impl fmt::Debug for ExecutionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionDescriptor")
            .field("id", &self.id)
            .field("task", &self.task.name())
            .field("build_deps", &self.build_deps.keys().collect::<Vec<_>>())
            .field("runtime_deps", &self.runtime_deps.keys().collect::<Vec<_>>())
            .field("observed_entries", &self.observed_entries)
            .field("run_checks", &self.run_checks)
            .finish()
    }
}

/// Outcome of one `perform` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
}

impl ExecutionResult {
    pub fn new(success: bool, errors: BTreeMap<String, String>) -> Self {
        Self { success, errors }
    }

    /// A failed result carrying only an engine failure
    pub fn engine_failure(failure: EngineFailure) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(ENGINE_ERROR_KEY.to_string(), failure.as_str().to_string());
        Self {
            success: false,
            errors,
        }
    }

    /// The engine failure recorded in this result, if any
    pub fn engine_error(&self) -> Option<EngineFailure> {
        self.errors
            .get(ENGINE_ERROR_KEY)
            .and_then(|kind| kind.parse().ok())
    }
}

/// Failures detected by the engine itself, as opposed to failures reported
/// by the task tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineFailure {
    /// The submission could not be encoded; the worker was never involved
    Send,
    /// The worker exited or its pipe broke while a response was expected
    Dead,
    /// The worker was killed on request
    Terminated,
}

impl EngineFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineFailure::Send => "send",
            EngineFailure::Dead => "dead",
            EngineFailure::Terminated => "terminated",
        }
    }
}

impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineFailure {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send" => Ok(EngineFailure::Send),
            "dead" => Ok(EngineFailure::Dead),
            "terminated" => Ok(EngineFailure::Terminated),
            other => Err(CoreError::UnknownFailure(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ConfiguredTree, TaskConfig};

    #[test]
    fn test_engine_failure_result() {
        let result = ExecutionResult::engine_failure(EngineFailure::Dead);
        assert!(!result.success);
        assert_eq!(result.errors.get("engine").map(String::as_str), Some("dead"));
        assert_eq!(result.engine_error(), Some(EngineFailure::Dead));
    }

    #[test]
    fn test_task_errors_are_not_engine_errors() {
        let mut errors = BTreeMap::new();
        errors.insert("root/wait".to_string(), "trigger directory missing".to_string());
        let result = ExecutionResult::new(false, errors);
        assert_eq!(result.engine_error(), None);
    }

    #[test]
    fn test_failure_kind_parsing() {
        for kind in [EngineFailure::Send, EngineFailure::Dead, EngineFailure::Terminated] {
            assert_eq!(kind.as_str().parse::<EngineFailure>().unwrap(), kind);
        }
        assert!("crashed".parse::<EngineFailure>().is_err());
    }

    #[test]
    fn test_descriptor_builder() {
        let tree = Arc::new(ConfiguredTree::new(TaskConfig::root("/tmp")));
        let descriptor = ExecutionDescriptor::new("run-1", tree)
            .with_build_dep("tasks", vec!["lodestone.Sleep"])
            .with_runtime_dep("gain", 2.5)
            .observe("value")
            .with_checks(false);

        assert_eq!(descriptor.id, "run-1");
        assert!(descriptor.build_deps.contains_key("tasks"));
        assert!(descriptor.runtime_deps.contains_key("gain"));
        assert!(descriptor.observed_entries.contains("value"));
        assert!(!descriptor.run_checks);
        assert!(format!("{:?}", descriptor).contains("run-1"));
    }
}
