//! Serialized task tree configuration

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::Path;

/// Kind identifier of the task at the top of every tree
pub const ROOT_TASK_KIND: &str = "lodestone.Root";

/// Parameter of the root task naming its working directory
pub const DEFAULT_PATH_PARAM: &str = "default_path";

/// Wire form of a task tree.
///
/// Every node carries the registered kind used to rebuild it, its name, its
/// own parameters and its children. Rebuilding a configuration produced by a
/// tree yields a tree that behaves the same when executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub task_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TaskConfig>,
    #[serde(flatten)]
    pub params: JsonMap<String, JsonValue>,
}

impl TaskConfig {
    pub fn new(task_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            name: name.into(),
            children: Vec::new(),
            params: JsonMap::new(),
        }
    }

    /// Configuration of an empty root task working in `default_path`
    pub fn root(default_path: impl AsRef<Path>) -> Self {
        Self::new(ROOT_TASK_KIND, "root").with_param(
            DEFAULT_PATH_PARAM,
            default_path.as_ref().to_string_lossy().into_owned(),
        )
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: TaskConfig) -> Self {
        self.children.push(child);
        self
    }

    pub fn param(&self, key: &str) -> Option<&JsonValue> {
        self.params.get(key)
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(JsonValue::as_str)
    }

    pub fn u64_param(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(JsonValue::as_u64)
    }

    pub fn is_root(&self) -> bool {
        self.task_id == ROOT_TASK_KIND
    }

    /// Working directory of a root configuration
    pub fn default_path(&self) -> Option<&str> {
        self.str_param(DEFAULT_PATH_PARAM)
    }
}

/// What the engine needs from a task tree on the controller side.
pub trait TaskTreeHandle: Send + Sync {
    /// Name of the tree, used for the per-run log file
    fn name(&self) -> &str;

    /// Configuration from which the worker rebuilds the tree
    fn serialize(&self) -> TaskConfig;

    /// Root-level database values to seed into the rebuilt tree
    fn root_values(&self) -> BTreeMap<String, JsonValue>;
}

/// A task tree known only through its configuration, such as one loaded
/// from a file.
#[derive(Debug, Clone)]
pub struct ConfiguredTree {
    config: TaskConfig,
    initial_values: BTreeMap<String, JsonValue>,
}

impl ConfiguredTree {
    pub fn new(config: TaskConfig) -> Self {
        Self {
            config,
            initial_values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, entry: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.initial_values.insert(entry.into(), value.into());
        self
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }
}

impl TaskTreeHandle for ConfiguredTree {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn serialize(&self) -> TaskConfig {
        self.config.clone()
    }

    fn root_values(&self) -> BTreeMap<String, JsonValue> {
        let mut values = self.initial_values.clone();
        if let Some(path) = self.config.default_path() {
            values
                .entry(DEFAULT_PATH_PARAM.to_string())
                .or_insert_with(|| JsonValue::String(path.to_string()));
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_are_flattened() {
        let config = TaskConfig::new("lodestone.Sleep", "pause")
            .with_param("duration_ms", 250);

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["task_id"], json!("lodestone.Sleep"));
        assert_eq!(value["duration_ms"], json!(250));
        assert!(value.get("children").is_none());
    }

    #[test]
    fn test_yaml_tree() {
        let yaml = r#"
task_id: lodestone.Root
name: root
default_path: /data/run
children:
  - task_id: lodestone.Loop
    name: sweep
    count: 3
    children:
      - task_id: lodestone.SetValue
        name: set
        entry: value
        value: 1.5
"#;
        let config: TaskConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.is_root());
        assert_eq!(config.default_path(), Some("/data/run"));
        assert_eq!(config.children.len(), 1);

        let sweep = &config.children[0];
        assert_eq!(sweep.u64_param("count"), Some(3));
        assert_eq!(sweep.children[0].str_param("entry"), Some("value"));
        assert!(sweep.params.get("children").is_none());
    }

    #[test]
    fn test_configured_tree_seeds_default_path() {
        let tree = ConfiguredTree::new(TaskConfig::root("/data/run")).with_value("gain", 2);
        let values = tree.root_values();
        assert_eq!(values["default_path"], json!("/data/run"));
        assert_eq!(values["gain"], json!(2));
        assert_eq!(tree.name(), "root");
    }
}
