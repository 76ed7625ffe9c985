//! IPC protocol definitions and message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet};

use lodestone_core::{encode_dependencies, CoreResult, ExecutionDescriptor, TaskConfig};
use lodestone_logging::LogRecord;

/// IPC protocol version for compatibility checking
pub const IPC_PROTOCOL_VERSION: u32 = 1;

/// Prefix of every frame a worker writes to its stdout.
///
/// Lines without it were printed by something other than the protocol
/// writer and are relayed as log output.
pub const FRAME_MARKER: char = '\u{1e}';

/// One task tree execution request: configuration, resolved dependencies,
/// observed entries, initial database values and the checks flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSubmission {
    /// Execution id, also the stem of the per-run log file
    pub name: String,
    pub config: TaskConfig,
    #[serde(default)]
    pub build_deps: JsonMap<String, JsonValue>,
    #[serde(default)]
    pub runtime_deps: JsonMap<String, JsonValue>,
    #[serde(default)]
    pub observed_entries: BTreeSet<String>,
    #[serde(default)]
    pub initial_values: BTreeMap<String, JsonValue>,
    pub run_checks: bool,
}

impl TaskSubmission {
    /// Build the wire form of a descriptor.
    ///
    /// Fails without side effects when a dependency value has no wire form.
    pub fn from_descriptor(descriptor: &ExecutionDescriptor) -> CoreResult<Self> {
        let build_deps = encode_dependencies(&descriptor.build_deps)?;
        let runtime_deps = encode_dependencies(&descriptor.runtime_deps)?;

        Ok(Self {
            name: descriptor.id.clone(),
            config: descriptor.task.serialize(),
            build_deps,
            runtime_deps,
            observed_entries: descriptor.observed_entries.clone(),
            initial_values: descriptor.task.root_values(),
            run_checks: descriptor.run_checks,
        })
    }
}

/// Messages sent from the engine to its worker process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Execute a task tree
    Submit(TaskSubmission),
}

/// Messages sent from the worker process to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorMessage {
    /// Submission received, sent before any work starts
    Ack,

    /// Outcome of the checks or of the execution
    TaskResult {
        success: bool,
        #[serde(default)]
        errors: BTreeMap<String, String>,
    },

    /// Log record produced in the worker
    Log(LogRecord),

    /// No more log records will follow
    LogClosed,

    /// An observed database entry changed
    Monitor { path: String, value: JsonValue },

    /// The spy of the current run detached from the database
    SpyClosed,

    /// No more monitor updates will follow
    MonitorClosed,
}

/// Which consumer a worker message is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relay {
    /// The submit/acknowledge/result exchange
    Pipe,
    Log,
    Monitor,
}

impl CoordinatorMessage {
    pub fn relay(&self) -> Relay {
        match self {
            CoordinatorMessage::Ack | CoordinatorMessage::TaskResult { .. } => Relay::Pipe,
            CoordinatorMessage::Log(_) | CoordinatorMessage::LogClosed => Relay::Log,
            CoordinatorMessage::Monitor { .. }
            | CoordinatorMessage::SpyClosed
            | CoordinatorMessage::MonitorClosed => Relay::Monitor,
        }
    }
}

/// Message envelope for all IPC communications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub protocol_version: u32,
    pub timestamp: DateTime<Utc>,
    pub message: T,
}

impl<T> MessageEnvelope<T> {
    /// Create a new message envelope
    pub fn new(message: T) -> Self {
        Self {
            protocol_version: IPC_PROTOCOL_VERSION,
            timestamp: Utc::now(),
            message,
        }
    }

    /// Check if protocol version is compatible
    pub fn is_compatible(&self) -> bool {
        self.protocol_version == IPC_PROTOCOL_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_core::{ConfiguredTree, CoreError};
    use lodestone_logging::LogLevel;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn descriptor() -> ExecutionDescriptor {
        let tree = ConfiguredTree::new(
            TaskConfig::root("/data").with_child(
                TaskConfig::new("lodestone.SetValue", "set")
                    .with_param("entry", "value")
                    .with_param("value", 3),
            ),
        );
        ExecutionDescriptor::new("run", Arc::new(tree))
    }

    #[test]
    fn test_submission_from_descriptor() {
        let descriptor = descriptor()
            .with_runtime_dep("gain", 2.0)
            .observe("value")
            .with_checks(false);

        let submission = TaskSubmission::from_descriptor(&descriptor).unwrap();
        assert_eq!(submission.name, "run");
        assert_eq!(submission.config.children.len(), 1);
        assert_eq!(submission.runtime_deps["gain"], json!(2.0));
        assert_eq!(submission.initial_values["default_path"], json!("/data"));
        assert!(submission.observed_entries.contains("value"));
        assert!(!submission.run_checks);
    }

    #[test]
    fn test_unserializable_dependency_is_rejected() {
        let mut handle: HashMap<(u8, u8), u8> = HashMap::new();
        handle.insert((1, 2), 3);
        let descriptor = descriptor().with_runtime_dep("instrument", handle);

        assert!(matches!(
            TaskSubmission::from_descriptor(&descriptor),
            Err(CoreError::DependencyEncoding { .. })
        ));
    }

    #[test]
    fn test_message_tags() {
        let ack = serde_json::to_value(CoordinatorMessage::Ack).unwrap();
        assert_eq!(ack, json!({"type": "ack"}));

        let log = CoordinatorMessage::Log(LogRecord::new(LogLevel::Info, "t", "hello"));
        let value = serde_json::to_value(&log).unwrap();
        assert_eq!(value["type"], "log");
        assert_eq!(value["message"], "hello");

        let back: CoordinatorMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, log);
        assert_eq!(back.relay(), Relay::Log);
    }

    #[test]
    fn test_message_envelope() {
        let envelope = MessageEnvelope::new(CoordinatorMessage::MonitorClosed);
        assert_eq!(envelope.protocol_version, IPC_PROTOCOL_VERSION);
        assert!(envelope.is_compatible());
        assert_eq!(envelope.message.relay(), Relay::Monitor);
    }
}
