//! Core types for Lodestone
//!
//! This crate holds the data records exchanged between a caller and the
//! execution engine, and between the engine and its worker process:
//! - [`ExecutionDescriptor`] and [`ExecutionResult`]
//! - [`TaskConfig`], the serialized form of a task tree
//! - [`Dependency`], the opaque wire-encodable dependency values
//! - [`ControlSignals`], the pause and stop flags seen by a task tree

pub mod dependency;
pub mod error;
pub mod execution;
pub mod signal;
pub mod task;

pub use dependency::{encode_dependencies, Dependency, DependencyMap};
pub use error::{CoreError, CoreResult};
pub use execution::{EngineFailure, ExecutionDescriptor, ExecutionResult, ENGINE_ERROR_KEY};
pub use signal::{ControlSignals, LocalSignal, Signal};
pub use task::{ConfiguredTree, TaskConfig, TaskTreeHandle, DEFAULT_PATH_PARAM, ROOT_TASK_KIND};
