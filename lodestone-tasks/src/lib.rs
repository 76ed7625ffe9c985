//! Task tree model for Lodestone
//!
//! A task tree is rebuilt from a [`TaskConfig`](lodestone_core::TaskConfig)
//! through a [`TaskRegistry`] of factories, one per task kind. The tree
//! shares a [`TaskDatabase`] whose changes can be observed in mutation order,
//! and cooperates with pause and stop requests at every child boundary.

pub mod builtin;
pub mod context;
pub mod database;
pub mod error;
pub mod registry;
pub mod root;
pub mod task;

pub use builtin::builtin_registry;
pub use context::TaskContext;
pub use database::{SubscriptionId, TaskDatabase};
pub use error::{TaskError, TaskResult};
pub use registry::{TaskFactory, TaskRegistry, ALLOWED_TASKS_DEP};
pub use root::RootTask;
pub use task::{CheckReport, Task};
