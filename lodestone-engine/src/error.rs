//! Error types for the engine and the worker runtime

use thiserror::Error;

use lodestone_ipc::IpcError;
use lodestone_tasks::TaskError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid engine state: {0}")]
    InvalidState(String),

    #[error("Failed to spawn worker process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),
}

/// Errors ending the worker run loop
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),

    #[error("Failed to rebuild task tree: {0}")]
    Rebuild(#[source] TaskError),

    #[error("Task thread failed: {0}")]
    TaskThread(String),
}
