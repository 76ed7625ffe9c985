//! Task error types

use thiserror::Error;

pub type TaskResult<T> = Result<T, TaskError>;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Unknown task kind '{0}'")]
    UnknownTask(String),

    #[error("Task kind '{0}' is not among the build dependencies")]
    NotAllowed(String),

    #[error("Expected a root task configuration, got '{0}'")]
    NotRoot(String),

    #[error("Task '{task}' is missing parameter '{param}'")]
    MissingParameter { task: String, param: String },

    #[error("Task '{task}' has an invalid '{param}' parameter: {message}")]
    InvalidParameter {
        task: String,
        param: String,
        message: String,
    },

    /// A stop request was observed
    #[error("Execution stopped")]
    Stopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),
}

impl TaskError {
    pub fn missing(task: &str, param: &str) -> Self {
        TaskError::MissingParameter {
            task: task.to_string(),
            param: param.to_string(),
        }
    }

    pub fn invalid(task: &str, param: &str, message: impl Into<String>) -> Self {
        TaskError::InvalidParameter {
            task: task.to_string(),
            param: param.to_string(),
            message: message.into(),
        }
    }
}
