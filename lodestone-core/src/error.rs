//! Core error types

use thiserror::Error;

/// Result alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A dependency value could not be turned into its wire form
    #[error("Dependency '{key}' is not serializable: {source}")]
    DependencyEncoding {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown engine failure kind: {0}")]
    UnknownFailure(String),
}
