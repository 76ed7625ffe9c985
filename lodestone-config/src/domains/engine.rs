//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_non_zero, validate_required_string, Validatable};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker executable; the current executable when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_program: Option<PathBuf>,

    /// Arguments selecting worker mode in `worker_program`
    pub worker_args: Vec<String>,

    /// How often the worker checks its pipe and the process stop flag
    #[serde(with = "crate::domains::utils::serde_duration_ms")]
    pub poll_interval: Duration,

    /// How often the controller checks pause acknowledgements
    #[serde(with = "crate::domains::utils::serde_duration_ms")]
    pub pause_poll_interval: Duration,

    /// How long a cooperative shutdown waits before killing the worker
    #[serde(with = "crate::domains::utils::serde_duration_ms")]
    pub shutdown_grace: Duration,

    /// Process-wide log file kept by the worker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_log_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_program: None,
            worker_args: vec!["--worker".to_string()],
            poll_interval: Duration::from_millis(200),
            pause_poll_interval: Duration::from_millis(50),
            shutdown_grace: Duration::from_secs(5),
            worker_log_file: None,
        }
    }
}

impl Validatable for EngineConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_non_zero(self.poll_interval, "poll_interval", self.domain_name())?;
        validate_non_zero(self.pause_poll_interval, "pause_poll_interval", self.domain_name())?;
        validate_non_zero(self.shutdown_grace, "shutdown_grace", self.domain_name())?;

        if let Some(program) = &self.worker_program {
            validate_required_string(&program.to_string_lossy(), "worker_program", self.domain_name())?;
        }
        if self.worker_args.iter().any(|arg| arg.is_empty()) {
            return Err(self.validation_error("worker_args cannot contain empty arguments"));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "engine"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.worker_args, vec!["--worker"]);
        assert_eq!(config.poll_interval, Duration::from_millis(200));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = EngineConfig {
            pause_poll_interval: Duration::ZERO,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pause_poll_interval"));
    }
}
