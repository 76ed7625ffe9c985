//! Configuration loading and environment variable handling

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::domains::engine::EngineConfig;
use crate::domains::logging::{LogLevel, LoggingConfig};
use crate::domains::LodestoneConfig;
use crate::error::{ConfigError, ConfigResult};

pub struct ConfigLoader {
    prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            prefix: "LODESTONE".to_string(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<LodestoneConfig> {
        log::debug!("Loading configuration from {}", path.as_ref().display());
        let content = std::fs::read_to_string(path)?;
        let mut config: LodestoneConfig = serde_yaml::from_str(&content)?;
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<LodestoneConfig> {
        let mut config = LodestoneConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<LodestoneConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    fn apply_env_overrides(&self, config: &mut LodestoneConfig) -> ConfigResult<()> {
        self.apply_engine_overrides(&mut config.engine)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    fn apply_engine_overrides(&self, config: &mut EngineConfig) -> ConfigResult<()> {
        if let Ok(program) = self.get_env_var("WORKER_PROGRAM") {
            config.worker_program = Some(PathBuf::from(program));
        }

        if let Ok(interval) = self.get_env_var("POLL_INTERVAL_MS") {
            config.poll_interval = parse_millis("POLL_INTERVAL_MS", &interval)?;
        }

        if let Ok(grace) = self.get_env_var("SHUTDOWN_GRACE_MS") {
            config.shutdown_grace = parse_millis("SHUTDOWN_GRACE_MS", &grace)?;
        }

        Ok(())
    }

    fn apply_logging_overrides(&self, config: &mut LoggingConfig) -> ConfigResult<()> {
        if let Ok(level) = self.get_env_var("LOG_LEVEL") {
            config.level = LogLevel::from_str(&level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", level)))?;
        }

        if let Ok(level) = self.get_env_var("WORKER_LOG_LEVEL") {
            config.worker_level = Some(LogLevel::from_str(&level).map_err(|_| {
                ConfigError::EnvError(format!("Invalid WORKER_LOG_LEVEL: {}", level))
            })?);
        }

        Ok(())
    }

    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_millis(name: &str, value: &str) -> ConfigResult<Duration> {
    let millis: u64 = value
        .parse()
        .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e)))?;
    Ok(Duration::from_millis(millis))
}
