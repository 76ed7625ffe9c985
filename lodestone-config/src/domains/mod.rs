//! Configuration domains

pub mod engine;
pub mod logging;
pub mod utils;

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::Validatable;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct LodestoneConfig {
    /// Worker process and polling settings
    pub engine: engine::EngineConfig,

    pub logging: logging::LoggingConfig,
}

impl LodestoneConfig {
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.engine.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Default configuration rendered as YAML
    pub fn generate_sample() -> String {
        serde_yaml::to_string(&LodestoneConfig::default())
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
