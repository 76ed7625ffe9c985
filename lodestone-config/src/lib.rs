//! Configuration for Lodestone
//!
//! Settings are split by domain, every field has a default, and a YAML file
//! can be layered with `LODESTONE_*` environment overrides.

pub mod domains;
pub mod error;
pub mod loader;
pub mod validation;

pub use domains::{
    engine::EngineConfig,
    logging::{LogLevel, LoggingConfig},
    LodestoneConfig,
};
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

pub use domains::utils::serde_duration_ms;
