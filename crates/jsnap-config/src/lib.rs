//! jsnap agent configuration loading and validation.
//!
//! This crate provides:
//! - The typed `AgentConfig` struct backing `jsnap.yaml`
//! - Config path resolution (CLI → env → cwd → system path)
//! - Semantic validation with field-path error messages

pub mod model;
pub mod resolve;
pub mod validate;

pub use model::{AgentConfig, LogSettings};
pub use resolve::{resolve_config_path, ConfigSource};
pub use validate::validate;

use std::path::Path;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Load and validate an agent config from a YAML file.
pub fn load(path: &Path) -> Result<AgentConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let config: AgentConfig = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    let problems = validate(&config);
    if !problems.is_empty() {
        return Err(ConfigError::Invalid(problems));
    }
    Ok(config)
}
