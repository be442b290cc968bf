//! Configuration path resolution.
//!
//! Resolution order: CLI argument → environment variable → current
//! directory → system path.

use std::path::{Path, PathBuf};

/// Environment variable naming a config file directly.
const ENV_CONFIG_PATH: &str = "JSNAP_CONFIG";

/// Standard config file name.
const CONFIG_FILENAME: &str = "jsnap.yaml";

/// System-wide config location.
const SYSTEM_CONFIG_DIR: &str = "/etc/jsnap";

/// Where a configuration file was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,
    /// Set via the JSNAP_CONFIG environment variable.
    Environment,
    /// Found in the current working directory.
    WorkingDirectory,
    /// Found in /etc/jsnap/.
    SystemConfig,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::WorkingDirectory => write!(f, "working directory"),
            ConfigSource::SystemConfig => write!(f, "system config"),
        }
    }
}

/// Resolve the config file path.
///
/// Returns the first existing candidate together with its source, or
/// `None` when no config file exists anywhere in the chain.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<(PathBuf, ConfigSource)> {
    if let Some(path) = cli_path {
        if path.exists() {
            return Some((path.to_path_buf(), ConfigSource::CliArgument));
        }
    }

    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Some((path, ConfigSource::Environment));
        }
    }

    let cwd_path = PathBuf::from(CONFIG_FILENAME);
    if cwd_path.exists() {
        return Some((cwd_path, ConfigSource::WorkingDirectory));
    }

    let system_path = Path::new(SYSTEM_CONFIG_DIR).join(CONFIG_FILENAME);
    if system_path.exists() {
        return Some((system_path, ConfigSource::SystemConfig));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_argument_wins_when_present() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let resolved = resolve_config_path(Some(file.path())).unwrap();
        assert_eq!(resolved.0, file.path());
        assert_eq!(resolved.1, ConfigSource::CliArgument);
    }

    #[test]
    fn missing_cli_path_falls_through() {
        // A nonexistent CLI path must not short-circuit resolution.
        let resolved = resolve_config_path(Some(Path::new("/nonexistent/jsnap.yaml")));
        if let Some((_, source)) = resolved {
            assert_ne!(source, ConfigSource::CliArgument);
        }
    }

    #[test]
    fn source_display() {
        assert_eq!(ConfigSource::CliArgument.to_string(), "CLI argument");
        assert_eq!(ConfigSource::SystemConfig.to_string(), "system config");
    }
}
