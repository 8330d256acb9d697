//! Configuration file loading and validation
//!
//! - [`load_config`] - Strict loader, errors if the file is missing
//! - [`load_config_from_str`] - Parse and validate TOML content
//! - [`discover_config_path`] - Resolve which file to load

use crate::constants::{DEFAULT_CONFIG_FILENAME, ENV_SCRIPTLINK_CONFIG};
use crate::Config;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Errors that can occur during config loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Where the config path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config <path>` argument
    Argument,
    /// `SCRIPTLINK_CONFIG` environment variable
    Environment,
    /// `./scriptlink.toml`
    Default,
}

/// Resolve the config path.
///
/// Resolution order:
/// 1. Explicit path (CLI argument)
/// 2. `SCRIPTLINK_CONFIG` environment variable
/// 3. `scriptlink.toml` in the working directory
pub fn discover_config_path(explicit: Option<&Path>) -> (PathBuf, ConfigSource) {
    if let Some(path) = explicit {
        return (path.to_path_buf(), ConfigSource::Argument);
    }
    if let Ok(path) = std::env::var(ENV_SCRIPTLINK_CONFIG) {
        if !path.is_empty() {
            return (PathBuf::from(path), ConfigSource::Environment);
        }
    }
    (PathBuf::from(DEFAULT_CONFIG_FILENAME), ConfigSource::Default)
}

/// Load configuration from a TOML file (strict - no side effects)
///
/// # Returns
/// * `Ok(Config)` - Successfully loaded configuration
/// * `Err(ConfigError::NotFound)` - Config file does not exist
/// * `Err(ConfigError)` - Failed to read, parse or validate configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    debug!(path = %path.display(), "Loading config file");
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load configuration from a TOML string
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration values, collecting every violation
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut all_errors = config.connection.validate();

    if config.display.max_value_length < 4 {
        all_errors.push("display.max_value_length must be at least 4".to_string());
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(all_errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.connection.host, "127.0.0.1");
        assert_eq!(config.display.render_depth, 2);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_config_overrides() {
        let config = load_config_from_str(
            r#"
            [connection]
            connect_attempts = 3
            request_timeout_ms = 5000

            [display]
            render_depth = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.connection.connect_attempts, 3);
        assert_eq!(config.connection.request_timeout_ms, Some(5000));
        assert_eq!(config.display.render_depth, 4);
        assert_eq!(config.display.max_value_length, 100);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = load_config_from_str(
            r#"
            [connection]
            port_range_start = 7000
            port_range_end = 6000
            "#,
        );
        match result {
            Err(ConfigError::Validation(msg)) => assert!(msg.contains("port_range_start")),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error() {
        let result = load_config_from_str("[connection\nhost = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config(Path::new("/nonexistent/scriptlink.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_discover_explicit_path_wins() {
        let (path, source) = discover_config_path(Some(Path::new("custom.toml")));
        assert_eq!(path, PathBuf::from("custom.toml"));
        assert_eq!(source, ConfigSource::Argument);
    }
}
