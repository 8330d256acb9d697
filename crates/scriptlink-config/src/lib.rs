//! Configuration types and loading for scriptlink
//!
//! This crate provides:
//! - Configuration structures for the debug client components
//! - Config file loading (TOML format)
//! - Environment variable override of the config path
//!
//! # Module Organization
//!
//! - `connection` - runtime launch/connection settings (ports, retries, timeouts)
//! - `display` - value rendering settings
//! - `logging` - log level and destination
//!
//! # Usage
//!
//! ```rust,ignore
//! use scriptlink_config::{load_config, Config};
//! use std::path::Path;
//!
//! let config = load_config(Path::new("scriptlink.toml"))?;
//! println!("Connect attempts: {}", config.connection.connect_attempts);
//! ```

// Default constants for all configuration values
pub mod constants;

mod connection;
mod display;
mod loader;
mod logging;

pub use connection::ConnectionConfig;
pub use display::DisplayConfig;
pub use loader::{
    discover_config_path, load_config, load_config_from_str, ConfigError, ConfigSource,
};
pub use logging::LoggingConfig;

pub use constants::{DEFAULT_HOST, LOCALHOST_IPV4};

use serde::{Deserialize, Serialize};

/// Main scriptlink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}
