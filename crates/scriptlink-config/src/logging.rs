//! Logging configuration

use crate::constants::DEFAULT_LOG_LEVEL;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Log level and destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is not set
    #[serde(default = "default_level")]
    pub level: String,
    /// Write logs to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Show module target in log lines
    #[serde(default)]
    pub show_target: bool,
}

fn default_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
            show_target: false,
        }
    }
}
