//! Value display configuration

use crate::constants::{DEFAULT_MAX_VALUE_LENGTH, DEFAULT_RENDER_DEPTH};
use serde::{Deserialize, Serialize};

/// Settings used when rendering runtime values for the host tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Recursion budget for expanding objects
    #[serde(default = "default_render_depth")]
    pub render_depth: usize,
    /// Longer strings are truncated with "..." suffix
    #[serde(default = "default_max_value_length")]
    pub max_value_length: usize,
}

fn default_render_depth() -> usize {
    DEFAULT_RENDER_DEPTH
}

fn default_max_value_length() -> usize {
    DEFAULT_MAX_VALUE_LENGTH
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            render_depth: default_render_depth(),
            max_value_length: default_max_value_length(),
        }
    }
}
