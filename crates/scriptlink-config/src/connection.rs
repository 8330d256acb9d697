//! Runtime connection configuration
//!
//! Settings for launching a runtime and attaching to its debug endpoint:
//! port probing, connection retries, response deadlines and channel sizing.

use crate::constants::{
    DEFAULT_CONNECT_ATTEMPTS, DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_HOST,
    DEFAULT_MAX_RETRY_INTERVAL_MS, DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START,
    DEFAULT_RETRY_INTERVAL_MS, DEFAULT_RETRY_JITTER_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS,
    DEFAULT_TCP_KEEPALIVE_SECS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Connection Config
// ============================================================================

/// Runtime connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Host the runtime's debug endpoint listens on
    #[serde(default = "default_host")]
    pub host: String,
    /// First port probed when choosing a free debug port
    #[serde(default = "default_port_range_start")]
    pub port_range_start: u16,
    /// Last port probed when choosing a free debug port
    #[serde(default = "default_port_range_end")]
    pub port_range_end: u16,
    /// Connection attempts after spawning the runtime
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Initial retry interval in milliseconds (doubled on each attempt)
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Cap for the retry interval in milliseconds
    #[serde(default = "default_max_retry_interval_ms")]
    pub max_retry_interval_ms: u64,
    /// Random jitter added to each retry sleep (ms)
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,
    /// Deadline for a single command response in milliseconds.
    ///
    /// Unset means waiters block until the response arrives or the target
    /// terminates; termination always wakes every waiter.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Time allowed for the runtime process to exit after a kill
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Capacity of each host event subscriber channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// TCP keep-alive idle time in seconds
    #[serde(default = "default_tcp_keepalive_secs")]
    pub tcp_keepalive_secs: u64,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port_range_start() -> u16 {
    DEFAULT_PORT_RANGE_START
}

fn default_port_range_end() -> u16 {
    DEFAULT_PORT_RANGE_END
}

fn default_connect_attempts() -> u32 {
    DEFAULT_CONNECT_ATTEMPTS
}

fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}

fn default_max_retry_interval_ms() -> u64 {
    DEFAULT_MAX_RETRY_INTERVAL_MS
}

fn default_retry_jitter_ms() -> u64 {
    DEFAULT_RETRY_JITTER_MS
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_tcp_keepalive_secs() -> u64 {
    DEFAULT_TCP_KEEPALIVE_SECS
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            host: default_host(),
            port_range_start: default_port_range_start(),
            port_range_end: default_port_range_end(),
            connect_attempts: default_connect_attempts(),
            retry_interval_ms: default_retry_interval_ms(),
            max_retry_interval_ms: default_max_retry_interval_ms(),
            retry_jitter_ms: default_retry_jitter_ms(),
            request_timeout_ms: None,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            tcp_keepalive_secs: default_tcp_keepalive_secs(),
        }
    }
}

impl ConnectionConfig {
    /// Response deadline as a `Duration`, if one is configured
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Check internal constraints, returning one message per violation
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.port_range_start > self.port_range_end {
            errors.push(format!(
                "connection.port_range_start ({}) must not exceed connection.port_range_end ({})",
                self.port_range_start, self.port_range_end
            ));
        }
        if self.connect_attempts == 0 {
            errors.push("connection.connect_attempts must be greater than 0".to_string());
        }
        if self.event_channel_capacity == 0 {
            errors.push("connection.event_channel_capacity must be greater than 0".to_string());
        }
        if self.request_timeout_ms == Some(0) {
            errors.push("connection.request_timeout_ms must be greater than 0 when set".to_string());
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ConnectionConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_validate_reports_every_violation() {
        let config = ConnectionConfig {
            port_range_start: 9000,
            port_range_end: 8000,
            connect_attempts: 0,
            ..ConnectionConfig::default()
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("port_range_start"));
        assert!(errors[1].contains("connect_attempts"));
    }

    #[test]
    fn test_request_timeout_conversion() {
        let config = ConnectionConfig {
            request_timeout_ms: Some(250),
            ..ConnectionConfig::default()
        };
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(250)));
    }
}
