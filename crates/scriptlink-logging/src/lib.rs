//! Centralized logging configuration for scriptlink
//!
//! Wraps `tracing` and `tracing-subscriber` so every binary initialises
//! logging the same way.
//!
//! # Usage
//!
//! ```rust,ignore
//! use scriptlink_logging::{init, LogConfig, LogOutput};
//!
//! // CLI with debug flag
//! init(LogConfig::new().debug(true));
//!
//! // Host tools that own stdout log to stderr
//! init(LogConfig::new().output(LogOutput::Stderr));
//!
//! // File logging
//! let guard = init_with_file(LogConfig::new(), Path::new("/tmp/scriptlink.log"))?;
//! // Guard must be held for the duration of the program
//! ```

use std::io::IsTerminal;
use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-export tracing macros for standardized imports
pub use tracing::{debug, error, info, trace, warn, Level};

// Re-export WorkerGuard for file logging lifetime management
pub use tracing_appender::non_blocking::WorkerGuard;

/// Output destination for logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogOutput {
    /// Write logs to stdout
    Stdout,
    /// Write logs to stderr (default; stdout carries host events)
    #[default]
    Stderr,
}

/// Timestamp format for log output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimestampFormat {
    /// Use local timezone (default)
    #[default]
    Local,
    /// Use UTC timezone
    Utc,
}

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable debug-level logging (overrides default_level)
    pub debug: bool,
    /// Default log level when RUST_LOG is not set
    pub default_level: String,
    /// Output destination
    pub output: LogOutput,
    /// Show module target in log output
    pub show_target: bool,
    /// Timestamp format (local or UTC)
    pub timestamp_format: TimestampFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            default_level: "info".to_string(),
            output: LogOutput::default(),
            show_target: false,
            timestamp_format: TimestampFormat::default(),
        }
    }
}

impl LogConfig {
    /// Create a new LogConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable debug-level logging
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Set the default log level (used when RUST_LOG is not set)
    pub fn default_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    /// Set the output destination
    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Show or hide module target in log output
    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    /// Set timestamp format (local or UTC)
    pub fn timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    /// Use UTC timestamps
    pub fn utc(self) -> Self {
        self.timestamp_format(TimestampFormat::Utc)
    }

    fn build_filter(&self) -> EnvFilter {
        if self.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&self.default_level))
        }
    }
}

/// Initialize the logging system with the given configuration.
///
/// `RUST_LOG` overrides the default level unless `debug` is set.
///
/// # Panics
///
/// Panics if called more than once (tracing can only be initialized once).
pub fn init(config: LogConfig) {
    use tracing_subscriber::fmt::time::{LocalTime, UtcTime};

    let filter = config.build_filter();

    // Applies the timer and initialises (avoids type-level branching duplication)
    macro_rules! with_timer_init {
        ($builder:expr, $ts_format:expr) => {
            match $ts_format {
                TimestampFormat::Utc => $builder.with_timer(UtcTime::rfc_3339()).init(),
                TimestampFormat::Local => $builder.with_timer(LocalTime::rfc_3339()).init(),
            }
        };
    }

    match config.output {
        LogOutput::Stdout => {
            let is_tty = std::io::stdout().is_terminal();
            let builder = fmt()
                .with_env_filter(filter)
                .with_target(config.show_target)
                .with_ansi(is_tty);
            with_timer_init!(builder, config.timestamp_format);
        }
        LogOutput::Stderr => {
            let is_tty = std::io::stderr().is_terminal();
            let builder = fmt()
                .with_env_filter(filter)
                .with_target(config.show_target)
                .with_writer(std::io::stderr)
                .with_ansi(is_tty);
            with_timer_init!(builder, config.timestamp_format);
        }
    }
}

/// Initialize the logging system with file output.
///
/// Uses a daily-rotating non-blocking appender. The returned `WorkerGuard`
/// must be held until program exit so buffered lines are flushed.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created.
pub fn init_with_file(config: LogConfig, log_path: &Path) -> std::io::Result<WorkerGuard> {
    use tracing_subscriber::fmt::time::{LocalTime, UtcTime};

    let filter = config.build_filter();

    let log_dir = log_path.parent().unwrap_or(Path::new("."));
    if !log_dir.as_os_str().is_empty() {
        std::fs::create_dir_all(log_dir)?;
    }
    let log_filename = log_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("scriptlink.log");

    // Files named: {prefix}.YYYY-MM-DD
    let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(config.show_target)
        .with_writer(non_blocking)
        .with_ansi(false);

    match config.timestamp_format {
        TimestampFormat::Utc => builder.with_timer(UtcTime::rfc_3339()).init(),
        TimestampFormat::Local => builder.with_timer(LocalTime::rfc_3339()).init(),
    }

    Ok(guard)
}

/// Initialize logging for tests.
///
/// Uses `with_test_writer()` to capture logs in test output.
/// Safe to call multiple times (uses `try_init` internally).
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new()
            .default_level("warn")
            .show_target(true)
            .output(LogOutput::Stdout)
            .utc();
        assert_eq!(config.default_level, "warn");
        assert!(config.show_target);
        assert_eq!(config.output, LogOutput::Stdout);
        assert_eq!(config.timestamp_format, TimestampFormat::Utc);
    }

    #[test]
    fn test_default_output_is_stderr() {
        assert_eq!(LogConfig::default().output, LogOutput::Stderr);
    }

    #[test]
    fn test_build_filter_respects_debug_flag() {
        let config = LogConfig::new().default_level("warn").debug(true);
        let filter_str = format!("{:?}", config.build_filter());
        assert!(
            filter_str.contains("debug") || filter_str.contains("DEBUG"),
            "Expected debug level in filter: {}",
            filter_str
        );
    }

    #[test]
    fn test_init_test_does_not_panic() {
        init_test();
        init_test();
    }
}
