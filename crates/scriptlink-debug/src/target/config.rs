//! Launch Configuration
//!
//! How to spawn a runtime with its debug endpoint enabled.

use crate::constants::PORT_PLACEHOLDER;
use std::path::PathBuf;

/// Command line, working directory and environment of a runtime launch.
///
/// Arguments may contain `{port}`; it is replaced by the chosen debug port:
///
/// ```rust,ignore
/// let launch = LaunchConfig::new("node")
///     .arg("--debug-brk={port}")
///     .arg("main.js");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Runtime executable
    pub command: String,

    /// Arguments, possibly containing the port placeholder
    pub args: Vec<String>,

    /// Working directory (inherited when unset)
    pub cwd: Option<PathBuf>,

    /// Extra environment variables
    pub env: Vec<(String, String)>,

    /// Fixed debug port; a free one is probed when unset
    pub port: Option<u16>,
}

impl LaunchConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Arguments with `{port}` replaced by `port`
    pub fn substitute_port(&self, port: u16) -> Vec<String> {
        let port = port.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(PORT_PLACEHOLDER, &port))
            .collect()
    }

    /// Printable command line for logs
    pub fn command_line(&self, port: u16) -> String {
        std::iter::once(self.command.clone())
            .chain(self.substitute_port(port))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
