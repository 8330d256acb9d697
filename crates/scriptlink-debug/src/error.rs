//! Error types for debug client operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Connection reset, socket read/write failure, process pipe errors
    ///
    /// Fatal for the target: the terminate procedure runs once.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed frames and protocol state violations
    ///
    /// Use for: bad headers, unbalanced JSON, unexpected message types.
    /// The offending message is dropped; the connection stays up.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON parsing and deserialization failures
    ///
    /// Automatically converted from `serde_json::Error` via `From` impl.
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// The runtime answered a command with `success: false`
    #[error("Command '{command}' failed: {message}")]
    Command { command: String, message: String },

    /// Process spawn errors, no free port, connection attempts exhausted
    #[error("Launch failed: {0}")]
    Launch(String),

    /// No response within the configured deadline
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// The target was torn down while the operation was pending
    #[error("Target terminated")]
    Terminated,

    /// Operation not valid in the current thread/target state
    #[error("Not available: {0}")]
    NotAvailable(String),
}

impl Error {
    /// Whether this error must tear down the target
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Launch(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidMessage(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::Protocol(format!("Invalid UTF-8: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Protocol("test error".to_string());
        assert_eq!(err.to_string(), "Protocol error: test error");

        let err = Error::Command {
            command: "evaluate".to_string(),
            message: "ReferenceError: x is not defined".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Command 'evaluate' failed: ReferenceError: x is not defined"
        );
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::InvalidMessage(_) => (),
            _ => panic!("Expected InvalidMessage error"),
        }
    }

    #[test]
    fn test_fatal_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(Error::from(io).is_fatal());
        assert!(Error::Launch("no port".to_string()).is_fatal());
        assert!(!Error::Protocol("bad header".to_string()).is_fatal());
        assert!(!Error::Timeout(10).is_fatal());
        assert!(!Error::Terminated.is_fatal());
    }
}
