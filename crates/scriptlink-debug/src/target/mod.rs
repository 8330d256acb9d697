//! Target Management
//!
//! Launches a runtime with its debug endpoint enabled and attaches to it:
//! - Free-port selection and process spawning
//! - Connection with bounded retries
//! - Handshake and breakpoint replay
//! - Console relaying and event dispatch
//! - One-way teardown

mod config;
mod connection;
mod console;
mod dispatch;
mod handshake;
mod process;

#[cfg(test)]
mod tests;

// Re-export public API
pub use config::LaunchConfig;
pub use connection::find_free_port;
pub use handshake::HandshakeInfo;
pub use process::{Session, Target};
