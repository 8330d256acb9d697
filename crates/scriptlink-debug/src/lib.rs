//! Remote debug client for scriptable runtimes
//!
//! Launches a runtime with its remote-debugging endpoint enabled, attaches
//! over TCP and drives it: breakpoints, stepping, stack inspection,
//! expression evaluation and console streaming.
//!
//! # Layers
//!
//! - [`framing`] - `Content-Length` framed and bare JSON messages
//! - [`protocol`] - typed commands, responses and events
//! - [`broker`] - sequence numbers, response correlation, reader/writer loops
//! - [`values`] - handle tables materialized into (possibly cyclic) value graphs
//! - [`thread`] / [`frames`] - running/suspended state machine and stack snapshots
//! - [`breakpoints`] - host specs kept in sync with the runtime
//! - [`target`] - process launch, handshake, event dispatch and teardown
//!
//! # Usage
//!
//! ```rust,ignore
//! use scriptlink_debug::{Breakpoint, LaunchConfig, Session, Target};
//!
//! let session = Session::default();
//! let mut events = session.subscribe().await;
//! session.breakpoints().add(Breakpoint::line("main.js", 12)).await?;
//!
//! let launch = LaunchConfig::new("node").arg("--debug-brk={port}").arg("main.js");
//! let target = Target::start(&launch, &config.connection, &session).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

pub mod breakpoints;
pub mod broker;
pub mod constants;
pub mod error;
pub mod events;
pub mod frames;
pub mod framing;
pub mod protocol;
pub mod scripts;
pub mod target;
pub mod thread;
pub mod values;

pub use breakpoints::{Breakpoint, BreakpointId, BreakpointKind, BreakpointRecord, BreakpointSync};
pub use broker::{Broker, Incoming, PendingResponse};
pub use error::{Error, Result};
pub use events::{ConsoleEvent, ConsoleStream, HostEvent, HostEvents, RunEvent};
pub use frames::StackFrame;
pub use protocol::{
    Command, CommandKind, Event, EventKind, ExceptionBreakType, Message, Response, StepAction,
};
pub use scripts::{Script, ScriptTable};
pub use target::{HandshakeInfo, LaunchConfig, Session, Target};
pub use thread::{ContinueReason, Thread, ThreadState};
pub use values::{Composite, Evaluation, FunctionInfo, Handle, RefMap, ScriptRef, Value};
