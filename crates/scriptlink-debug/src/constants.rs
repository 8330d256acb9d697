//! Wire protocol constants
//!
//! Centralizes the magic strings of the runtime's debug protocol.

/// Outbound command names
pub mod commands {
    pub const VERSION: &str = "version";
    pub const LIST_BREAKPOINTS: &str = "listbreakpoints";
    pub const THREADS: &str = "threads";
    pub const SCRIPTS: &str = "scripts";
    pub const BACKTRACE: &str = "backtrace";
    pub const CONTINUE: &str = "continue";
    pub const SUSPEND: &str = "suspend";
    pub const SET_BREAKPOINT: &str = "setbreakpoint";
    pub const CLEAR_BREAKPOINT: &str = "clearbreakpoint";
    /// Exception breakpoints use their own command
    pub const SET_EXCEPTION_BREAK: &str = "setexceptionbreak";
    pub const EVALUATE: &str = "evaluate";
    pub const LOOKUP: &str = "lookup";
    pub const DISCONNECT: &str = "disconnect";
}

/// Inbound event names
pub mod events {
    /// Execution stopped (breakpoint, step end, debugger statement)
    pub const BREAK: &str = "break";
    /// Execution stopped on a thrown exception
    pub const EXCEPTION: &str = "exception";
    /// A script was compiled and is now known to the runtime
    pub const AFTER_COMPILE: &str = "afterCompile";
}

/// `stepaction` argument values of the continue command
pub mod step_actions {
    pub const IN: &str = "in";
    pub const NEXT: &str = "next";
    pub const OUT: &str = "out";
}

/// Exception break `type` argument values
pub mod exception_types {
    /// Break on every thrown exception
    pub const ALL: &str = "all";
    /// Break only on exceptions nothing catches
    pub const UNCAUGHT: &str = "uncaught";
}

/// Framing
pub mod framing {
    /// Header carrying the payload length
    pub const CONTENT_LENGTH: &str = "Content-Length";
    /// Frames larger than this are rejected rather than allocated
    pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;
}

/// Placeholder in launch arguments replaced with the chosen debug port
pub const PORT_PLACEHOLDER: &str = "{port}";
