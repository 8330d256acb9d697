//! Debug protocol message types
//!
//! Outbound requests:
//! ```text
//! {"seq":7,"type":"request","command":"continue","arguments":{"stepaction":"in","stepcount":1}}
//! ```
//! Inbound messages carry a `type` discriminator. Responses echo the
//! request's sequence number in `request_seq` and may carry a `refs` handle
//! table plus the runtime's `running` flag; events carry an `event` name.

use crate::constants::{commands, events, exception_types, step_actions};
use crate::values::Handle;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

// ============================================================
// COMMANDS
// ============================================================

/// Step granularity for the continue command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Step into calls
    In,
    /// Step over calls
    Next,
    /// Run until the current function returns
    Out,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::In => step_actions::IN,
            StepAction::Next => step_actions::NEXT,
            StepAction::Out => step_actions::OUT,
        }
    }
}

/// Which thrown exceptions stop execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionBreakType {
    All,
    Uncaught,
}

impl ExceptionBreakType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionBreakType::All => exception_types::ALL,
            ExceptionBreakType::Uncaught => exception_types::UNCAUGHT,
        }
    }
}

/// A command variant together with its arguments.
///
/// Each variant knows its own wire name; see [`CommandKind::name`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    Version,
    ListBreakpoints,
    Threads,
    Scripts,
    Backtrace {
        from_frame: u32,
        to_frame: Option<u32>,
    },
    /// Resume, optionally stepping
    Continue(Option<StepAction>),
    Suspend,
    /// Line breakpoint. `line` is 1-based; the wire uses 0-based lines.
    SetBreakpoint {
        file: String,
        line: u32,
        condition: Option<String>,
        enabled: bool,
    },
    ClearBreakpoint {
        id: u64,
    },
    SetExceptionBreak {
        break_on: ExceptionBreakType,
        enabled: bool,
    },
    Evaluate {
        expression: String,
        /// Frame index; `None` evaluates in the global scope
        frame: Option<u32>,
        disable_break: bool,
    },
    Lookup {
        handles: Vec<Handle>,
    },
    Disconnect,
}

impl CommandKind {
    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Version => commands::VERSION,
            CommandKind::ListBreakpoints => commands::LIST_BREAKPOINTS,
            CommandKind::Threads => commands::THREADS,
            CommandKind::Scripts => commands::SCRIPTS,
            CommandKind::Backtrace { .. } => commands::BACKTRACE,
            CommandKind::Continue(_) => commands::CONTINUE,
            CommandKind::Suspend => commands::SUSPEND,
            CommandKind::SetBreakpoint { .. } => commands::SET_BREAKPOINT,
            CommandKind::ClearBreakpoint { .. } => commands::CLEAR_BREAKPOINT,
            CommandKind::SetExceptionBreak { .. } => commands::SET_EXCEPTION_BREAK,
            CommandKind::Evaluate { .. } => commands::EVALUATE,
            CommandKind::Lookup { .. } => commands::LOOKUP,
            CommandKind::Disconnect => commands::DISCONNECT,
        }
    }

    /// Argument payload, if the command takes one
    pub fn arguments(&self) -> Option<Json> {
        match self {
            CommandKind::Version
            | CommandKind::ListBreakpoints
            | CommandKind::Threads
            | CommandKind::Suspend
            | CommandKind::Disconnect => None,
            CommandKind::Scripts => Some(json!({ "includeSource": false })),
            CommandKind::Backtrace {
                from_frame,
                to_frame,
            } => {
                let mut args = json!({ "fromFrame": from_frame });
                if let Some(to) = to_frame {
                    args["toFrame"] = json!(to);
                }
                Some(args)
            }
            CommandKind::Continue(None) => None,
            CommandKind::Continue(Some(step)) => Some(json!({
                "stepaction": step.as_str(),
                "stepcount": 1,
            })),
            CommandKind::SetBreakpoint {
                file,
                line,
                condition,
                enabled,
            } => {
                let mut args = json!({
                    "type": "script",
                    "target": file,
                    "line": line.saturating_sub(1),
                    "enabled": enabled,
                });
                if let Some(condition) = condition {
                    args["condition"] = json!(condition);
                }
                Some(args)
            }
            CommandKind::ClearBreakpoint { id } => Some(json!({ "breakpoint": id })),
            CommandKind::SetExceptionBreak { break_on, enabled } => Some(json!({
                "type": break_on.as_str(),
                "enabled": enabled,
            })),
            CommandKind::Evaluate {
                expression,
                frame,
                disable_break,
            } => {
                let mut args = json!({
                    "expression": expression,
                    "disable_break": disable_break,
                });
                match frame {
                    Some(frame) => args["frame"] = json!(frame),
                    None => args["global"] = json!(true),
                }
                Some(args)
            }
            CommandKind::Lookup { handles } => Some(json!({
                "handles": handles,
                "includeSource": false,
            })),
        }
    }
}

/// Outbound request with its sequence number fixed at construction
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub seq: u64,
    pub kind: CommandKind,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    seq: u64,
    #[serde(rename = "type")]
    message_type: &'static str,
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<Json>,
}

impl Command {
    pub fn new(seq: u64, kind: CommandKind) -> Self {
        Self { seq, kind }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// JSON wire encoding (without framing)
    pub fn encode(&self) -> Result<Vec<u8>> {
        let request = WireRequest {
            seq: self.seq,
            message_type: "request",
            command: self.kind.name(),
            arguments: self.kind.arguments(),
        };
        Ok(serde_json::to_vec(&request)?)
    }
}

// ============================================================
// INBOUND MESSAGES
// ============================================================

/// Any message read from the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Requests are only ever sent by us; an inbound one is ignored
    Request(InboundRequest),
    Response(Response),
    Event(Event),
}

impl Message {
    /// Decode one frame payload
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundRequest {
    #[serde(default)]
    pub seq: u64,
    #[serde(default)]
    pub command: String,
}

/// Reply to exactly one command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub seq: u64,
    /// Sequence number of the command this answers
    pub request_seq: u64,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub success: bool,
    /// Error text when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Json>,
    /// Handle table for values referenced from `body`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<Vec<Json>>,
    /// Runtime's execution state after handling the command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
}

impl Response {
    pub fn success(seq: u64, request_seq: u64, command: impl Into<String>) -> Self {
        Self {
            seq,
            request_seq,
            command: command.into(),
            success: true,
            message: None,
            body: None,
            refs: None,
            running: None,
        }
    }

    pub fn error(
        seq: u64,
        request_seq: u64,
        command: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::success(seq, request_seq, command)
        }
    }

    pub fn with_body(mut self, body: Json) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_refs(mut self, refs: Vec<Json>) -> Self {
        self.refs = Some(refs);
        self
    }

    pub fn with_running(mut self, running: bool) -> Self {
        self.running = Some(running);
        self
    }

    /// Turn `success: false` into `Error::Command`
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(Error::Command {
                command: self.command,
                message: self
                    .message
                    .unwrap_or_else(|| "Unknown error".to_string()),
            })
        }
    }

    /// Reference descriptors, empty when the response carries none
    pub fn refs(&self) -> &[Json] {
        self.refs.as_deref().unwrap_or(&[])
    }
}

/// Event names the client reacts to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Break,
    Exception,
    AfterCompile,
    Other(String),
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            events::BREAK => EventKind::Break,
            events::EXCEPTION => EventKind::Exception,
            events::AFTER_COMPILE => EventKind::AfterCompile,
            _ => EventKind::Other(name),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Break => events::BREAK.to_string(),
            EventKind::Exception => events::EXCEPTION.to_string(),
            EventKind::AfterCompile => events::AFTER_COMPILE.to_string(),
            EventKind::Other(name) => name,
        }
    }
}

/// Unsolicited notification from the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub seq: u64,
    pub event: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
}

impl Event {
    pub fn new(seq: u64, event: EventKind) -> Self {
        Self {
            seq,
            event,
            body: None,
            running: None,
        }
    }

    pub fn with_body(mut self, body: Json) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_running(mut self, running: bool) -> Self {
        self.running = Some(running);
        self
    }

    /// Runtime execution state reported by this event.
    ///
    /// Break and exception events imply a stopped runtime when the flag is
    /// absent.
    pub fn running(&self) -> Option<bool> {
        match (&self.running, &self.event) {
            (Some(running), _) => Some(*running),
            (None, EventKind::Break | EventKind::Exception) => Some(false),
            (None, _) => None,
        }
    }

    /// Breakpoint ids listed in a break event body
    pub fn breakpoint_ids(&self) -> Vec<u64> {
        self.body
            .as_ref()
            .and_then(|body| body.get("breakpoints"))
            .and_then(Json::as_array)
            .map(|ids| ids.iter().filter_map(Json::as_u64).collect())
            .unwrap_or_default()
    }
}
