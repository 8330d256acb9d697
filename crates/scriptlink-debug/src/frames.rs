//! Stack frame snapshots
//!
//! Built from a `backtrace` response: the body lists frames whose function,
//! script and slot values are handles into the response's `refs` table.
//! Frames of one snapshot share that table.

use crate::protocol::Response;
use crate::scripts::Script;
use crate::values::{Handle, RefMap, Value};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;

/// One call frame captured at a suspend
#[derive(Debug, Clone)]
pub struct StackFrame {
    /// 0 is the innermost frame
    pub index: u32,
    pub function_name: String,
    pub source_file: Option<String>,
    /// 1-based source line
    pub line: u32,
    /// 1-based source column
    pub column: u32,
    pub is_constructor: bool,
    /// Frame belongs to the runtime's own debugger machinery
    pub is_internal: bool,
    /// Arguments and locals; `None` marks an unresolvable reference
    locals: HashMap<String, Option<Handle>>,
    refs: Arc<RefMap>,
}

impl StackFrame {
    /// Value of a named argument or local
    pub fn local(&self, name: &str) -> &Value {
        self.locals
            .get(name)
            .and_then(|handle| handle.map(|h| self.refs.get(h)))
            .unwrap_or(Value::unknown())
    }

    /// Arguments and locals sorted by name
    pub fn locals(&self) -> Vec<(&str, &Value)> {
        let mut locals: Vec<(&str, &Value)> = self
            .locals
            .keys()
            .map(|name| (name.as_str(), self.local(name)))
            .collect();
        locals.sort_by(|a, b| a.0.cmp(b.0));
        locals
    }

    pub fn render_local(&self, name: &str, depth: usize) -> String {
        self.refs.render_value(self.local(name), depth)
    }

    /// Reference table the frame's values live in
    pub fn refs(&self) -> &RefMap {
        &self.refs
    }

    /// `function (file:line:column)` summary
    pub fn location(&self) -> String {
        format!(
            "{} ({}:{}:{})",
            self.function_name,
            self.source_file.as_deref().unwrap_or("<unknown>"),
            self.line,
            self.column
        )
    }
}

/// Build the frame list of a backtrace response
pub fn from_backtrace(response: &Response, scripts: &HashMap<i64, Script>) -> Vec<StackFrame> {
    let refs = Arc::new(RefMap::materialize(response.refs()));
    let frames = response
        .body
        .as_ref()
        .and_then(|body| body.get("frames"))
        .and_then(Json::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    frames
        .iter()
        .enumerate()
        .map(|(position, frame)| build_frame(position, frame, &refs, scripts))
        .collect()
}

fn build_frame(
    position: usize,
    frame: &Json,
    refs: &Arc<RefMap>,
    scripts: &HashMap<i64, Script>,
) -> StackFrame {
    let func_handle = ref_of(frame.get("func"));
    let function = func_handle
        .and_then(|h| refs.get(h).composite())
        .and_then(|c| c.function.as_ref());

    let function_name = function
        .map(|f| f.display_name().to_string())
        .unwrap_or_else(|| "<anonymous>".to_string());

    let source_file = function
        .and_then(|f| f.script_id)
        .and_then(|id| scripts.get(&id))
        .map(|s| s.name.clone())
        .or_else(|| {
            ref_of(frame.get("script"))
                .and_then(|h| refs.script(h))
                .map(|s| s.name.clone())
        })
        .filter(|name| !name.is_empty());

    let mut locals = HashMap::new();
    for list in ["arguments", "locals"] {
        for slot in frame
            .get(list)
            .and_then(Json::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
        {
            let Some(name) = slot.get("name").and_then(Json::as_str) else {
                continue;
            };
            let handle = ref_of(slot.get("value")).filter(|h| refs.contains(*h));
            locals.insert(name.to_string(), handle);
        }
    }

    StackFrame {
        index: frame
            .get("index")
            .and_then(Json::as_u64)
            .and_then(|i| u32::try_from(i).ok())
            .unwrap_or(position as u32),
        function_name,
        source_file,
        line: one_based(frame.get("line")),
        column: one_based(frame.get("column")),
        is_constructor: flag(frame, "constructCall"),
        is_internal: flag(frame, "debuggerFrame"),
        locals,
        refs: Arc::clone(refs),
    }
}

fn ref_of(value: Option<&Json>) -> Option<Handle> {
    value?.get("ref").and_then(Json::as_i64)
}

fn one_based(value: Option<&Json>) -> u32 {
    value
        .and_then(Json::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .map(|v| v.saturating_add(1))
        .unwrap_or(0)
}

fn flag(frame: &Json, key: &str) -> bool {
    frame.get(key).and_then(Json::as_bool).unwrap_or(false)
}
