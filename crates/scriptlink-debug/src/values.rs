//! Runtime value materialization
//!
//! Responses describe values as a flat table of handle-tagged descriptors:
//! ```text
//! [{"handle":1,"type":"object","className":"Object","properties":[{"name":"other","ref":2}]},
//!  {"handle":2,"type":"object","className":"Object","properties":[{"name":"other","ref":1}]}]
//! ```
//! [`RefMap::materialize`] turns such a table into a handle → [`Value`] map.
//! Composite values hold handles rather than owned children, so cyclic
//! graphs are represented without reference cycles and every lookup goes
//! through the map that owns them.

use serde_json::Value as Json;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::debug;

/// Identifier of a value inside one response's reference table
pub type Handle = i64;

/// A materialized runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Object(Composite),
    Function(Composite),
    Frame(Composite),
    /// Placeholder for anything that could not be resolved
    Unknown,
}

static UNDEFINED: Value = Value::Undefined;
static NULL: Value = Value::Null;
static TRUE: Value = Value::Boolean(true);
static FALSE: Value = Value::Boolean(false);
static UNKNOWN: Value = Value::Unknown;

impl Value {
    pub fn undefined() -> &'static Value {
        &UNDEFINED
    }

    pub fn null() -> &'static Value {
        &NULL
    }

    pub fn boolean(value: bool) -> &'static Value {
        if value {
            &TRUE
        } else {
            &FALSE
        }
    }

    pub fn unknown() -> &'static Value {
        &UNKNOWN
    }

    /// Descriptor type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Frame(_) => "frame",
            Value::Unknown => "unknown",
        }
    }

    /// Property-bearing part of an object, function or frame
    pub fn composite(&self) -> Option<&Composite> {
        match self {
            Value::Object(c) | Value::Function(c) | Value::Frame(c) => Some(c),
            _ => None,
        }
    }

    fn composite_mut(&mut self) -> Option<&mut Composite> {
        match self {
            Value::Object(c) | Value::Function(c) | Value::Frame(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }
}

/// Shared state of objects, functions and frames.
///
/// Properties map a name to the handle of its value; `None` marks a
/// reference the table could not resolve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composite {
    pub class_name: Option<String>,
    pub properties: HashMap<String, Option<Handle>>,
    pub prototype: Option<Handle>,
    pub function: Option<FunctionInfo>,
    /// Runtime-provided display text
    pub text: Option<String>,
}

/// Source metadata of a function value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionInfo {
    pub name: String,
    pub inferred_name: String,
    pub script_id: Option<i64>,
    /// 1-based line of the function's definition
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl FunctionInfo {
    /// Name to show: declared name, then inferred name, then `<anonymous>`
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else if !self.inferred_name.is_empty() {
            &self.inferred_name
        } else {
            "<anonymous>"
        }
    }
}

/// Script descriptor embedded in a reference table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRef {
    pub id: Option<i64>,
    pub name: String,
}

/// Handle → value table for one response
#[derive(Debug, Clone, Default)]
pub struct RefMap {
    /// Primitive constants are borrowed from the process-wide statics
    values: HashMap<Handle, Cow<'static, Value>>,
    scripts: HashMap<Handle, ScriptRef>,
}

impl RefMap {
    /// Build a map from a flat descriptor array.
    ///
    /// Pass 1 creates a stub for every handle from its type tag alone. Pass 2
    /// fills in properties, prototypes and function metadata by looking up
    /// handles in the already-complete map, so forward and cyclic references
    /// resolve without recursion.
    pub fn materialize<'a, I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = &'a Json>,
    {
        let descriptors: Vec<&Json> = descriptors.into_iter().collect();
        let mut map = RefMap::default();

        for descriptor in &descriptors {
            let Some(handle) = descriptor.get("handle").and_then(Json::as_i64) else {
                debug!("Skipping descriptor without handle");
                continue;
            };
            if descriptor.get("type").and_then(Json::as_str) == Some("script") {
                map.scripts.insert(handle, script_ref(descriptor));
                continue;
            }
            map.values.insert(handle, stub(descriptor));
        }

        for descriptor in &descriptors {
            let Some(handle) = descriptor.get("handle").and_then(Json::as_i64) else {
                continue;
            };
            let resolved = match map.values.get(&handle) {
                Some(value) if value.composite().is_some() => map.resolve(handle, value, descriptor),
                _ => continue,
            };
            if let Some(composite) = map
                .values
                .get_mut(&handle)
                .and_then(|value| value.to_mut().composite_mut())
            {
                *composite = resolved;
            }
        }

        map
    }

    /// Pass 2 for one composite descriptor
    fn resolve(&self, handle: Handle, stub: &Value, descriptor: &Json) -> Composite {
        let mut composite = stub.composite().cloned().unwrap_or_default();

        let property_lists: &[&str] = match stub {
            Value::Frame(_) => &["arguments", "locals"],
            _ => &["properties"],
        };
        for list in property_lists {
            for property in descriptor
                .get(*list)
                .and_then(Json::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[])
            {
                let Some(name) = property_name(property) else {
                    continue;
                };
                // Frame slots nest the reference under "value"
                let reference = property
                    .get("ref")
                    .or_else(|| property.get("value").and_then(|v| v.get("ref")))
                    .and_then(Json::as_i64);
                let target = reference.filter(|r| self.values.contains_key(r));
                if target.is_none() {
                    debug!(handle, property = %name, reference = ?reference, "Unresolved property reference");
                }
                composite.properties.insert(name, target);
            }
        }

        composite.prototype = descriptor
            .get("protoObject")
            .and_then(|p| p.get("ref"))
            .and_then(Json::as_i64)
            .filter(|r| self.values.contains_key(r));

        if let Value::Function(_) = stub {
            composite.function = Some(FunctionInfo {
                name: str_field(descriptor, "name"),
                inferred_name: str_field(descriptor, "inferredName"),
                script_id: descriptor.get("scriptId").and_then(Json::as_i64),
                line: u32_field(descriptor, "line").map(|l| l + 1),
                column: u32_field(descriptor, "column").map(|c| c + 1),
            });
        }

        composite
    }

    /// Value for `handle`, or [`Value::Unknown`] when absent
    pub fn get(&self, handle: Handle) -> &Value {
        self.values
            .get(&handle)
            .map(|value| &**value)
            .unwrap_or(Value::unknown())
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.values.contains_key(&handle)
    }

    /// Named property of a composite value
    pub fn property(&self, handle: Handle, name: &str) -> &Value {
        self.get(handle)
            .composite()
            .and_then(|c| c.properties.get(name))
            .and_then(|target| target.map(|h| self.get(h)))
            .unwrap_or(Value::unknown())
    }

    /// Properties of a composite value, sorted by name
    pub fn properties(&self, handle: Handle) -> Vec<(&str, &Value)> {
        self.get(handle)
            .composite()
            .map(|c| self.sorted_properties(c))
            .unwrap_or_default()
    }

    /// Prototype of an object, or [`Value::Unknown`]
    pub fn prototype(&self, handle: Handle) -> &Value {
        self.get(handle)
            .composite()
            .and_then(|c| c.prototype)
            .map(|h| self.get(h))
            .unwrap_or(Value::unknown())
    }

    /// Script descriptor stored under `handle`
    pub fn script(&self, handle: Handle) -> Option<&ScriptRef> {
        self.scripts.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Render the value under `handle`, expanding at most `depth` levels
    pub fn render(&self, handle: Handle, depth: usize) -> String {
        self.render_value(self.get(handle), depth)
    }

    /// Like [`RefMap::render`] but truncating strings longer than `max_len`
    pub fn render_truncated(&self, handle: Handle, depth: usize, max_len: usize) -> String {
        let mut out = String::new();
        self.write_value(&mut out, self.get(handle), depth, Some(max_len));
        out
    }

    /// Render a value that belongs to this table
    pub fn render_value(&self, value: &Value, depth: usize) -> String {
        let mut out = String::new();
        self.write_value(&mut out, value, depth, None);
        out
    }

    fn write_value(&self, out: &mut String, value: &Value, depth: usize, max_len: Option<usize>) {
        match value {
            Value::Undefined => out.push_str("undefined"),
            Value::Null => out.push_str("null"),
            Value::Boolean(b) => {
                let _ = write!(out, "{}", b);
            }
            Value::Number(n) => out.push_str(&format_number(*n)),
            Value::String(s) => {
                let _ = write!(out, "{:?}", truncate(s, max_len));
            }
            Value::Unknown => out.push_str("<unknown>"),
            Value::Object(_) if depth == 0 => out.push_str("<object>"),
            Value::Function(_) if depth == 0 => out.push_str("<function>"),
            Value::Frame(_) if depth == 0 => out.push_str("<frame>"),
            Value::Function(c) => {
                let name = c
                    .function
                    .as_ref()
                    .map(FunctionInfo::display_name)
                    .unwrap_or("<anonymous>");
                let _ = write!(out, "function {}()", name);
            }
            Value::Object(c) => {
                out.push_str(c.class_name.as_deref().unwrap_or("Object"));
                out.push(' ');
                self.write_properties(out, c, depth, max_len);
            }
            Value::Frame(c) => {
                out.push_str("frame ");
                self.write_properties(out, c, depth, max_len);
            }
        }
    }

    fn write_properties(
        &self,
        out: &mut String,
        composite: &Composite,
        depth: usize,
        max_len: Option<usize>,
    ) {
        out.push('{');
        for (i, (name, value)) in self.sorted_properties(composite).into_iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(name);
            out.push_str(": ");
            self.write_value(out, value, depth - 1, max_len);
        }
        out.push('}');
    }

    fn sorted_properties<'a>(&'a self, composite: &'a Composite) -> Vec<(&'a str, &'a Value)> {
        let mut properties: Vec<(&str, &Value)> = composite
            .properties
            .iter()
            .map(|(name, target)| {
                let value = target.map(|h| self.get(h)).unwrap_or(Value::unknown());
                (name.as_str(), value)
            })
            .collect();
        properties.sort_by(|a, b| a.0.cmp(b.0));
        properties
    }
}

/// Result of evaluating an expression
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Handle of the result inside `refs`
    pub handle: Option<Handle>,
    /// Runtime-provided display text of the result
    pub text: Option<String>,
    pub refs: RefMap,
}

impl Evaluation {
    /// Build from an `evaluate` response: the body describes the result
    /// itself, `refs` describes the values it points to.
    pub fn from_body(body: &Json, refs: &[Json]) -> Self {
        Self {
            handle: body.get("handle").and_then(Json::as_i64),
            text: body.get("text").and_then(Json::as_str).map(str::to_string),
            refs: RefMap::materialize(refs.iter().chain(std::iter::once(body))),
        }
    }

    pub fn value(&self) -> &Value {
        match self.handle {
            Some(handle) => self.refs.get(handle),
            None => Value::unknown(),
        }
    }

    pub fn render(&self, depth: usize) -> String {
        self.render_with(depth, None)
    }

    pub fn render_truncated(&self, depth: usize, max_len: usize) -> String {
        self.render_with(depth, Some(max_len))
    }

    fn render_with(&self, depth: usize, max_len: Option<usize>) -> String {
        match (self.value(), &self.text) {
            (Value::Unknown, Some(text)) => text.clone(),
            (value, _) => {
                let mut out = String::new();
                self.refs.write_value(&mut out, value, depth, max_len);
                out
            }
        }
    }
}

/// Pass 1: value shell from the type tag alone
fn stub(descriptor: &Json) -> Cow<'static, Value> {
    let type_tag = descriptor.get("type").and_then(Json::as_str).unwrap_or("");
    let class_name = descriptor
        .get("className")
        .and_then(Json::as_str)
        .map(str::to_string);
    let text = descriptor
        .get("text")
        .and_then(Json::as_str)
        .map(str::to_string);
    let shell = || Composite {
        class_name: class_name.clone(),
        text: text.clone(),
        ..Composite::default()
    };

    let owned = match type_tag {
        "undefined" => return Cow::Borrowed(Value::undefined()),
        "null" => return Cow::Borrowed(Value::null()),
        "boolean" => match descriptor.get("value").and_then(Json::as_bool) {
            Some(b) => return Cow::Borrowed(Value::boolean(b)),
            None => return Cow::Borrowed(Value::unknown()),
        },
        "number" => descriptor
            .get("value")
            .and_then(Json::as_f64)
            .or_else(|| text.as_deref().and_then(parse_special_number))
            .map(Value::Number)
            .unwrap_or(Value::Unknown),
        "string" => match descriptor.get("value").and_then(Json::as_str) {
            Some(s) => Value::String(s.to_string()),
            None => Value::Unknown,
        },
        "function" => Value::Function(shell()),
        "frame" => Value::Frame(shell()),
        "object" | "regexp" | "error" | "date" | "promise" | "map" | "set" | "symbol" => {
            Value::Object(shell())
        }
        other => {
            debug!(type_tag = other, "Unsupported value descriptor type");
            return Cow::Borrowed(Value::unknown());
        }
    };
    Cow::Owned(owned)
}

fn script_ref(descriptor: &Json) -> ScriptRef {
    ScriptRef {
        id: descriptor.get("id").and_then(Json::as_i64),
        name: str_field(descriptor, "name"),
    }
}

fn property_name(property: &Json) -> Option<String> {
    match property.get("name")? {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn str_field(descriptor: &Json, key: &str) -> String {
    descriptor
        .get(key)
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_string()
}

fn u32_field(descriptor: &Json, key: &str) -> Option<u32> {
    descriptor
        .get(key)
        .and_then(Json::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

fn parse_special_number(text: &str) -> Option<f64> {
    match text {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn truncate(s: &str, max_len: Option<usize>) -> String {
    match max_len {
        Some(max) if s.chars().count() > max => {
            let kept: String = s.chars().take(max.saturating_sub(3)).collect();
            format!("{}...", kept)
        }
        _ => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cyclic_pair() -> Vec<Json> {
        vec![
            json!({"handle": 1, "type": "object", "className": "Object",
                   "properties": [{"name": "other", "ref": 2}]}),
            json!({"handle": 2, "type": "object", "className": "Object",
                   "properties": [{"name": "other", "ref": 1}]}),
        ]
    }

    #[test]
    fn test_primitive_singletons() {
        assert!(std::ptr::eq(Value::undefined(), Value::undefined()));
        assert!(std::ptr::eq(Value::boolean(true), Value::boolean(true)));
        assert!(!std::ptr::eq(Value::boolean(true), Value::boolean(false)));
        assert_eq!(Value::null(), &Value::Null);
    }

    #[test]
    fn test_primitive_descriptors() {
        let refs = vec![
            json!({"handle": 1, "type": "undefined"}),
            json!({"handle": 2, "type": "null"}),
            json!({"handle": 3, "type": "boolean", "value": true}),
            json!({"handle": 4, "type": "number", "value": 42}),
            json!({"handle": 5, "type": "number", "text": "NaN"}),
            json!({"handle": 6, "type": "string", "value": "hi"}),
        ];
        let map = RefMap::materialize(&refs);
        assert_eq!(map.len(), 6);
        assert_eq!(map.get(1), &Value::Undefined);
        assert_eq!(map.get(2), &Value::Null);
        assert_eq!(map.get(3), &Value::Boolean(true));
        assert_eq!(map.render(4, 0), "42");
        assert_eq!(map.render(5, 0), "NaN");
        assert_eq!(map.render(6, 0), "\"hi\"");
    }

    #[test]
    fn test_cyclic_objects_materialize_and_render() {
        let map = RefMap::materialize(&cyclic_pair());

        assert!(matches!(map.property(1, "other"), Value::Object(_)));
        assert!(matches!(map.property(2, "other"), Value::Object(_)));

        let rendered = map.render(1, 1);
        assert!(rendered.contains("other"), "rendered: {}", rendered);
        assert_eq!(rendered, "Object {other: <object>}");

        // Deep budgets still terminate on the cycle
        let deep = map.render(1, 6);
        assert_eq!(deep.matches("other").count(), 6);
    }

    #[test]
    fn test_depth_zero_is_opaque() {
        let map = RefMap::materialize(&cyclic_pair());
        assert_eq!(map.render(1, 0), "<object>");
    }

    #[test]
    fn test_unknown_handle_yields_unknown() {
        let refs = vec![json!({"handle": 1, "type": "object",
                                "properties": [{"name": "missing", "ref": 99}, {"name": "n", "ref": 2}]}),
                        json!({"handle": 2, "type": "number", "value": 1.5})];
        let map = RefMap::materialize(&refs);

        assert!(map.property(1, "missing").is_unknown());
        assert_eq!(map.property(1, "n"), &Value::Number(1.5));
        assert!(map.get(99).is_unknown());
        assert_eq!(map.render(1, 1), "Object {missing: <unknown>, n: 1.5}");
    }

    #[test]
    fn test_malformed_descriptors_never_fault() {
        let refs = vec![
            json!({"type": "object"}),
            json!({"handle": 3, "type": "boolean"}),
            json!({"handle": 4, "type": "weird"}),
            json!("not an object"),
        ];
        let map = RefMap::materialize(&refs);
        assert!(map.get(3).is_unknown());
        assert!(map.get(4).is_unknown());
        assert_eq!(map.render(4, 3), "<unknown>");

        let empty = RefMap::materialize(&[]);
        assert!(empty.is_empty());
        assert!(empty.property(1, "x").is_unknown());
    }

    #[test]
    fn test_function_metadata_and_prototype() {
        let refs = vec![
            json!({"handle": 1, "type": "function", "className": "Function",
                   "name": "", "inferredName": "Point.move", "scriptId": 12,
                   "line": 9, "column": 4, "protoObject": {"ref": 2}}),
            json!({"handle": 2, "type": "object", "className": "Object"}),
        ];
        let map = RefMap::materialize(&refs);
        let info = map.get(1).composite().unwrap().function.clone().unwrap();
        assert_eq!(info.display_name(), "Point.move");
        assert_eq!(info.script_id, Some(12));
        assert_eq!(info.line, Some(10));
        assert_eq!(info.column, Some(5));
        assert!(matches!(map.prototype(1), Value::Object(_)));
        assert_eq!(map.render(1, 1), "function Point.move()");
    }

    #[test]
    fn test_frame_collects_arguments_and_locals() {
        let refs = vec![
            json!({"handle": 5, "type": "frame", "index": 0,
                   "arguments": [{"name": "a", "value": {"ref": 6}}],
                   "locals": [{"name": "b", "value": {"ref": 7}}]}),
            json!({"handle": 6, "type": "number", "value": 1}),
            json!({"handle": 7, "type": "string", "value": "two"}),
        ];
        let map = RefMap::materialize(&refs);
        assert_eq!(map.render(5, 1), "frame {a: 1, b: \"two\"}");
    }

    #[test]
    fn test_array_index_property_names() {
        let refs = vec![
            json!({"handle": 1, "type": "object", "className": "Array",
                   "properties": [{"name": 0, "ref": 2}, {"name": "length", "ref": 3}]}),
            json!({"handle": 2, "type": "string", "value": "x"}),
            json!({"handle": 3, "type": "number", "value": 1}),
        ];
        let map = RefMap::materialize(&refs);
        assert_eq!(map.render(1, 1), "Array {0: \"x\", length: 1}");
    }

    #[test]
    fn test_render_truncated() {
        let refs = vec![json!({"handle": 1, "type": "string", "value": "abcdefghij"})];
        let map = RefMap::materialize(&refs);
        assert_eq!(map.render_truncated(1, 0, 6), "\"abc...\"");
        assert_eq!(map.render_truncated(1, 0, 20), "\"abcdefghij\"");
    }

    #[test]
    fn test_script_descriptors_are_kept_aside() {
        let refs = vec![json!({"handle": 8, "type": "script", "name": "lib/app.js", "id": 31})];
        let map = RefMap::materialize(&refs);
        assert!(map.get(8).is_unknown());
        let script = map.script(8).unwrap();
        assert_eq!(script.name, "lib/app.js");
        assert_eq!(script.id, Some(31));
    }

    #[test]
    fn test_evaluation_includes_body_descriptor() {
        let body = json!({"handle": 40, "type": "object", "className": "Point",
                          "properties": [{"name": "x", "ref": 41}, {"name": "me", "ref": 40}]});
        let refs = vec![json!({"handle": 41, "type": "number", "value": 2})];
        let evaluation = Evaluation::from_body(&body, &refs);

        assert_eq!(evaluation.handle, Some(40));
        assert_eq!(evaluation.render(1), "Point {me: <object>, x: 2}");
        assert_eq!(evaluation.render(0), "<object>");
    }

    #[test]
    fn test_evaluation_without_handle_uses_text() {
        let body = json!({"type": "number", "text": "3"});
        let evaluation = Evaluation::from_body(&body, &[]);
        assert_eq!(evaluation.render(2), "3");
        assert!(evaluation.value().is_unknown());
    }

    #[test]
    fn test_primitives_share_process_wide_constants() {
        let first = RefMap::materialize(&[
            json!({"handle": 1, "type": "null"}),
            json!({"handle": 2, "type": "boolean", "value": true}),
        ]);
        let second = RefMap::materialize(&[json!({"handle": 7, "type": "null"})]);

        assert!(std::ptr::eq(first.get(1), second.get(7)));
        assert!(std::ptr::eq(first.get(1), Value::null()));
        assert!(std::ptr::eq(first.get(2), Value::boolean(true)));
    }
}
