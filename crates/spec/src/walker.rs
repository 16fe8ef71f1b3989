//! Data-driven validation of decoded JSON trees.
//!
//! A [`SchemaNode`] describes what one position in the tree may hold. The
//! [`Walker`] checks a value against its node, reports every violation to
//! the bundle, and recurses into children. Checks that cannot be expressed
//! declaratively hang off a node as `process`/`child_process` callbacks,
//! which receive the walker so they can report, read the root document, or
//! walk sub-trees against schemas of their own.

use std::collections::{BTreeMap, HashSet};

use appvalidator_report::{Diagnostic, ErrorBundle, MessageKind, Text};
use regex::Regex;
use serde_json::{Map, Value};

/// JSON shapes a node may be required to have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Object,
    Array,
    String,
    Integer,
    Number,
    Bool,
}

impl Kind {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Kind::Object => value.is_object(),
            Kind::Array => value.is_array(),
            Kind::String => value.is_string(),
            Kind::Integer => value.is_i64() || value.is_u64(),
            Kind::Number => value.is_number(),
            Kind::Bool => value.is_boolean(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Kind::Object => "object",
            Kind::Array => "array",
            Kind::String => "string",
            Kind::Integer => "integer",
            Kind::Number => "number",
            Kind::Bool => "boolean",
        }
    }
}

pub const OBJECT: &[Kind] = &[Kind::Object];
pub const ARRAY: &[Kind] = &[Kind::Array];
pub const STRING: &[Kind] = &[Kind::String];
pub const BOOL: &[Kind] = &[Kind::Bool];
pub const NUMBER: &[Kind] = &[Kind::Number];
/// Any JSON scalar other than null
pub const LITERAL: &[Kind] = &[Kind::String, Kind::Number, Kind::Bool];
/// A string or a list of them
pub const DESCRIPTION: &[Kind] = &[Kind::String, Kind::Array];

/// Callback run on a node's raw value.
pub type Process = fn(&mut Walker<'_>, &Value);
/// Callback run on each `(name, value)` child of an object.
pub type ChildProcess = fn(&mut Walker<'_>, &str, &Value);
/// Decides from the sibling keys whether a node is required.
pub type Predicate = fn(&Map<String, Value>) -> bool;

/// How a node's children are described
#[derive(Debug, Clone, Default)]
pub enum Children {
    #[default]
    None,
    /// Per-key schemas for an object; `"*"` applies to every other key
    Named(BTreeMap<String, SchemaNode>),
    /// One schema for every element of an array
    Each(Box<SchemaNode>),
}

#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub expected_type: Option<&'static [Kind]>,
    pub required_nodes: Vec<String>,
    pub required_nodes_when: Vec<(String, Predicate)>,
    pub allowed_once_nodes: Vec<String>,
    pub allowed_nodes: Vec<String>,
    pub disallowed_nodes: Vec<String>,
    pub child_nodes: Children,
    pub unknown_node_level: MessageKind,
    pub not_empty: bool,
    pub max_length: Option<usize>,
    pub values: Vec<Value>,
    pub value_matches: Option<Regex>,
    pub process: Option<Process>,
    pub child_process: Option<ChildProcess>,
}

impl Default for SchemaNode {
    fn default() -> Self {
        Self {
            expected_type: None,
            required_nodes: Vec::new(),
            required_nodes_when: Vec::new(),
            allowed_once_nodes: Vec::new(),
            allowed_nodes: Vec::new(),
            disallowed_nodes: Vec::new(),
            child_nodes: Children::None,
            unknown_node_level: MessageKind::Warning,
            not_empty: false,
            max_length: None,
            values: Vec::new(),
            value_matches: None,
            process: None,
            child_process: None,
        }
    }
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

impl SchemaNode {
    pub fn of(kinds: &'static [Kind]) -> Self {
        Self { expected_type: Some(kinds), ..Self::default() }
    }

    pub fn required(mut self, names: &[&str]) -> Self {
        self.required_nodes.extend(owned(names));
        self
    }

    pub fn required_when(mut self, name: &str, predicate: Predicate) -> Self {
        self.required_nodes_when.push((name.to_string(), predicate));
        self
    }

    pub fn once(mut self, names: &[&str]) -> Self {
        self.allowed_once_nodes.extend(owned(names));
        self
    }

    pub fn allowed(mut self, names: &[&str]) -> Self {
        self.allowed_nodes.extend(owned(names));
        self
    }

    pub fn disallowed(mut self, names: &[&str]) -> Self {
        self.disallowed_nodes.extend(owned(names));
        self
    }

    /// Adds a schema for the child `name` (`"*"` for any key).
    pub fn child(mut self, name: &str, node: SchemaNode) -> Self {
        match &mut self.child_nodes {
            Children::Named(children) => {
                children.insert(name.to_string(), node);
            }
            slot => {
                let mut children = BTreeMap::new();
                children.insert(name.to_string(), node);
                *slot = Children::Named(children);
            }
        }
        self
    }

    /// Sets the schema every array element must satisfy.
    pub fn each(mut self, node: SchemaNode) -> Self {
        self.child_nodes = Children::Each(Box::new(node));
        self
    }

    pub fn unknown_level(mut self, kind: MessageKind) -> Self {
        self.unknown_node_level = kind;
        self
    }

    pub fn not_empty(mut self) -> Self {
        self.not_empty = true;
        self
    }

    pub fn max_length(mut self, length: usize) -> Self {
        self.max_length = Some(length);
        self
    }

    pub fn values<V: Into<Value> + Clone>(mut self, values: &[V]) -> Self {
        self.values.extend(values.iter().cloned().map(Into::into));
        self
    }

    pub fn matches(mut self, pattern: Regex) -> Self {
        self.value_matches = Some(pattern);
        self
    }

    pub fn process(mut self, process: Process) -> Self {
        self.process = Some(process);
        self
    }

    pub fn child_process(mut self, process: ChildProcess) -> Self {
        self.child_process = Some(process);
        self
    }

    /// The named child schema, if there is one.
    pub fn named_child(&self, name: &str) -> Option<&SchemaNode> {
        match &self.child_nodes {
            Children::Named(children) => children.get(name),
            _ => None,
        }
    }

    pub fn named_child_mut(&mut self, name: &str) -> Option<&mut SchemaNode> {
        match &mut self.child_nodes {
            Children::Named(children) => children.get_mut(name),
            _ => None,
        }
    }

    /// Whether `name` may appear in an object described by this node.
    fn knows(&self, name: &str) -> bool {
        self.named_child(name).is_some()
            || self.allowed_nodes.iter().any(|n| n == name || n == "*")
            || self.allowed_once_nodes.iter().any(|n| n == name)
            || self.required_nodes.iter().any(|n| n == name)
            || self.required_nodes_when.iter().any(|(n, _)| n == name)
    }
}

fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

/// Walks one document against a schema, reporting into `err`.
pub struct Walker<'a> {
    pub err: &'a mut ErrorBundle,
    root: &'a Value,
    path: Vec<String>,
    more_info: &'static str,
}

impl<'a> Walker<'a> {
    pub fn new(err: &'a mut ErrorBundle, root: &'a Value, more_info: &'static str) -> Self {
        Self { err, root, path: Vec::new(), more_info }
    }

    /// The whole document being validated.
    pub fn root(&self) -> &'a Value {
        self.root
    }

    /// Names from the root down to the node being checked.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Name of the node being checked.
    pub fn current(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("root")
    }

    pub fn more_info(&self) -> &'static str {
        self.more_info
    }

    fn location(&self) -> String {
        self.path.join(" > ")
    }

    /// Reports at `kind`, appending the node location and the pointer to
    /// more documentation to the description.
    pub fn report(&mut self, kind: MessageKind, id: &[&str], message: impl Into<Text>, description: impl Into<Text>) {
        let mut description = description.into();
        if !self.path.is_empty() {
            description.push(format!("Location: {}", self.location()));
        }
        description.push(self.more_info);
        self.err.report(kind, Diagnostic::new(id.iter().copied(), message).description(description));
    }

    pub fn error(&mut self, id: &[&str], message: impl Into<Text>, description: impl Into<Text>) {
        self.report(MessageKind::Error, id, message, description);
    }

    pub fn warning(&mut self, id: &[&str], message: impl Into<Text>, description: impl Into<Text>) {
        self.report(MessageKind::Warning, id, message, description);
    }

    pub fn notice(&mut self, id: &[&str], message: impl Into<Text>, description: impl Into<Text>) {
        self.report(MessageKind::Notice, id, message, description);
    }

    /// Checks the value under the cursor against a second schema, reporting
    /// at the current location.
    pub fn check_in_place(&mut self, value: &Value, node: &SchemaNode) {
        let name = self.current().to_string();
        self.iterate(&name, value, node);
    }

    /// Checks `value`, known as `name`, against `node`.
    pub fn walk(&mut self, name: &str, value: &Value, node: &SchemaNode) {
        self.path.push(name.to_string());
        self.iterate(name, value, node);
        self.path.pop();
    }

    fn iterate(&mut self, name: &str, value: &Value, node: &SchemaNode) {
        if let Some(kinds) = node.expected_type {
            if !kinds.iter().any(|kind| kind.matches(value)) {
                let expected: Vec<&str> = kinds.iter().map(|kind| kind.name()).collect();
                self.error(
                    &["spec", "iterate", "bad_type"],
                    format!("`{}` is of an unexpected type.", name),
                    vec![
                        format!("A node in the manifest was found to be of an unexpected type. `{}` is expected to be of type {}.", name, expected.join(" or ")),
                        format!("Found type: {}", describe_value(value)),
                    ],
                );
                return;
            }
        }

        if node.not_empty && is_empty(value) {
            self.error(
                &["spec", "iterate", "empty"],
                format!("`{}` is empty.", name),
                format!("`{}` is expected to contain a value, but it was found to be empty.", name),
            );
            return;
        }

        if let Value::String(text) = value {
            if let Some(max) = node.max_length {
                if text.chars().count() > max {
                    self.error(
                        &["spec", "iterate", "max_length"],
                        format!("`{}` is too long.", name),
                        vec![
                            format!("The value of `{}` may not be longer than {} characters.", name, max),
                            format!("Found length: {}", text.chars().count()),
                        ],
                    );
                }
            }
            if let Some(pattern) = &node.value_matches {
                let full = pattern.find(text).map_or(false, |m| m.start() == 0 && m.end() == text.len());
                if !full {
                    self.error(
                        &["spec", "iterate", "value_pattern_fail"],
                        format!("`{}` contains an invalid value.", name),
                        vec![
                            format!("The value of `{}` does not match the required format.", name),
                            format!("Found value: {}", text),
                        ],
                    );
                }
            }
        }

        if !node.values.is_empty() && !value.is_object() && !value.is_array() && !node.values.contains(value) {
            let allowed: Vec<String> = node.values.iter().map(render_scalar).collect();
            self.error(
                &["spec", "iterate", "bad_value"],
                format!("`{}` contains an invalid value.", name),
                vec![
                    format!("The value of `{}` must be one of: {}", name, allowed.join(", ")),
                    format!("Found value: {}", render_scalar(value)),
                ],
            );
        }

        if let Some(process) = node.process {
            process(self, value);
        }

        match value {
            Value::Object(map) => self.iterate_object(name, map, node),
            Value::Array(items) => {
                if let Children::Each(element) = &node.child_nodes {
                    for (index, item) in items.iter().enumerate() {
                        self.walk(&format!("{}[{}]", name, index), item, element);
                    }
                }
            }
            _ => {}
        }
    }

    fn iterate_object(&mut self, name: &str, map: &Map<String, Value>, node: &SchemaNode) {
        for required in &node.required_nodes {
            if !map.contains_key(required) {
                self.error(
                    &["spec", "iterate", "missing_req"],
                    format!("`{}` is missing a required element.", name),
                    format!("Required element `{}` is missing from `{}`.", required, name),
                );
            }
        }
        for (required, predicate) in &node.required_nodes_when {
            if !map.contains_key(required) && predicate(map) {
                self.error(
                    &["spec", "iterate", "missing_req_cond"],
                    format!("`{}` is missing a conditionally required element.", name),
                    format!("`{}` must be present in `{}` given the other elements it contains.", required, name),
                );
            }
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for (child_name, child) in map {
            if node.disallowed_nodes.iter().any(|n| n == child_name) {
                self.error(
                    &["spec", "iterate", "not_allowed"],
                    "Element not allowed.",
                    format!("The element `{}` is not allowed in `{}`.", child_name, name),
                );
                continue;
            }

            if node.allowed_once_nodes.iter().any(|n| n == child_name) && !seen.insert(child_name) {
                self.error(
                    &["spec", "iterate", "duplicate"],
                    "Duplicate element found.",
                    format!("The element `{}` may only appear once in `{}`.", child_name, name),
                );
                continue;
            }

            if !node.knows(child_name) {
                self.report(
                    node.unknown_node_level,
                    &["spec", "iterate", "unknown"],
                    "Unknown element found.",
                    format!("The element `{}` in `{}` is not recognised.", child_name, name),
                );
                continue;
            }

            if let Some(child_node) = node.named_child(child_name).or_else(|| node.named_child("*")) {
                self.walk(child_name, child, child_node);
            }
        }

        if let Some(child_process) = node.child_process {
            for (child_name, child) in map {
                self.path.push(child_name.clone());
                child_process(self, child_name, child);
                self.path.pop();
            }
        }
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run(node: &SchemaNode, value: &Value) -> ErrorBundle {
        let mut err = ErrorBundle::new(false);
        let mut walker = Walker::new(&mut err, value, "See the docs.");
        walker.walk("root", value, node);
        err
    }

    fn ids(err: &ErrorBundle) -> Vec<String> {
        err.messages().map(|m| m.id.join(".")).collect()
    }

    #[test]
    fn test_type_mismatch_stops_descent() {
        let node = SchemaNode::of(OBJECT).required(&["a"]);
        let err = run(&node, &json!([1, 2]));
        assert_eq!(ids(&err), vec!["spec.iterate.bad_type"]);
    }

    #[test]
    fn test_required_and_conditional() {
        let node = SchemaNode::of(OBJECT)
            .required(&["name"])
            .required_when("default_locale", |map| map.contains_key("locales"))
            .allowed(&["locales"]);
        let err = run(&node, &json!({"locales": {}}));
        assert_eq!(ids(&err), vec!["spec.iterate.missing_req", "spec.iterate.missing_req_cond"]);
    }

    #[test]
    fn test_string_constraints() {
        let node = SchemaNode::of(OBJECT)
            .child("short", SchemaNode::of(STRING).max_length(3))
            .child("pick", SchemaNode::of(STRING).values(&["a", "b"]))
            .child("fmt", SchemaNode::of(STRING).matches(Regex::new(r"[0-9]+").unwrap()))
            .child("full", SchemaNode::of(STRING).not_empty());
        let err = run(&node, &json!({"short": "abcd", "pick": "c", "fmt": "12a", "full": ""}));
        let mut found = ids(&err);
        found.sort();
        assert_eq!(
            found,
            vec![
                "spec.iterate.bad_value",
                "spec.iterate.empty",
                "spec.iterate.max_length",
                "spec.iterate.value_pattern_fail",
            ]
        );
    }

    #[test]
    fn test_unknown_and_disallowed() {
        let node = SchemaNode::of(OBJECT).disallowed(&["widget"]).allowed(&["ok"]);
        let err = run(&node, &json!({"widget": 1, "mystery": 2, "ok": 3}));
        assert_eq!(err.errors().len(), 1);
        assert_eq!(err.warnings().len(), 1);
        assert_eq!(err.warnings()[0].id, vec!["spec", "iterate", "unknown"]);

        let strict = SchemaNode::of(OBJECT).unknown_level(MessageKind::Error);
        let err = run(&strict, &json!({"mystery": 2}));
        assert_eq!(err.errors().len(), 1);
    }

    #[test]
    fn test_wildcard_children_and_lists() {
        let node = SchemaNode::of(OBJECT)
            .allowed(&["*"])
            .child("*", SchemaNode::of(ARRAY).each(SchemaNode::of(STRING)));
        let err = run(&node, &json!({"x": ["a", 1], "y": ["b"]}));
        assert_eq!(ids(&err), vec!["spec.iterate.bad_type"]);
    }

    #[test]
    fn test_callbacks_see_the_path() {
        fn process(walker: &mut Walker<'_>, value: &Value) {
            let message = format!("{} = {}", walker.path().join("/"), value);
            walker.notice(&["test", "seen"], message, "");
        }
        fn child(walker: &mut Walker<'_>, name: &str, _: &Value) {
            let message = format!("child {} at {}", name, walker.current());
            walker.notice(&["test", "child", name], message, "");
        }
        let node = SchemaNode::of(OBJECT)
            .allowed(&["*"])
            .child("leaf", SchemaNode::of(NUMBER).process(process))
            .child_process(child);
        let err = run(&node, &json!({"leaf": 5}));
        let messages: Vec<String> = err.notices().iter().map(|m| m.message.flatten()).collect();
        assert_eq!(messages, vec!["root/leaf = 5", "child leaf at leaf"]);
    }
}
