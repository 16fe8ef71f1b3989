//! Arena-backed syntax trees in the Reflect dialect.
//!
//! Nodes are addressed by [`NodeId`]. Each node keeps its `type`, the start
//! position, and its remaining keys as [`Field`]s: child nodes, lists of
//! optional child nodes, or plain JSON values such as operators and names.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{ParseError, ParseResult};

/// Handle to a node in an [`Ast`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Node(NodeId),
    List(Vec<Option<NodeId>>),
    Value(Value),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub node_type: String,
    /// 1-based line of the node start, 0 when unknown
    pub line: usize,
    /// 0-based column of the node start
    pub column: usize,
    fields: BTreeMap<String, Field>,
}

impl Node {
    pub fn new(node_type: impl Into<String>, line: usize, column: usize) -> Self {
        Self { node_type: node_type.into(), line, column, fields: BTreeMap::new() }
    }

    pub fn set(&mut self, key: &str, field: Field) {
        self.fields.insert(key.to_string(), field);
    }

    pub fn with(mut self, key: &str, field: Field) -> Self {
        self.set(key, field);
        self
    }

    pub fn with_node(self, key: &str, child: Option<NodeId>) -> Self {
        self.with(key, child.map(Field::Node).unwrap_or(Field::Null))
    }

    pub fn with_list(self, key: &str, children: Vec<Option<NodeId>>) -> Self {
        self.with(key, Field::List(children))
    }

    pub fn with_value(self, key: &str, value: impl Into<Value>) -> Self {
        self.with(key, Field::Value(value.into()))
    }

    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.get(key)
    }

    /// Single child stored under `key`.
    pub fn child(&self, key: &str) -> Option<NodeId> {
        match self.fields.get(key) {
            Some(Field::Node(id)) => Some(*id),
            _ => None,
        }
    }

    /// Children under `key` whether stored as a single node or as a list,
    /// with holes dropped.
    pub fn children(&self, key: &str) -> Vec<NodeId> {
        match self.fields.get(key) {
            Some(Field::Node(id)) => vec![*id],
            Some(Field::List(items)) => items.iter().flatten().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// List under `key` with holes kept, as in `[1,,3]`.
    pub fn list(&self, key: &str) -> Option<&[Option<NodeId>]> {
        match self.fields.get(key) {
            Some(Field::List(items)) => Some(items),
            _ => None,
        }
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        match self.fields.get(key) {
            Some(Field::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.value(key).and_then(Value::as_str)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.value(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// A parsed program
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Rewrites node columns reported in UTF-16 code units, as external
    /// engines count them, into character columns of `source`.
    pub fn utf16_columns_to_chars(&mut self, source: &str) {
        let lines: Vec<&str> = source.split(|c| matches!(c, '\n' | '\u{2028}' | '\u{2029}')).collect();
        for node in &mut self.nodes {
            if let Some(text) = node.line.checked_sub(1).and_then(|index| lines.get(index)) {
                node.column = char_column(text, node.column);
            }
        }
    }

    /// Parses the JSON printed by an external backend.
    pub fn from_json_str(data: &str) -> ParseResult<Self> {
        let value: Value = serde_json::from_str(data).map_err(|e| {
            if e.to_string().contains("recursion limit") {
                ParseError::TooMuchRecursion
            } else {
                ParseError::Malformed(e.to_string())
            }
        })?;
        Self::from_json(&value)
    }

    /// Converts a Reflect/ESTree JSON tree. Position keys other than
    /// `loc.start` are dropped.
    pub fn from_json(value: &Value) -> ParseResult<Self> {
        let mut ast = Ast::new();
        match convert(&mut ast, value) {
            Some(Field::Node(root)) => {
                ast.set_root(root);
                Ok(ast)
            }
            _ => Err(ParseError::Malformed("the tree root is not a node".to_string())),
        }
    }
}

/// Character index of the UTF-16 offset `units` within `line`.
fn char_column(line: &str, units: usize) -> usize {
    let mut seen = 0;
    for (index, c) in line.chars().enumerate() {
        if seen >= units {
            return index;
        }
        seen += c.len_utf16();
    }
    line.chars().count() + units.saturating_sub(seen)
}

const POSITION_KEYS: [&str; 5] = ["type", "loc", "range", "start", "end"];

fn convert(ast: &mut Ast, value: &Value) -> Option<Field> {
    match value {
        Value::Null => Some(Field::Null),
        Value::Object(map) => {
            let Some(node_type) = map.get("type").and_then(Value::as_str) else {
                return Some(Field::Value(value.clone()));
            };
            let start = map.get("loc").and_then(|loc| loc.get("start"));
            let line = start.and_then(|s| s.get("line")).and_then(Value::as_u64).unwrap_or(0);
            let column = start.and_then(|s| s.get("column")).and_then(Value::as_u64).unwrap_or(0);

            let mut node = Node::new(node_type, line as usize, column as usize);
            for (key, child) in map {
                if POSITION_KEYS.contains(&key.as_str()) {
                    continue;
                }
                if let Some(field) = convert(ast, child) {
                    node.set(key, field);
                }
            }
            Some(Field::Node(ast.push(node)))
        }
        Value::Array(items) => {
            let holds_nodes = items
                .iter()
                .any(|item| item.get("type").and_then(Value::as_str).is_some());
            if !holds_nodes && !items.is_empty() && items.iter().any(|i| !i.is_null()) {
                return Some(Field::Value(value.clone()));
            }
            let list = items
                .iter()
                .map(|item| match convert(ast, item) {
                    Some(Field::Node(id)) => Some(id),
                    _ => None,
                })
                .collect();
            Some(Field::List(list))
        }
        other => Some(Field::Value(other.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_from_reflect_json() {
        let tree = json!({
            "type": "Program",
            "loc": {"start": {"line": 1, "column": 0}, "end": {"line": 1, "column": 9}},
            "body": [{
                "type": "ExpressionStatement",
                "loc": {"start": {"line": 2, "column": 4}},
                "expression": {"type": "Literal", "value": 5}
            }]
        });
        let ast = Ast::from_json(&tree).unwrap();
        let root = ast.node(ast.root().unwrap());
        assert_eq!(root.node_type, "Program");
        assert!(!root.has("loc"));

        let body = root.children("body");
        assert_eq!(body.len(), 1);
        let stmt = ast.node(body[0]);
        assert_eq!((stmt.line, stmt.column), (2, 4));

        let literal = ast.node(stmt.child("expression").unwrap());
        assert_eq!(literal.value("value"), Some(&json!(5)));
    }

    #[test]
    fn test_array_holes_are_kept() {
        let tree = json!({
            "type": "ArrayExpression",
            "elements": [{"type": "Literal", "value": 1}, null, {"type": "Literal", "value": 3}]
        });
        let ast = Ast::from_json(&tree).unwrap();
        let root = ast.node(ast.root().unwrap());
        let list = root.list("elements").unwrap();
        assert_eq!(list.len(), 3);
        assert!(list[1].is_none());
        assert_eq!(root.children("elements").len(), 2);
    }

    #[test]
    fn test_regex_literal_keeps_its_value() {
        let tree = json!({"type": "Literal", "value": {}, "regex": {"pattern": "a", "flags": "g"}});
        let ast = Ast::from_json(&tree).unwrap();
        let node = ast.node(ast.root().unwrap());
        assert!(node.has("regex"));
        assert!(node.value("value").unwrap().is_object());
    }

    #[test]
    fn test_deep_json_is_too_much_recursion() {
        let mut data = String::new();
        for _ in 0..200 {
            data.push_str("{\"type\":\"ExpressionStatement\",\"expression\":");
        }
        data.push_str("null");
        for _ in 0..200 {
            data.push('}');
        }
        assert!(matches!(Ast::from_json_str(&data), Err(ParseError::TooMuchRecursion)));
    }

    #[test]
    fn test_root_must_be_a_node() {
        assert!(matches!(Ast::from_json(&json!([1, 2])), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_utf16_columns_become_char_columns() {
        let tree = json!({
            "type": "Program",
            "loc": {"start": {"line": 1, "column": 0}},
            "body": [{"type": "EmptyStatement", "loc": {"start": {"line": 2, "column": 8}}}]
        });
        let mut ast = Ast::from_json(&tree).unwrap();
        ast.utf16_columns_to_chars("// one\nx = '\u{1F600}'; ;");
        let root = ast.node(ast.root().unwrap());
        let stmt = ast.node(root.children("body")[0]);
        assert_eq!((stmt.line, stmt.column), (2, 7));
        assert_eq!(char_column("abc", 5), 5);
    }
}
