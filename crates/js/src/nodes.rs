//! What the traverser does for each kind of node.
//!
//! Every node type maps to the branches walked by default, an optional
//! action, and whether the node yields a value. An action may produce the
//! value itself, or take over the walk of its children entirely.

use std::collections::HashMap;

use appvalidator_report::MessageKind;
use lazy_static::lazy_static;
use serde_json::Value as Json;

use crate::ast::{Field, Node, NodeId};
use crate::instance;
use crate::operators;
use crate::traverser::{DeclKind, Traverser};
use crate::value::{ContextKind, JsObject, Literal, ObjectKind, Value};

pub(crate) enum Flow {
    /// Walk the default branches
    Continue,
    /// The action walked what it needed
    Handled,
    /// The action produced the node's value
    Value(Value),
}

type Action = fn(&mut Traverser<'_>, NodeId) -> Flow;

struct NodeDef {
    branches: &'static [&'static str],
    action: Option<Action>,
    returns: bool,
}

const fn node(branches: &'static [&'static str], action: Option<Action>, returns: bool) -> NodeDef {
    NodeDef { branches, action, returns }
}

const E4X_NODES: [&str; 18] = [
    "XMLDefaultDeclaration",
    "XMLAnyName",
    "XMLQualifiedIdentifier",
    "XMLFunctionQualifiedIdentifier",
    "XMLAttributeSelector",
    "XMLFilterExpression",
    "XMLElement",
    "XMLList",
    "XMLEscape",
    "XMLText",
    "XMLStartTag",
    "XMLEndTag",
    "XMLPointTag",
    "XMLName",
    "XMLAttribute",
    "XMLCdata",
    "XMLComment",
    "XMLProcessingInstruction",
];

lazy_static! {
    static ref DEFINITIONS: HashMap<&'static str, NodeDef> = {
        let mut m = HashMap::new();
        m.insert("EmptyStatement", node(&[], None, false));
        m.insert("DebuggerStatement", node(&[], None, false));

        m.insert("Program", node(&["body"], None, false));
        m.insert("BlockStatement", node(&["body"], Some(block_statement), false));
        m.insert("ExpressionStatement", node(&["expression"], Some(expression_statement), true));
        m.insert("IfStatement", node(&["test", "alternate", "consequent"], None, false));
        m.insert("LabeledStatement", node(&["body"], None, false));
        m.insert("BreakStatement", node(&[], None, false));
        m.insert("ContinueStatement", node(&[], None, false));
        m.insert("WithStatement", node(&["body", "object"], Some(with_statement), false));
        m.insert("SwitchStatement", node(&["discriminant", "cases"], None, false));
        m.insert("ReturnStatement", node(&["argument"], None, false));
        m.insert("ThrowStatement", node(&["argument"], None, false));
        m.insert(
            "TryStatement",
            node(&["block", "handler", "handlers", "finalizer", "guardedHandlers"], None, false),
        );
        m.insert("WhileStatement", node(&["test", "body"], None, false));
        m.insert("DoWhileStatement", node(&["test", "body"], None, false));
        m.insert("ForStatement", node(&["init", "test", "update", "body"], None, false));
        m.insert("ForInStatement", node(&["left", "right", "body"], None, false));
        m.insert("ForOfStatement", node(&["left", "right", "body"], None, false));

        m.insert("FunctionDeclaration", node(&["body"], Some(function_declaration), false));
        m.insert("VariableDeclaration", node(&["declarations"], Some(variable_declaration), false));
        m.insert("ClassDeclaration", node(&["superClass", "body"], None, false));
        m.insert("ClassBody", node(&["body"], None, false));
        m.insert("MethodDefinition", node(&["value"], None, false));
        m.insert("PropertyDefinition", node(&["value"], None, false));
        m.insert("StaticBlock", node(&["body"], None, false));

        m.insert("ThisExpression", node(&[], Some(this_expression), true));
        m.insert("Super", node(&[], None, true));
        m.insert("MetaProperty", node(&[], None, true));
        m.insert("ArrayExpression", node(&["elements"], Some(array_expression), true));
        m.insert("ObjectExpression", node(&["properties"], Some(object_expression), true));
        m.insert("FunctionExpression", node(&["body"], Some(function_expression), true));
        m.insert("ArrowFunctionExpression", node(&["body"], Some(function_expression), true));
        m.insert("ClassExpression", node(&["superClass", "body"], None, true));
        m.insert("SequenceExpression", node(&["expressions"], None, true));
        m.insert("UnaryExpression", node(&["argument"], Some(operators::unary_expression), true));
        m.insert("BinaryExpression", node(&["left", "right"], Some(operators::binary_expression), true));
        m.insert(
            "AssignmentExpression",
            node(&["left", "right"], Some(operators::assignment_expression), true),
        );
        m.insert("UpdateExpression", node(&["argument"], None, true));
        m.insert("LogicalExpression", node(&["left", "right"], Some(operators::logical_expression), true));
        m.insert("ConditionalExpression", node(&["test", "alternate", "consequent"], None, true));
        m.insert("NewExpression", node(&["callee", "arguments"], Some(new_expression), true));
        m.insert("CallExpression", node(&["callee", "arguments"], Some(call_expression), true));
        m.insert("MemberExpression", node(&["object", "property"], Some(member_expression_action), true));
        m.insert("YieldExpression", node(&["argument"], None, true));
        m.insert("AwaitExpression", node(&["argument"], None, true));
        m.insert("SpreadElement", node(&["argument"], None, true));
        m.insert("TemplateLiteral", node(&["expressions"], None, true));
        m.insert("TaggedTemplateExpression", node(&["tag", "quasi"], None, true));
        m.insert("ComprehensionExpression", node(&["body", "filter"], None, true));
        m.insert("GeneratorExpression", node(&["body", "filter"], None, true));

        m.insert("ObjectPattern", node(&[], None, false));
        m.insert("ArrayPattern", node(&[], None, false));
        m.insert("AssignmentPattern", node(&["right"], None, false));

        m.insert("SwitchCase", node(&["test", "consequent"], None, false));
        m.insert("CatchClause", node(&["param", "guard", "body"], None, true));
        m.insert("ComprehensionBlock", node(&["left", "right"], None, true));

        m.insert("Literal", node(&[], Some(literal), true));
        m.insert("Identifier", node(&[], Some(identifier), true));
        m
    };
}

/// Runs the definition for one node.
pub(crate) fn visit(t: &mut Traverser<'_>, id: NodeId, node: &Node) -> Value {
    let node_type = node.node_type.as_str();
    if E4X_NODES.contains(&node_type) {
        t.report(
            MessageKind::Error,
            &["js", "traverser", "e4x"],
            "E4X banned from app use.",
            "E4X has been deprecated and removed from Gecko. It may not be used in apps.",
        );
    }

    let Some(def) = DEFINITIONS.get(node_type) else {
        log::trace!("No definition for {}", node_type);
        return t.opaque();
    };

    let flow = match def.action {
        Some(action) => action(t, id),
        None => Flow::Continue,
    };
    let result = match flow {
        Flow::Value(value) => Some(value),
        Flow::Handled => None,
        Flow::Continue => {
            for branch in def.branches {
                for child in node.children(branch) {
                    t.traverse(child);
                }
            }
            None
        }
    };

    match result {
        Some(value) if def.returns => value,
        _ => t.opaque(),
    }
}

fn block_statement(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    let node = t.node(id);
    t.push_context(ContextKind::Block);
    for child in node.children("body") {
        t.traverse(child);
    }
    t.pop_context();
    Flow::Handled
}

fn expression_statement(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    match t.node(id).child("expression") {
        Some(expression) => Flow::Value(t.traverse(expression)),
        None => Flow::Continue,
    }
}

fn with_statement(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    let node = t.node(id);
    let object = match node.child("object") {
        Some(object) => t.traverse(object),
        None => t.opaque(),
    };
    t.push_object_context(&object);
    if let Some(body) = node.child("body") {
        t.traverse(body);
    }
    t.pop_context();
    Flow::Handled
}

fn make_function(t: &mut Traverser<'_>, id: NodeId) -> Value {
    t.defer_function(id);
    let mut function = JsObject::new(ObjectKind::Plain);
    function.callable = true;
    function.typeof_override = Some("function");
    Value::Obj(t.heap.alloc(function))
}

fn function_expression(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    Flow::Value(make_function(t, id))
}

fn function_declaration(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    let function = make_function(t, id);
    let name = t.node(id).child("id").and_then(|ident| t.node(ident).str("name"));
    if let Some(name) = name {
        t.declare_variable(name, function.clone(), DeclKind::Var);
    }
    Flow::Value(function)
}

fn variable_declaration(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    let node = t.node(id);
    let kind = DeclKind::from_keyword(node.str("kind").unwrap_or("var"));
    for declaration in node.children("declarations") {
        let declaration = t.node(declaration);
        if let Some(target) = declaration.child("id") {
            declare_pattern(t, target, declaration.child("init"), kind);
        }
    }
    Flow::Handled
}

fn declare_pattern(t: &mut Traverser<'_>, target: NodeId, init: Option<NodeId>, kind: DeclKind) {
    let pattern = t.node(target);
    match pattern.node_type.as_str() {
        "Identifier" => {
            let value = match init {
                Some(init) => t.traverse(init),
                None => t.opaque(),
            };
            if let Some(name) = pattern.str("name") {
                t.declare_variable(name, value, kind);
            }
        }
        "ArrayPattern" => {
            let source = init.map(|init| t.traverse(init));
            let is_array = source
                .as_ref()
                .and_then(Value::obj)
                .map(|r| matches!(t.heap.get(r).kind, ObjectKind::Array(_)))
                .unwrap_or(false);
            let Some(elements) = pattern.list("elements") else { return };
            for (index, element) in elements.iter().enumerate() {
                let Some(element) = element else { continue };
                let Some(name) = identifier_name(t, *element) else { continue };
                let value = match &source {
                    Some(source) if is_array => t.get_property(source, &index.to_string(), false),
                    _ => t.opaque(),
                };
                t.declare_variable(name, value, kind);
            }
        }
        "ObjectPattern" => {
            if let Some(init) = init {
                let source = t.traverse(init);
                declare_object_pattern(t, &source, pattern, kind);
            }
        }
        _ => {}
    }
}

fn declare_object_pattern(t: &mut Traverser<'_>, source: &Value, pattern: &Node, kind: DeclKind) {
    for property in pattern.children("properties") {
        let property = t.node(property);
        let Some(key) = property.child("key").and_then(|key| static_key(t, key)) else {
            continue;
        };
        let Some(value) = property.child("value") else { continue };
        let target = t.node(value);
        match target.node_type.as_str() {
            "Identifier" => {
                let member = t.get_property(source, &key, false);
                if let Some(name) = target.str("name") {
                    t.declare_variable(name, member, kind);
                }
            }
            "AssignmentPattern" => {
                let member = t.get_property(source, &key, false);
                if let Some(name) = target.child("left").and_then(|left| identifier_name(t, left)) {
                    t.declare_variable(name, member, kind);
                }
            }
            "ObjectPattern" => {
                let member = t.get_property(source, &key, false);
                declare_object_pattern(t, &member, target, kind);
            }
            _ => {}
        }
    }
}

fn identifier_name<'a>(t: &Traverser<'a>, id: NodeId) -> Option<&'a str> {
    let node = t.node(id);
    if node.node_type == "Identifier" {
        node.str("name")
    } else {
        None
    }
}

/// Name of a property key written as an identifier or a literal.
fn static_key(t: &Traverser<'_>, key: NodeId) -> Option<String> {
    let node = t.node(key);
    match node.node_type.as_str() {
        "Identifier" => node.str("name").map(str::to_string),
        "Literal" => Some(json_literal(node.field("value")).as_str()),
        _ => None,
    }
}

fn this_expression(t: &mut Traverser<'_>, _id: NodeId) -> Flow {
    match t.this_stack.last() {
        Some(this) => Flow::Value(this.clone()),
        None => {
            let window = t.registry.root();
            Flow::Value(t.build_global(window))
        }
    }
}

fn array_expression(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    let node = t.node(id);
    let elements = node
        .list("elements")
        .unwrap_or(&[])
        .iter()
        .map(|element| element.map(|element| t.traverse(element)))
        .collect();
    Flow::Value(t.heap.array(elements))
}

fn object_expression(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    let node = t.node(id);
    let object = t.opaque();
    for property in node.children("properties") {
        let prop = t.node(property);
        let name = match prop.node_type.as_str() {
            "PrototypeMutation" => "prototype".to_string(),
            "Property" => {
                let Some(key) = prop.child("key") else { continue };
                if prop.flag("computed") {
                    let computed = t.traverse(key);
                    t.heap.as_str(&computed)
                } else {
                    match static_key(t, key) {
                        Some(name) => name,
                        None => continue,
                    }
                }
            }
            _ => {
                t.traverse(property);
                continue;
            }
        };
        let value = match prop.child("value") {
            Some(value) => t.traverse(value),
            None => t.opaque(),
        };
        t.set_property(&object, &name, value);
    }
    Flow::Value(object)
}

/// The value of a `Literal` node's `value` field.
fn json_literal(field: Option<&Field>) -> Literal {
    match field {
        Some(Field::Value(Json::Bool(b))) => Literal::Bool(*b),
        Some(Field::Value(Json::Number(n))) => Literal::Number(n.as_f64().unwrap_or(0.0)),
        Some(Field::Value(Json::String(s))) => Literal::string(s.as_str()),
        _ => Literal::Null,
    }
}

fn literal(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    let node = t.node(id);
    if node.has("regex") || matches!(node.field("value"), Some(Field::Value(Json::Object(_) | Json::Array(_)))) {
        return Flow::Value(t.opaque());
    }
    Flow::Value(Value::Lit(json_literal(node.field("value"))))
}

fn identifier(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    match t.node(id).str("name") {
        Some(name) => Flow::Value(t.seek_variable(name)),
        None => Flow::Continue,
    }
}

/// The property name of a member expression.
pub(crate) fn member_property(t: &mut Traverser<'_>, node: &Node) -> String {
    let Some(property) = node.child("property") else {
        return String::new();
    };
    let prop = t.node(property);
    if prop.node_type == "Identifier" && !node.flag("computed") {
        if let Some(name) = prop.str("name") {
            return name.to_string();
        }
    }
    let value = t.traverse(property);
    t.heap.as_str(&value)
}

/// Resolves a member chain. With `instantiate`, missing links are created
/// and stored so that `foo.bar.baz = 1` has somewhere to land.
pub(crate) fn member_expression(t: &mut Traverser<'_>, id: NodeId, instantiate: bool) -> Value {
    let node = t.node(id);
    match node.node_type.as_str() {
        "MemberExpression" => {
            let base = match node.child("object") {
                Some(object) => member_expression(t, object, instantiate),
                None => t.opaque(),
            };
            let name = member_property(t, node);
            t.get_property(&base, &name, instantiate)
        }
        "Identifier" => {
            let name = node.str("name").unwrap_or_default();
            if instantiate && !t.is_defined(name) {
                let fresh = t.opaque();
                let root = Value::Obj(t.contexts[0]);
                t.set_property(&root, name, fresh.clone());
                fresh
            } else {
                t.seek_variable(name)
            }
        }
        _ => t.traverse(id),
    }
}

fn member_expression_action(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    Flow::Value(member_expression(t, id, false))
}

fn call_expression(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    let node = t.node(id);
    let args = node.children("arguments");
    for arg in &args {
        t.traverse(*arg);
    }
    let Some(callee_id) = node.child("callee") else {
        return Flow::Value(t.opaque());
    };
    let callee = t.traverse(callee_id);

    let callee_node = t.node(callee_id);
    if callee_node.node_type == "MemberExpression" && !callee_node.flag("computed") {
        let method = callee_node.child("property").and_then(|p| identifier_name(t, p));
        if let Some(method) = method {
            let receiver = match callee_node.child("object") {
                Some(object) => t.traverse(object),
                None => t.opaque(),
            };
            if let Some(result) = instance::call_action(t, method, &args, &receiver) {
                return Flow::Value(result);
            }
        }
    }

    if let Some(entity) = t.global_entity(&callee) {
        let registry = t.registry;
        let data = registry.entity(entity);
        if let Some(tag) = data.feature {
            t.log_feature(tag);
        }
        if let Some(hook) = data.on_return {
            if let Some(result) = hook.call(t, &callee, &args) {
                return Flow::Value(result);
            }
        }
    }
    Flow::Value(t.opaque())
}

fn new_expression(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    let node = t.node(id);
    let args = node.children("arguments");
    for arg in &args {
        t.traverse(*arg);
    }
    let callee = match node.child("callee") {
        Some(callee) => t.traverse(callee),
        None => t.opaque(),
    };

    let (Some(source), Some(entity)) = (callee.obj(), t.global_entity(&callee)) else {
        return Flow::Value(callee);
    };
    let instance = Value::Obj(t.clone_global(source, entity));

    let registry = t.registry;
    let data = registry.entity(entity);
    let result = match (data.on_new, data.on_return) {
        (Some(hook), _) => hook.call(t, &instance, &args).map(|value| force_object(t, value)),
        (None, Some(hook)) => hook.call(t, &instance, &args),
        (None, None) => None,
    };
    Flow::Value(result.unwrap_or(instance))
}

/// Values built by a `new` hook report `typeof` "object".
fn force_object(t: &mut Traverser<'_>, value: Value) -> Value {
    let is_nan = t.is_nan_object(&value);
    match value {
        Value::Obj(r) if !is_nan => {
            t.heap.get_mut(r).typeof_override = Some("object");
            value
        }
        other => {
            let literal = t.heap.literal_value(&other);
            let mut boxed = JsObject::new(ObjectKind::Boxed(literal));
            boxed.typeof_override = Some("object");
            Value::Obj(t.heap.alloc(boxed))
        }
    }
}
