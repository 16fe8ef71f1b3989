//! Walks a syntax tree and tracks what the script could be doing.
//!
//! The traverser owns the heap and the scope chain for one script. Node
//! behaviour lives in [`crate::nodes`]; this module provides the state and
//! the object protocol the node actions build on.

use std::collections::HashMap;
use std::time::Instant;

use appvalidator_report::{
    warn_csp, ContextGenerator, CspSeverity, Diagnostic, ErrorBundle, FileRef, MessageKind, Text,
};

use crate::ast::{Ast, Node, NodeId};
use crate::globals::{EntityId, Registry};
use crate::instance::{self, MarkupChecker};
use crate::nodes;
use crate::value::{
    ContextKind, Heap, JsObject, Literal, ObjRef, ObjectKind, Value, Wrapper, MAX_ARRAY_LEN,
};

/// How often, in visited nodes, the deadline is checked
const DEADLINE_INTERVAL: usize = 256;

/// How a name is being declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
    /// Assignment to a name that may not be declared anywhere
    Glob,
}

impl DeclKind {
    pub fn from_keyword(kind: &str) -> Self {
        match kind {
            "let" => DeclKind::Let,
            "const" => DeclKind::Const,
            _ => DeclKind::Var,
        }
    }
}

/// A function body waiting to be walked, with the scope chain it closes
/// over
#[derive(Debug, Clone)]
pub(crate) struct Deferred {
    pub node: NodeId,
    pub contexts: Vec<ObjRef>,
}

pub struct Traverser<'a> {
    pub(crate) err: &'a mut ErrorBundle,
    pub(crate) file: FileRef,
    ast: &'a Ast,
    context: Option<&'a ContextGenerator>,
    markup: Option<&'a dyn MarkupChecker>,
    pub(crate) registry: &'static Registry,
    start_line: usize,
    pub(crate) line: usize,
    pub(crate) column: usize,
    pub(crate) heap: Heap,
    pub(crate) contexts: Vec<ObjRef>,
    pub(crate) this_stack: Vec<Value>,
    pub(crate) function_collection: Vec<Vec<Deferred>>,
    cache: HashMap<NodeId, Value>,
    nan: Option<ObjRef>,
    deadline: Option<Instant>,
    visits: usize,
    timed_out: bool,
}

impl<'a> Traverser<'a> {
    pub fn new(err: &'a mut ErrorBundle, file: impl Into<FileRef>, ast: &'a Ast) -> Self {
        let mut heap = Heap::new();
        let root = heap.alloc(JsObject::new(ObjectKind::Context(ContextKind::Default)));
        Self {
            err,
            file: file.into(),
            ast,
            context: None,
            markup: None,
            registry: Registry::global(),
            start_line: 0,
            line: 1,
            column: 0,
            heap,
            contexts: vec![root],
            this_stack: Vec::new(),
            function_collection: Vec::new(),
            cache: HashMap::new(),
            nan: None,
            deadline: None,
            visits: 0,
            timed_out: false,
        }
    }

    pub fn with_context(mut self, context: Option<&'a ContextGenerator>) -> Self {
        self.context = context;
        self
    }

    /// Offset added to every line, for scripts embedded in other files.
    pub fn with_start_line(mut self, start_line: usize) -> Self {
        self.start_line = start_line;
        self
    }

    pub fn with_markup(mut self, markup: Option<&'a dyn MarkupChecker>) -> Self {
        self.markup = markup;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Walks the whole program, then every function body it declared.
    pub fn run(&mut self) {
        let Some(root) = self.ast.root() else { return };
        log::debug!("Walking {} ({} nodes)", self.file, self.ast.len());
        self.function_collection.push(Vec::new());
        self.traverse(root);
        self.drain_functions();
        if self.timed_out {
            log::warn!("Gave up walking {} at line {}", self.file, self.line);
        }
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Value bound to `name` in the global scope after the walk.
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.heap.get(self.contexts[0]).props.get(name).map(|slot| slot.value.clone())
    }

    /// The primitive bound to `name` in the global scope.
    pub fn variable_literal(&self, name: &str) -> Option<Literal> {
        self.variable(name).map(|value| self.heap.literal_value(&value))
    }

    pub(crate) fn node(&self, id: NodeId) -> &'a Node {
        self.ast.node(id)
    }

    /// Walks one node, returning its value. Results are cached per node so
    /// nothing is evaluated, or reported, twice.
    pub fn traverse(&mut self, id: NodeId) -> Value {
        if let Some(value) = self.cache.get(&id) {
            return value.clone();
        }
        if self.past_deadline() {
            return self.opaque();
        }

        let node = self.node(id);
        if node.line > 0 {
            self.line = self.start_line + node.line;
            self.column = node.column;
        }
        log::trace!("{} at {}:{}", node.node_type, self.line, self.column);

        let value = nodes::visit(self, id, node);
        self.cache.insert(id, value.clone());
        value
    }

    /// Records a computed value for `id` without walking it again.
    pub(crate) fn remember(&mut self, id: NodeId, value: Value) {
        self.cache.insert(id, value);
    }

    pub(crate) fn is_cached(&self, id: NodeId) -> bool {
        self.cache.contains_key(&id)
    }

    fn past_deadline(&mut self) -> bool {
        if self.timed_out {
            return true;
        }
        self.visits += 1;
        if self.visits % DEADLINE_INTERVAL == 0 {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    self.timed_out = true;
                }
            }
        }
        self.timed_out
    }

    // Functions

    pub(crate) fn defer_function(&mut self, node: NodeId) {
        let deferred = Deferred { node, contexts: self.contexts.clone() };
        match self.function_collection.last_mut() {
            Some(collection) => collection.push(deferred),
            None => self.run_function(deferred),
        }
    }

    fn drain_functions(&mut self) {
        let Some(collection) = self.function_collection.pop() else { return };
        for deferred in collection {
            self.run_function(deferred);
        }
    }

    fn run_function(&mut self, deferred: Deferred) {
        let node = self.node(deferred.node);
        self.function_collection.push(Vec::new());
        let this = self.heap.plain();
        self.this_stack.push(this);

        let saved = std::mem::replace(&mut self.contexts, deferred.contexts);
        let params = self.push_context(ContextKind::Default);
        for param in node.children("params") {
            self.bind_pattern(params, param);
        }

        if let Some(body) = node.child("body") {
            self.traverse(body);
        }
        self.drain_functions();

        self.contexts = saved;
        self.this_stack.pop();
    }

    /// Binds every identifier in a parameter pattern as an unknown value.
    fn bind_pattern(&mut self, context: ObjRef, pattern: NodeId) {
        let node = self.node(pattern);
        match node.node_type.as_str() {
            "Identifier" => {
                if let Some(name) = node.str("name") {
                    let value = self.opaque();
                    self.heap.get_mut(context).props.insert(name.to_string(), Wrapper::new(value));
                }
            }
            "ArrayPattern" => {
                for element in node.children("elements") {
                    self.bind_pattern(context, element);
                }
            }
            "ObjectPattern" => {
                for property in node.children("properties") {
                    let property = self.node(property);
                    let target = property.child("value").or_else(|| property.child("argument"));
                    if let Some(target) = target {
                        self.bind_pattern(context, target);
                    }
                }
            }
            "AssignmentPattern" => {
                if let Some(left) = node.child("left") {
                    self.bind_pattern(context, left);
                }
            }
            "RestElement" => {
                if let Some(argument) = node.child("argument") {
                    self.bind_pattern(context, argument);
                }
            }
            _ => {}
        }
    }

    // Scopes

    pub(crate) fn push_context(&mut self, kind: ContextKind) -> ObjRef {
        let context = self.heap.alloc(JsObject::new(ObjectKind::Context(kind)));
        self.contexts.push(context);
        context
    }

    /// Pushes an arbitrary object as a scope, for `with`.
    pub(crate) fn push_object_context(&mut self, value: &Value) {
        let object = match value {
            Value::Obj(r) => *r,
            Value::Lit(_) => self.heap.alloc(JsObject::new(ObjectKind::Plain)),
        };
        self.contexts.push(object);
    }

    /// Pops the innermost scope. The global scope always stays.
    pub(crate) fn pop_context(&mut self) {
        if self.contexts.len() > 1 {
            self.contexts.pop();
        }
    }

    fn is_default_context(&self, context: ObjRef) -> bool {
        matches!(self.heap.get(context).kind, ObjectKind::Context(ContextKind::Default))
    }

    /// Whether `name` is bound in any scope, for `with` objects including
    /// what their global descriptor provides.
    fn context_has(&self, context: ObjRef, name: &str) -> bool {
        let object = self.heap.get(context);
        match object.kind {
            ObjectKind::Context(_) => object.props.contains_key(name),
            _ => self.has_property(&Value::Obj(context), name),
        }
    }

    pub(crate) fn is_local(&self, name: &str) -> bool {
        self.contexts.iter().any(|c| self.context_has(*c, name))
    }

    pub(crate) fn is_defined(&self, name: &str) -> bool {
        self.is_local(name) || self.registry.lookup(name).is_some()
    }

    /// Resolves an identifier: scopes inside out, then the globals, then an
    /// unknown value.
    pub(crate) fn seek_variable(&mut self, name: &str) -> Value {
        let found = self.contexts.iter().rev().copied().find(|c| self.context_has(*c, name));
        if let Some(context) = found {
            return self.get_property(&Value::Obj(context), name, false);
        }
        match self.registry.lookup(name) {
            Some(entity) => self.build_global(entity),
            None => self.opaque(),
        }
    }

    pub(crate) fn declare_variable(&mut self, name: &str, value: Value, kind: DeclKind) {
        let root = self.contexts[0];
        let context = match kind {
            DeclKind::Let => self.contexts.last().copied(),
            DeclKind::Var | DeclKind::Const => self
                .contexts
                .iter()
                .rev()
                .copied()
                .find(|c| *c == root || self.is_default_context(*c)),
            DeclKind::Glob => self.contexts[1..]
                .iter()
                .rev()
                .copied()
                .find(|c| self.context_has(*c, name)),
        }
        .unwrap_or(root);

        let slot = if kind == DeclKind::Const { Wrapper::constant(value) } else { Wrapper::new(value) };
        if matches!(self.heap.get(context).kind, ObjectKind::Context(_)) {
            self.set_on_context(context, name, slot);
        } else {
            self.set_property(&Value::Obj(context), name, slot.value);
        }
    }

    fn set_on_context(&mut self, context: ObjRef, name: &str, slot: Wrapper) {
        if context == self.contexts[0] {
            instance::on_set(self, name, &slot.value);
        }
        if self.slot_is_const(context, name) {
            self.const_overwrite();
            return;
        }
        self.heap.get_mut(context).props.insert(name.to_string(), slot);
    }

    fn slot_is_const(&self, object: ObjRef, name: &str) -> bool {
        self.heap.get(object).props.get(name).map(|slot| slot.is_const).unwrap_or(false)
    }

    fn const_overwrite(&mut self) {
        self.report(
            MessageKind::Warning,
            &["js", "JSWrapper_set_value", "const_overwrite"],
            "Overwritten constant value",
            "A variable declared as constant has been overwritten in some JS code.",
        );
    }

    /// Whether the slot an identifier resolves to was declared `const`.
    pub(crate) fn identifier_is_const(&self, name: &str) -> bool {
        self.contexts
            .iter()
            .rev()
            .find(|c| self.context_has(**c, name))
            .map(|c| self.slot_is_const(*c, name))
            .unwrap_or(false)
    }

    pub(crate) fn property_is_const(&self, object: &Value, name: &str) -> bool {
        object.obj().map(|r| self.slot_is_const(r, name)).unwrap_or(false)
    }

    // Objects

    pub fn opaque(&mut self) -> Value {
        self.heap.plain()
    }

    /// The one NaN of this script.
    pub fn nan(&mut self) -> Value {
        if let Some(nan) = self.nan {
            return Value::Obj(nan);
        }
        let nan = match self.registry.lookup("NaN") {
            Some(entity) => self.alloc_global(entity, true),
            None => self.heap.alloc(JsObject::new(ObjectKind::Boxed(Literal::Number(f64::NAN)))),
        };
        self.nan = Some(nan);
        Value::Obj(nan)
    }

    pub(crate) fn is_nan_object(&self, value: &Value) -> bool {
        self.nan.is_some() && value.obj() == self.nan
    }

    fn alloc_global(&mut self, entity: EntityId, readonly: bool) -> ObjRef {
        let registry = self.registry;
        let data = registry.entity(entity);
        let mut object = JsObject::new(ObjectKind::Global {
            entity,
            readonly,
            literal: data.literal.clone(),
        });
        object.typeof_override = data.type_of;
        self.heap.alloc(object)
    }

    /// Materialises a global, running whatever touching it entails.
    pub(crate) fn build_global(&mut self, entity: EntityId) -> Value {
        let registry = self.registry;
        let data = registry.entity(entity);
        if let Some(tag) = data.feature {
            self.log_feature(tag);
        }
        if let Some(hook) = data.on_value {
            let undefined = Value::undefined();
            hook.call(self, &undefined, &[]);
        }
        if data.name == "NaN" {
            return self.nan();
        }
        let readonly = data.readonly;
        Value::Obj(self.alloc_global(entity, readonly))
    }

    /// Copies a global for `new`; the copy is writable.
    pub(crate) fn clone_global(&mut self, source: ObjRef, entity: EntityId) -> ObjRef {
        let props = self.heap.get(source).props.clone();
        let clone = self.alloc_global(entity, false);
        self.heap.get_mut(clone).props = props;
        clone
    }

    pub(crate) fn global_entity(&self, value: &Value) -> Option<EntityId> {
        match &self.heap.get(value.obj()?).kind {
            ObjectKind::Global { entity, .. } => Some(*entity),
            _ => None,
        }
    }

    fn global_member(&self, object: ObjRef, name: &str) -> Option<EntityId> {
        match self.heap.get(object).kind {
            ObjectKind::Global { entity, .. } => self.registry.member(entity, name),
            _ => None,
        }
    }

    pub fn has_property(&self, value: &Value, name: &str) -> bool {
        let Some(r) = value.obj() else { return false };
        self.heap.has_var(value, name) || self.global_member(r, name).is_some()
    }

    pub(crate) fn get_property(&mut self, value: &Value, name: &str, instantiate: bool) -> Value {
        let r = match value {
            Value::Lit(_) => {
                instance::on_get(self, name);
                return self.opaque();
            }
            Value::Obj(r) => *r,
        };

        let object = self.heap.get(r);
        match &object.kind {
            ObjectKind::Context(_) => match object.props.get(name) {
                Some(slot) => slot.value.clone(),
                None => self.opaque(),
            },
            ObjectKind::Array(elements) => {
                if name == "length" {
                    return Value::Lit(Literal::Number(elements.len() as f64));
                }
                if let Ok(index) = name.trim().parse::<usize>() {
                    if let Some(element) = elements.get(index) {
                        return element.clone().unwrap_or(Value::Lit(Literal::Null));
                    }
                }
                self.plain_get(r, name, instantiate)
            }
            ObjectKind::Global { .. } if !object.props.contains_key(name) && !instantiate => {
                match self.global_member(r, name) {
                    Some(member) => match self.registry.entity(member).literal.clone() {
                        Some(literal) => Value::Lit(literal),
                        None => self.build_global(member),
                    },
                    None => self.plain_get(r, name, false),
                }
            }
            _ => self.plain_get(r, name, instantiate),
        }
    }

    fn plain_get(&mut self, r: ObjRef, name: &str, instantiate: bool) -> Value {
        let mut output = self.heap.get(r).props.get(name).map(|slot| slot.value.clone());
        if output.is_none() && (instantiate || name == "constructor" || name == "prototype") {
            let fresh = self.opaque();
            self.heap.get_mut(r).props.insert(name.to_string(), Wrapper::new(fresh.clone()));
            output = Some(fresh);
        }
        instance::on_get(self, name);
        match output {
            Some(value) => value,
            None => self.opaque(),
        }
    }

    pub(crate) fn set_property(&mut self, target: &Value, name: &str, value: Value) {
        let Value::Obj(r) = target else { return };
        let r = *r;
        match &self.heap.get(r).kind {
            ObjectKind::Context(_) => {
                self.set_on_context(r, name, Wrapper::new(value));
                return;
            }
            ObjectKind::Array(_) if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) => {
                let index = name.parse::<usize>().unwrap_or(MAX_ARRAY_LEN).min(MAX_ARRAY_LEN);
                if let ObjectKind::Array(elements) = &mut self.heap.get_mut(r).kind {
                    if elements.len() <= index {
                        elements.resize(index + 1, None);
                    }
                    elements[index] = Some(value);
                }
                return;
            }
            ObjectKind::Global { entity, .. } => {
                let entity = *entity;
                if let Some(member) = self.registry.member(entity, name) {
                    self.check_global_overwrite(entity, member);
                }
            }
            _ => {}
        }

        instance::on_set(self, name, &value);
        if self.slot_is_const(r, name) {
            self.const_overwrite();
            return;
        }
        self.heap.get_mut(r).props.insert(name.to_string(), Wrapper::new(value));
    }

    /// Reports writes to literal or read-only members of a global.
    pub(crate) fn check_global_overwrite(&mut self, parent: EntityId, member: EntityId) {
        let registry = self.registry;
        let parent_name = registry.entity(parent).name;
        let data = registry.entity(member);
        if data.literal.is_some() {
            let description = vec![
                "A JS literal was overwritten. This may cause issues and usually indicates \
                 other problems with the code."
                    .to_string(),
                format!("Modified global: {}.{}", parent_name, data.name),
            ];
            self.report(
                MessageKind::Warning,
                &["js", "global", "literal_assignment"],
                "Assignment to JS literal",
                description,
            );
        } else if data.readonly {
            let description = vec![
                "A read-only JS global was modified by some code. This may cause issues and \
                 usually indicates other problems with the code."
                    .to_string(),
                format!("Modified global: {}", data.name),
            ];
            self.report(
                MessageKind::Notice,
                &["js", "global", "readonly"],
                "Read-only JS global modified",
                description,
            );
        }
    }

    pub(crate) fn delete_property(&mut self, target: &Value, name: &str) {
        let Value::Obj(r) = target else { return };
        let object = self.heap.get_mut(*r);
        if let ObjectKind::Array(elements) = &mut object.kind {
            if let Ok(index) = name.parse::<usize>() {
                if index + 1 == elements.len() {
                    elements.pop();
                } else if index < elements.len() {
                    elements[index] = None;
                }
                return;
            }
        }
        object.props.remove(name);
    }

    /// `typeof` of a value.
    pub(crate) fn type_of(&self, value: &Value) -> &'static str {
        let r = match value {
            Value::Lit(literal) => return literal.type_of(),
            Value::Obj(r) => *r,
        };
        let object = self.heap.get(r);
        if object.callable {
            return "function";
        }
        if let Some(forced) = object.typeof_override {
            return forced;
        }
        if let ObjectKind::Global { entity, .. } = object.kind {
            let data = self.registry.entity(entity);
            if data.on_return.is_some() && !data.has_members() {
                return "function";
            }
            if data.undefined {
                return "undefined";
            }
        }
        "object"
    }

    // Reporting

    pub(crate) fn diagnostic(&self, id: &[&str], message: impl Into<Text>) -> Diagnostic<'a> {
        Diagnostic::new(id.iter().copied(), message)
            .file(&self.file)
            .line(self.line)
            .column(self.column)
            .maybe_context_from(self.context)
    }

    pub(crate) fn report(
        &mut self,
        kind: MessageKind,
        id: &[&str],
        message: &str,
        description: impl Into<Text>,
    ) {
        let diagnostic = self.diagnostic(id, message).description(description);
        self.err.report(kind, diagnostic);
    }

    pub(crate) fn warn_csp(&mut self, violation_type: &str) {
        warn_csp(
            self.err,
            &self.file,
            Some(self.line),
            Some(self.column),
            self.context,
            violation_type,
            CspSeverity::Warning,
        );
    }

    pub(crate) fn log_feature(&mut self, tag: &str) {
        log::debug!("Found feature: {}", tag);
        self.err.log_feature(tag, &self.file, Some(self.line), Some(self.column));
    }

    pub(crate) fn check_markup(&mut self, markup: &str) {
        if let Some(checker) = self.markup {
            checker.check_markup(self.err, &self.file, markup);
        }
    }
}
