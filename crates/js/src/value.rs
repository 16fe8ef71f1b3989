//! The value model the interpreter computes with.
//!
//! Values are either literals or handles into a [`Heap`] of objects. Object
//! properties hold [`Wrapper`]s so constness travels with the slot rather
//! than with the value.

use std::collections::BTreeMap;

use crate::globals::EntityId;

/// Upper bound on any string the interpreter produces
pub const MAX_STR_SIZE: usize = 1024 * 24;

/// Arrays never grow past this many slots
pub const MAX_ARRAY_LEN: usize = 100_000;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

impl Literal {
    pub fn string(value: impl Into<String>) -> Self {
        Literal::Str(truncate(value.into()))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Literal::Str(_))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Literal::Undefined | Literal::Null)
    }

    /// Numeric coercion. Unparseable strings become 0.
    pub fn as_num(&self) -> f64 {
        match self {
            Literal::Undefined | Literal::Null => 0.0,
            Literal::Bool(b) => f64::from(u8::from(*b)),
            Literal::Number(n) => *n,
            Literal::Str(s) => parse_number(s).unwrap_or(0.0),
        }
    }

    /// Whether numeric coercion succeeds without falling back to 0.
    pub fn is_numeric(&self) -> bool {
        match self {
            Literal::Str(s) => parse_number(s).is_some(),
            Literal::Number(n) => !n.is_nan(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> String {
        match self {
            Literal::Undefined | Literal::Null => String::new(),
            Literal::Bool(b) => b.to_string(),
            Literal::Number(n) => format_number(*n),
            Literal::Str(s) => s.clone(),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Literal::Undefined | Literal::Null => false,
            Literal::Bool(b) => *b,
            Literal::Number(n) => *n != 0.0 && !n.is_nan(),
            Literal::Str(s) => !s.is_empty(),
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Literal::Undefined => "undefined",
            Literal::Null => "object",
            Literal::Bool(_) => "boolean",
            Literal::Number(_) => "number",
            Literal::Str(_) => "string",
        }
    }

    /// Equality used by `===`: same type and same value.
    pub fn strict_eq(&self, other: &Literal) -> bool {
        match (self, other) {
            (Literal::Number(a), Literal::Number(b)) => a == b,
            _ => self == other,
        }
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Literal::Number(n)
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::string(s)
    }
}

/// Parses decimal, float and `0x` hex notation.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok().map(|n| n as f64);
    }
    match trimmed {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        "" => return None,
        _ => {}
    }
    if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Renders a number the way JS prints it for our purposes: integral values
/// without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{}", n)
    }
}

/// Cuts `value` to [`MAX_STR_SIZE`] bytes on a char boundary.
pub fn truncate(mut value: String) -> String {
    if value.len() > MAX_STR_SIZE {
        let mut end = MAX_STR_SIZE;
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        value.truncate(end);
    }
    value
}

/// Handle to an object on the [`Heap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Lit(Literal),
    Obj(ObjRef),
}

impl Value {
    pub fn undefined() -> Self {
        Value::Lit(Literal::Undefined)
    }

    pub fn literal(&self) -> Option<&Literal> {
        match self {
            Value::Lit(l) => Some(l),
            Value::Obj(_) => None,
        }
    }

    pub fn obj(&self) -> Option<ObjRef> {
        match self {
            Value::Obj(r) => Some(*r),
            Value::Lit(_) => None,
        }
    }
}

impl From<Literal> for Value {
    fn from(l: Literal) -> Self {
        Value::Lit(l)
    }
}

impl From<ObjRef> for Value {
    fn from(r: ObjRef) -> Self {
        Value::Obj(r)
    }
}

/// A property slot
#[derive(Debug, Clone, PartialEq)]
pub struct Wrapper {
    pub value: Value,
    pub is_const: bool,
}

impl Wrapper {
    pub fn new(value: Value) -> Self {
        Self { value, is_const: false }
    }

    pub fn constant(value: Value) -> Self {
        Self { value, is_const: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// Function or program scope; receives `var` and `const`
    Default,
    /// Block scope; receives `let`
    Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Plain,
    Array(Vec<Option<Value>>),
    /// An instance of a registry entity. `literal` is copied from the
    /// entity when it has one.
    Global { entity: EntityId, readonly: bool, literal: Option<Literal> },
    Context(ContextKind),
    /// A primitive returned from a `new` hook
    Boxed(Literal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsObject {
    pub kind: ObjectKind,
    pub props: BTreeMap<String, Wrapper>,
    pub callable: bool,
    pub typeof_override: Option<&'static str>,
}

impl JsObject {
    pub fn new(kind: ObjectKind) -> Self {
        Self { kind, props: BTreeMap::new(), callable: false, typeof_override: None }
    }

    pub fn is_global(&self) -> bool {
        matches!(self.kind, ObjectKind::Global { .. })
    }
}

/// Every object created while walking one script
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<JsObject>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, object: JsObject) -> ObjRef {
        let r = ObjRef(self.objects.len() as u32);
        self.objects.push(object);
        r
    }

    pub fn plain(&mut self) -> Value {
        Value::Obj(self.alloc(JsObject::new(ObjectKind::Plain)))
    }

    pub fn array(&mut self, elements: Vec<Option<Value>>) -> Value {
        Value::Obj(self.alloc(JsObject::new(ObjectKind::Array(elements))))
    }

    pub fn get(&self, r: ObjRef) -> &JsObject {
        &self.objects[r.0 as usize]
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut JsObject {
        &mut self.objects[r.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// True for plain objects and globals without a literal: values we
    /// know nothing about.
    pub fn is_opaque(&self, value: &Value) -> bool {
        match value {
            Value::Lit(_) => false,
            Value::Obj(r) => match &self.get(*r).kind {
                ObjectKind::Plain | ObjectKind::Context(_) => true,
                ObjectKind::Global { literal, .. } => literal.is_none(),
                ObjectKind::Array(_) | ObjectKind::Boxed(_) => false,
            },
        }
    }

    pub fn is_callable(&self, value: &Value) -> bool {
        value.obj().map(|r| self.get(r).callable).unwrap_or(false)
    }

    /// The primitive a value stands for.
    pub fn literal_value(&self, value: &Value) -> Literal {
        let mut visiting = Vec::new();
        self.literal_inner(value, &mut visiting)
    }

    fn literal_inner(&self, value: &Value, visiting: &mut Vec<ObjRef>) -> Literal {
        let r = match value {
            Value::Lit(l) => return l.clone(),
            Value::Obj(r) => *r,
        };
        match &self.get(r).kind {
            ObjectKind::Plain | ObjectKind::Context(_) => Literal::string("[object Object]"),
            ObjectKind::Boxed(l) => l.clone(),
            ObjectKind::Global { literal: Some(l), .. } => l.clone(),
            ObjectKind::Global { literal: None, .. } => Literal::string("[object Object]"),
            ObjectKind::Array(elements) => {
                if visiting.contains(&r) {
                    return Literal::string("(recursion)");
                }
                visiting.push(r);
                let mut joined = String::new();
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        joined.push(',');
                    }
                    if let Some(element) = element {
                        joined.push_str(&self.literal_inner(element, visiting).as_str());
                    }
                    if joined.len() > MAX_STR_SIZE {
                        break;
                    }
                }
                visiting.pop();
                Literal::string(joined)
            }
        }
    }

    pub fn as_str(&self, value: &Value) -> String {
        self.literal_value(value).as_str()
    }

    pub fn as_num(&self, value: &Value) -> f64 {
        match value {
            Value::Lit(l) => l.as_num(),
            Value::Obj(r) => match &self.get(*r).kind {
                ObjectKind::Boxed(l) | ObjectKind::Global { literal: Some(l), .. } => l.as_num(),
                _ => 0.0,
            },
        }
    }

    /// Objects are truthy unless they stand in for a literal.
    pub fn truthy(&self, value: &Value) -> bool {
        match value {
            Value::Lit(l) => l.truthy(),
            Value::Obj(r) => match &self.get(*r).kind {
                ObjectKind::Global { literal: Some(l), .. } => l.truthy(),
                _ => true,
            },
        }
    }

    /// Whether the property is known on the value, for `in`.
    pub fn has_var(&self, value: &Value, name: &str) -> bool {
        let Some(r) = value.obj() else { return false };
        let object = self.get(r);
        if let ObjectKind::Array(elements) = &object.kind {
            if let Ok(index) = name.parse::<usize>() {
                return index < elements.len();
            }
        }
        object.props.contains_key(name)
    }

    /// Debug rendering that survives cycles.
    pub fn dump(&self, value: &Value) -> String {
        let mut visiting = Vec::new();
        self.dump_inner(value, &mut visiting)
    }

    fn dump_inner(&self, value: &Value, visiting: &mut Vec<ObjRef>) -> String {
        let r = match value {
            Value::Lit(Literal::Str(s)) => return format!("{:?}", s),
            Value::Lit(l) => return l.as_str(),
            Value::Obj(r) => *r,
        };
        if visiting.contains(&r) {
            return "(recursion)".to_string();
        }
        visiting.push(r);
        let object = self.get(r);
        let mut parts: Vec<String> = Vec::new();
        if let ObjectKind::Array(elements) = &object.kind {
            for element in elements {
                parts.push(match element {
                    Some(v) => self.dump_inner(v, visiting),
                    None => String::new(),
                });
            }
            visiting.pop();
            return format!("[{}]", parts.join(", "));
        }
        for (name, slot) in &object.props {
            parts.push(format!("{}: {}", name, self.dump_inner(&slot.value, visiting)));
        }
        visiting.pop();
        format!("{{{}}}", parts.join(", "))
    }
}
