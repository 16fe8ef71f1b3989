//! Unary, binary and assignment operators over the value model.
//!
//! Results stay literal wherever both operands are known. Anything that
//! touches an opaque value becomes opaque itself, and arithmetic that
//! cannot produce a number yields the script's NaN.

use appvalidator_report::MessageKind;

use crate::ast::NodeId;
use crate::nodes::{member_expression, member_property, Flow};
use crate::traverser::{DeclKind, Traverser};
use crate::value::{parse_number, Literal, ObjectKind, Value};

const SHIFTS: [&str; 3] = ["<<", ">>", ">>>"];
const BITWISE: [&str; 3] = ["|", "^", "&"];
const ARITHMETIC: [&str; 10] = ["-", "*", "/", "%", "<<", ">>", ">>>", "|", "^", "&"];

/// JS `ToInt32`
fn to_i32(n: f64) -> i32 {
    to_u32(n) as i32
}

/// JS `ToUint32`
fn to_u32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

fn number(n: f64) -> Value {
    Value::Lit(Literal::Number(n))
}

/// Applies a numeric operator to two plain numbers.
fn numeric_op(operator: &str, a: f64, b: f64) -> f64 {
    let shift = to_u32(b) & 31;
    match operator {
        "-" => a - b,
        "*" => a * b,
        "/" if b == 0.0 => 0.0,
        "/" => a / b,
        "%" if b == 0.0 => 0.0,
        "%" => a % b,
        "<<" => f64::from(to_i32(a).wrapping_shl(shift)),
        ">>" => f64::from(to_i32(a).wrapping_shr(shift)),
        ">>>" => f64::from(to_u32(a).wrapping_shr(shift)),
        "|" => f64::from(to_i32(a) | to_i32(b)),
        "^" => f64::from(to_i32(a) ^ to_i32(b)),
        "&" => f64::from(to_i32(a) & to_i32(b)),
        _ => f64::NAN,
    }
}

/// `==` on primitives: `null` and `undefined` only equal each other, two
/// strings compare as strings, and anything else compares numerically.
fn loose_literal_eq(a: &Literal, b: &Literal) -> bool {
    match (a, b) {
        _ if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
        (Literal::Str(x), Literal::Str(y)) => x == y,
        _ => match (loose_number(a), loose_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

/// Numeric coercion for `==`. A blank string is 0 and any other string
/// that does not parse has no numeric value.
fn loose_number(literal: &Literal) -> Option<f64> {
    match literal {
        Literal::Str(s) if s.trim().is_empty() => Some(0.0),
        Literal::Str(s) => parse_number(s),
        other => Some(other.as_num()),
    }
}

fn loose_eq(t: &Traverser<'_>, left: &Value, right: &Value) -> bool {
    if let (Value::Obj(a), Value::Obj(b)) = (left, right) {
        if a == b {
            return !t.is_nan_object(left);
        }
    }
    if t.heap.is_opaque(left) || t.heap.is_opaque(right) {
        return false;
    }
    loose_literal_eq(&t.heap.literal_value(left), &t.heap.literal_value(right))
}

fn strict_eq(t: &Traverser<'_>, left: &Value, right: &Value) -> bool {
    t.type_of(left) == t.type_of(right) && loose_eq(t, left, right)
}

pub(crate) fn unary_expression(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    let node = t.node(id);
    let operator = node.str("operator").unwrap_or_default();
    let Some(argument) = node.child("argument") else {
        return Flow::Continue;
    };

    if operator == "delete" {
        let target = t.node(argument);
        if target.node_type == "MemberExpression" {
            if let Some(object) = target.child("object") {
                let object = t.traverse(object);
                let name = member_property(t, target);
                t.delete_property(&object, &name);
            }
        } else {
            t.traverse(argument);
        }
        return Flow::Value(Value::Lit(Literal::Bool(true)));
    }

    let mut value = t.traverse(argument);
    if let Some(r) = value.obj() {
        if let ObjectKind::Global { literal: Some(literal), .. } = &t.heap.get(r).kind {
            value = Value::Lit(literal.clone());
        }
    }

    let literal = t.heap.literal_value(&value);
    let opaque = t.heap.is_opaque(&value);
    let result = match operator {
        "-" | "+" | "~" if opaque => t.opaque(),
        "-" | "+" | "~" if !literal.is_numeric() => t.nan(),
        "-" => number(-literal.as_num()),
        "+" => number(literal.as_num()),
        "~" => number(f64::from(!to_i32(literal.as_num()))),
        "!" => Value::Lit(Literal::Bool(!t.heap.truthy(&value))),
        "void" => Value::undefined(),
        "typeof" => Value::Lit(Literal::string(t.type_of(&value))),
        _ => t.opaque(),
    };
    Flow::Value(result)
}

/// Evaluates a binary expression. Long `a + b + c + ...` chains nest on
/// the left, so the spine is collected first and evaluated from the inside
/// out without recursing.
pub(crate) fn binary_expression(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    walk_left_spine(t, id, "BinaryExpression", binary_step)
}

pub(crate) fn logical_expression(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    walk_left_spine(t, id, "LogicalExpression", logical_step)
}

/// Evaluates a left-leaning chain of `node_type` nodes bottom-up in a loop,
/// so `a + b + c + ...` of any length costs no recursion.
fn walk_left_spine(
    t: &mut Traverser<'_>,
    id: NodeId,
    node_type: &str,
    step: fn(&mut Traverser<'_>, NodeId) -> Value,
) -> Flow {
    let mut spine = vec![id];
    let mut cursor = id;
    while let Some(left) = t.node(cursor).child("left") {
        if t.node(left).node_type != node_type || t.is_cached(left) {
            break;
        }
        spine.push(left);
        cursor = left;
    }

    let mut result = None;
    for node in spine.into_iter().rev() {
        let value = step(t, node);
        if node != id {
            t.remember(node, value.clone());
        }
        result = Some(value);
    }
    match result {
        Some(value) => Flow::Value(value),
        None => Flow::Value(t.opaque()),
    }
}

fn logical_step(t: &mut Traverser<'_>, id: NodeId) -> Value {
    let node = t.node(id);
    let operator = node.str("operator").unwrap_or_default();
    let (Some(left_id), Some(right_id)) = (node.child("left"), node.child("right")) else {
        return t.opaque();
    };
    let left = t.traverse(left_id);
    let right = t.traverse(right_id);

    if t.heap.is_opaque(&left) {
        return t.opaque();
    }
    let pick_left = match operator {
        "&&" => !t.heap.truthy(&left),
        "||" => t.heap.truthy(&left),
        "??" => !t.heap.literal_value(&left).is_nullish(),
        _ => return t.opaque(),
    };
    if pick_left {
        left
    } else {
        right
    }
}

fn binary_step(t: &mut Traverser<'_>, id: NodeId) -> Value {
    let node = t.node(id);
    let operator = node.str("operator").unwrap_or_default();
    let (Some(left_id), Some(right_id)) = (node.child("left"), node.child("right")) else {
        return t.opaque();
    };

    if operator == "instanceof" {
        let right = t.node(right_id);
        if right.node_type == "Identifier" && right.str("name") == Some("Function") {
            t.traverse(left_id);
            return Value::Lit(Literal::Bool(true));
        }
    }

    let left = t.traverse(left_id);
    let right = t.traverse(right_id);
    binary_operation(t, operator, &left, &right)
}

pub(crate) fn binary_operation(t: &mut Traverser<'_>, operator: &str, left: &Value, right: &Value) -> Value {
    let bool_value = |b: bool| Value::Lit(Literal::Bool(b));
    match operator {
        "==" => bool_value(loose_eq(t, left, right)),
        "!=" => bool_value(!loose_eq(t, left, right)),
        "===" => bool_value(strict_eq(t, left, right)),
        "!==" => bool_value(!strict_eq(t, left, right)),
        "<" | ">" | "<=" | ">=" => compare(t, operator, left, right),
        "in" => {
            let name = t.heap.as_str(left);
            bool_value(t.has_property(right, &name))
        }
        "+" => add(t, left, right),
        _ if ARITHMETIC.contains(&operator) => arithmetic(t, operator, left, right),
        _ => t.opaque(),
    }
}

fn compare(t: &mut Traverser<'_>, operator: &str, left: &Value, right: &Value) -> Value {
    if t.heap.is_opaque(left) || t.heap.is_opaque(right) {
        return t.opaque();
    }
    let (l, r) = (t.heap.literal_value(left), t.heap.literal_value(right));
    let ordering = match (&l, &r) {
        (Literal::Str(a), Literal::Str(b)) => Some(a.cmp(b)),
        _ => l.as_num().partial_cmp(&r.as_num()),
    };
    let result = match ordering {
        None => false,
        Some(ordering) => match operator {
            "<" => ordering.is_lt(),
            ">" => ordering.is_gt(),
            "<=" => ordering.is_le(),
            _ => ordering.is_ge(),
        },
    };
    Value::Lit(Literal::Bool(result))
}

fn add(t: &mut Traverser<'_>, left: &Value, right: &Value) -> Value {
    if t.heap.is_opaque(left) || t.heap.is_opaque(right) {
        return t.opaque();
    }
    let l = blank_undefined(t.heap.literal_value(left));
    let r = blank_undefined(t.heap.literal_value(right));
    if l.is_string() || r.is_string() {
        return concat(&l, &r);
    }
    let sum = l.as_num() + r.as_num();
    if sum.is_nan() {
        t.nan()
    } else {
        number(sum)
    }
}

/// `undefined` takes part in `+` as the empty string.
fn blank_undefined(literal: Literal) -> Literal {
    match literal {
        Literal::Undefined => Literal::string(""),
        other => other,
    }
}

fn concat(l: &Literal, r: &Literal) -> Value {
    let mut joined = l.as_str();
    joined.push_str(&r.as_str());
    Value::Lit(Literal::string(joined))
}

fn arithmetic(t: &mut Traverser<'_>, operator: &str, left: &Value, right: &Value) -> Value {
    let (l, r) = (t.heap.literal_value(left), t.heap.literal_value(right));
    let shift = SHIFTS.contains(&operator);
    if shift && (l.is_nullish() || r.is_nullish() || r.as_num() < 0.0) {
        return Value::Lit(Literal::Bool(false));
    }
    let numeric = |value: &Value, literal: &Literal| !t.heap.is_opaque(value) && literal.is_numeric();
    if !numeric(left, &l) || !numeric(right, &r) {
        return t.nan();
    }

    let (a, b) = (l.as_num(), r.as_num());
    if shift && (a.is_infinite() || b.is_infinite()) {
        return t.nan();
    }
    let result = numeric_op(operator, a, b);
    if result.is_nan() {
        t.nan()
    } else {
        number(result)
    }
}

pub(crate) fn assignment_expression(t: &mut Traverser<'_>, id: NodeId) -> Flow {
    let node = t.node(id);
    let operator = node.str("operator").unwrap_or("=");
    let (Some(left_id), Some(right_id)) = (node.child("left"), node.child("right")) else {
        return Flow::Continue;
    };

    let right = t.traverse(right_id);
    let left = t.traverse(left_id);

    if operator == "=" {
        set_lvalue(t, left_id, right.clone());
        return Flow::Value(right);
    }

    let Some(binary) = operator.strip_suffix('=') else {
        return Flow::Value(left);
    };
    if binary != "+" && !ARITHMETIC.contains(&binary) {
        return Flow::Value(left);
    }

    if lvalue_is_const(t, left_id) {
        t.report(
            MessageKind::Warning,
            &["js", "AssignmentExpression", "aug_const_overwrite"],
            "Overwritten constant value",
            "A variable declared as constant has been overwritten in some JS code by an \
             augmented assignment.",
        );
        return Flow::Value(t.opaque());
    }

    let value = if binary == "+" {
        add_assign(t, &left, &right)
    } else {
        arithmetic_assign(t, binary, &left, &right)
    };
    set_lvalue(t, left_id, value.clone());
    Flow::Value(value)
}

fn add_assign(t: &mut Traverser<'_>, left: &Value, right: &Value) -> Value {
    if t.heap.is_opaque(left) || t.heap.is_opaque(right) {
        return t.opaque();
    }
    let l = blank_undefined(t.heap.literal_value(left));
    let r = blank_undefined(t.heap.literal_value(right));
    if l.is_string() || r.is_string() {
        return concat(&l, &r);
    }
    let sum = l.as_num() + r.as_num();
    if sum.is_nan() {
        t.nan()
    } else {
        number(sum)
    }
}

fn arithmetic_assign(t: &mut Traverser<'_>, operator: &str, left: &Value, right: &Value) -> Value {
    let (l, r) = (t.heap.literal_value(left), t.heap.literal_value(right));
    let left_ok = !t.heap.is_opaque(left)
        && matches!(l, Literal::Number(_) | Literal::Bool(_) | Literal::Undefined | Literal::Null);
    let right_ok = !t.heap.is_opaque(right) && r.is_numeric();
    if !left_ok || !right_ok {
        return t.nan();
    }

    let (a, b) = (l.as_num(), r.as_num());
    let shift = SHIFTS.contains(&operator);
    if shift && b < 0.0 {
        return number(0.0);
    }
    if (shift || BITWISE.contains(&operator)) && (a.is_infinite() || b.is_infinite()) {
        return t.nan();
    }
    let result = numeric_op(operator, a, b);
    if result.is_nan() {
        t.nan()
    } else {
        number(result)
    }
}

fn lvalue_is_const(t: &mut Traverser<'_>, target: NodeId) -> bool {
    let node = t.node(target);
    match node.node_type.as_str() {
        "Identifier" => node.str("name").map(|name| t.identifier_is_const(name)).unwrap_or(false),
        "MemberExpression" => {
            let Some(object) = node.child("object") else { return false };
            let object = member_expression(t, object, false);
            let name = member_property(t, node);
            t.property_is_const(&object, &name)
        }
        _ => false,
    }
}

/// Stores `value` wherever the assignment target points.
fn set_lvalue(t: &mut Traverser<'_>, target: NodeId, value: Value) {
    let node = t.node(target);
    match node.node_type.as_str() {
        "Identifier" => {
            let Some(name) = node.str("name") else { return };
            if !t.is_local(name) {
                let registry = t.registry;
                if let Some(entity) = registry.lookup(name) {
                    t.check_global_overwrite(registry.root(), entity);
                }
            }
            t.declare_variable(name, value, DeclKind::Glob);
        }
        "MemberExpression" => {
            let Some(object) = node.child("object") else { return };
            let object = member_expression(t, object, true);
            let name = member_property(t, node);
            t.set_property(&object, &name, value);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int32_conversion() {
        assert_eq!(to_i32(4_294_967_295.0), -1);
        assert_eq!(to_i32(-1.0), -1);
        assert_eq!(to_u32(-1.0), 4_294_967_295);
        assert_eq!(to_i32(2.9), 2);
        assert_eq!(to_i32(f64::NAN), 0);
    }

    #[test]
    fn test_numeric_operators() {
        assert_eq!(numeric_op("/", 5.0, 0.0), 0.0);
        assert_eq!(numeric_op("%", 5.0, 0.0), 0.0);
        assert_eq!(numeric_op("%", -7.0, 3.0), -1.0);
        assert_eq!(numeric_op("<<", 1.0, 33.0), 2.0);
        assert_eq!(numeric_op(">>", -8.0, 1.0), -4.0);
        assert_eq!(numeric_op(">>>", -1.0, 28.0), 15.0);
        assert_eq!(numeric_op("^", 6.0, 3.0), 5.0);
    }

    #[test]
    fn test_loose_literal_equality() {
        assert!(loose_literal_eq(&Literal::Null, &Literal::Undefined));
        assert!(loose_literal_eq(&Literal::Bool(true), &Literal::Number(1.0)));
        assert!(loose_literal_eq(&Literal::from("1"), &Literal::Number(1.0)));
        assert!(loose_literal_eq(&Literal::from("0"), &Literal::Bool(false)));
        assert!(loose_literal_eq(&Literal::from(""), &Literal::Number(0.0)));
        assert!(!loose_literal_eq(&Literal::from("abc"), &Literal::Number(0.0)));
        assert!(!loose_literal_eq(&Literal::Null, &Literal::Number(0.0)));
        assert!(!loose_literal_eq(&Literal::from("1"), &Literal::from("1.0")));
        assert!(!loose_literal_eq(&Literal::Number(f64::NAN), &Literal::Number(f64::NAN)));
    }
}
