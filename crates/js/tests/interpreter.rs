use appvalidator_js::{Ast, BuiltinParser, JsParser, Literal, Traverser, MAX_STR_SIZE};
use appvalidator_report::ErrorBundle;
use pretty_assertions::assert_eq;

/// Walks `source` and returns the report plus the final global value of
/// each requested name.
fn evaluate(source: &str, names: &[&str]) -> (ErrorBundle, Vec<Option<Literal>>) {
    let ast = BuiltinParser.parse(source).expect("test script should parse");
    walk(&ast, names)
}

fn walk(ast: &Ast, names: &[&str]) -> (ErrorBundle, Vec<Option<Literal>>) {
    let mut err = ErrorBundle::new(true);
    let values = {
        let mut traverser = Traverser::new(&mut err, "test.js", ast);
        traverser.run();
        names.iter().map(|name| traverser.variable_literal(name)).collect()
    };
    (err, values)
}

fn count(err: &ErrorBundle, id: &[&str]) -> usize {
    err.messages().filter(|m| m.id.iter().map(String::as_str).eq(id.iter().copied())).count()
}

fn num(n: f64) -> Option<Literal> {
    Some(Literal::Number(n))
}

fn string(s: &str) -> Option<Literal> {
    Some(Literal::Str(s.to_string()))
}

#[test]
fn test_arithmetic_propagates() {
    let (err, values) = evaluate(
        "var x = 1, y = 2, z = 3;\nvar a = x + y * z;\nvar b = (x + y) * z;\nvar c = z - x - y;",
        &["a", "b", "c"],
    );
    assert_eq!(values, vec![num(7.0), num(9.0), num(0.0)]);
    assert_eq!(err.messages().count(), 0);
}

fn boolean(b: bool) -> Option<Literal> {
    Some(Literal::Bool(b))
}

#[test]
fn test_loose_equality_coerces_numbers() {
    let (_, values) = evaluate(
        "var a = (1 == '1'), b = (0 == '0'), c = (false == '0'), d = (1 != '1');\n\
         var e = ('abc' == 0), f = (null == 0), g = (null == undefined), h = ('1' === 1);",
        &["a", "b", "c", "d", "e", "f", "g", "h"],
    );
    assert_eq!(
        values,
        vec![
            boolean(true),
            boolean(true),
            boolean(true),
            boolean(false),
            boolean(false),
            boolean(false),
            boolean(true),
            boolean(false),
        ]
    );
}

#[test]
fn test_undefined_concatenates_as_empty_string() {
    let (_, values) = evaluate(
        "var s = undefined + 'abc'; var t = 'abc' + undefined; var n = null + 1;\n\
         var u = undefined; u += 'x'; var v = 'y'; v += undefined;",
        &["s", "t", "n", "u", "v"],
    );
    assert_eq!(values, vec![string("abc"), string("abc"), num(1.0), string("x"), string("y")]);
}

#[test]
fn test_constructors_without_new_hook_return_primitives() {
    let (_, values) = evaluate(
        "var a = typeof new Number('5'), b = new Number('5') + 1, c = typeof new Boolean(1);",
        &["a", "b", "c"],
    );
    assert_eq!(values, vec![string("number"), num(6.0), string("boolean")]);
}

#[test]
fn test_division_by_zero_is_zero() {
    let (_, values) = evaluate("var d = 5 / 0; var m = 5 % 0;", &["d", "m"]);
    assert_eq!(values, vec![num(0.0), num(0.0)]);
}

#[test]
fn test_typeof_table() {
    let (_, values) = evaluate(
        "var a = typeof 'x', b = typeof 1, c = typeof true, d = typeof {}, e = typeof function () {};",
        &["a", "b", "c", "d", "e"],
    );
    assert_eq!(
        values,
        vec![string("string"), string("number"), string("boolean"), string("object"), string("function")]
    );
}

#[test]
fn test_logical_not() {
    let (_, values) = evaluate("var a = !0, b = !'x', c = !!1;", &["a", "b", "c"]);
    assert_eq!(values, vec![Some(Literal::Bool(true)), Some(Literal::Bool(false)), Some(Literal::Bool(true))]);
}

#[test]
fn test_string_concatenation() {
    let (_, values) = evaluate("var s = 'a' + 1 + 2; var t = 1 + 2 + 'a';", &["s", "t"]);
    assert_eq!(values, vec![string("a12"), string("3a")]);
}

#[test]
fn test_augmented_assignment() {
    let (_, values) = evaluate("var x = 4; x += 1; x *= 2; x -= 3;", &["x"]);
    assert_eq!(values, vec![num(7.0)]);
}

#[test]
fn test_strings_stay_bounded() {
    let mut source = String::from("var x = 'xx'; var y = 'yy';\n");
    for _ in 0..100 {
        source.push_str("y += y + x;\n");
    }
    let (_, values) = evaluate(&source, &["y"]);
    let Some(Literal::Str(y)) = &values[0] else {
        panic!("y should stay a string, got {:?}", values[0]);
    };
    assert!(y.len() <= MAX_STR_SIZE);
    assert!(y.starts_with("yy"));
}

#[test]
fn test_long_concatenation_chain() {
    let source = format!("var s = {};", vec!["'ab'"; 3000].join(" + "));
    let (_, values) = evaluate(&source, &["s"]);
    assert_eq!(values, vec![string(&"ab".repeat(3000))]);
}

#[test]
fn test_math_functions() {
    let (_, values) = evaluate("var a = Math.abs(-5); var b = Math.max(1, 7, 3);", &["a", "b"]);
    assert_eq!(values, vec![num(5.0), num(7.0)]);
}

#[test]
fn test_sync_xhr_is_flagged() {
    let (err, _) = evaluate(
        r#"var x=new XMLHttpRequest(); x.open("GET","/u",false); x.send(null);"#,
        &[],
    );
    assert_eq!(count(&err, &["javascript", "xhr", "sync"]), 1);
}

#[test]
fn test_async_xhr_is_fine() {
    let (err, _) = evaluate(r#"var x=new XMLHttpRequest(); x.open("GET","/u",true);"#, &[]);
    assert_eq!(count(&err, &["javascript", "xhr", "sync"]), 0);
}

#[test]
fn test_create_element_with_variable() {
    let (err, _) = evaluate("var s=foo(); document.createElement(s);", &[]);
    assert_eq!(count(&err, &["csp", "createElement-variable"]), 1);
    assert_eq!(err.warnings().len(), 1);
}

#[test]
fn test_create_script_element() {
    let (err, _) = evaluate("document.createElement('SCRIPT');", &[]);
    assert_eq!(count(&err, &["csp", "createElement-script"]), 1);
}

#[test]
fn test_eval_and_string_timers() {
    let (err, _) = evaluate("eval('1');\nsetTimeout('go()', 10);\nsetTimeout(function () {}, 10);", &[]);
    assert_eq!(count(&err, &["csp", "script"]), 1);
    assert_eq!(count(&err, &["csp", "set*"]), 1);
}

#[test]
fn test_inner_html_sinks() {
    let (err, _) = evaluate(
        "var e = document.getElementById('a');\ne.innerHTML = '<a onclick=\"x()\">x</a>';\ne.innerHTML = foo;",
        &[],
    );
    assert_eq!(count(&err, &["csp", "javascript_event_assignment"]), 1);
    assert_eq!(count(&err, &["js", "innerHTML", "dynamic"]), 1);
}

#[test]
fn test_features_are_logged() {
    let (err, _) = evaluate("navigator.vibrate(100);\nnew XMLHttpRequest({mozSystem: true});", &[]);
    assert!(err.feature_profile().contains("VIBRATE"));
    assert!(err.feature_profile().contains("SYSTEMXHR"));
}

#[test]
fn test_const_overwrite() {
    let (err, values) = evaluate("const c = 1;\nc += 2;", &["c"]);
    assert_eq!(count(&err, &["js", "AssignmentExpression", "aug_const_overwrite"]), 1);
    assert_eq!(values, vec![num(1.0)]);
}

#[test]
fn test_both_branches_are_walked() {
    let (err, _) = evaluate("if (false) { eval('a'); } else { setTimeout('b', 1); }", &[]);
    assert_eq!(count(&err, &["csp", "script"]), 1);
    assert_eq!(count(&err, &["csp", "set*"]), 1);
}

#[test]
fn test_function_bodies_are_walked() {
    let (err, _) = evaluate("function later() { eval('x'); }\nvar f = () => { eval('y'); };", &[]);
    assert_eq!(count(&err, &["csp", "script"]), 2);
}

#[test]
fn test_e4x_is_banned() {
    let tree = serde_json::json!({
        "type": "Program",
        "body": [{
            "type": "ExpressionStatement",
            "loc": {"start": {"line": 1, "column": 0}},
            "expression": {"type": "XMLElement", "contents": [], "loc": {"start": {"line": 1, "column": 0}}}
        }]
    });
    let ast = Ast::from_json(&tree).unwrap();
    let (err, _) = walk(&ast, &[]);
    assert_eq!(count(&err, &["js", "traverser", "e4x"]), 1);
    assert!(err.failed(false));
}
