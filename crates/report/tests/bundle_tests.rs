//! Report bundle integration tests
//!
//! Exercises the bundle the way the validator drives it across tiers.

use appvalidator_report::{
    warn_csp, ContextGenerator, CspSeverity, Diagnostic, ErrorBundle, FileRef, ReportSnapshot,
};
use pretty_assertions::assert_eq;

fn tiered_bundle() -> ErrorBundle {
    let mut err = ErrorBundle::new(false);
    err.set_tier(1);
    err.error(Diagnostic::new(["packagelayout", "duplicate_entries"], "Duplicate entries"));
    err.set_tier(2);
    err.warning(Diagnostic::new(["webapp", "locales", "not_supported"], "Unsupported locale"));
    err.set_tier(3);
    err.notice(Diagnostic::new(["js", "x"], "notice").file("a.js").line(1));
    err
}

#[test]
fn test_messages_are_grouped_by_severity() {
    let mut err = ErrorBundle::default();
    err.notice(Diagnostic::new(["n"], "first"));
    err.warning(Diagnostic::new(["w"], "second"));
    err.error(Diagnostic::new(["e"], "third"));

    let json = err.to_json().unwrap();
    let kinds: Vec<_> = json["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["error", "warning", "notice"]);
    assert_eq!(json["errors"], 1);
    assert_eq!(json["warnings"], 1);
    assert_eq!(json["notices"], 1);
}

#[test]
fn test_stopping_early_trims_later_tiers() {
    let mut err = tiered_bundle();
    err.discard_unused_messages(1);
    err.unfinished = true;

    assert_eq!(err.messages().count(), 1);
    assert!(err.has_message(&["packagelayout", "duplicate_entries"]));
    assert_eq!(err.ending_tier(), 3);
}

#[test]
fn test_render_json_reload_is_stable() {
    let err = tiered_bundle();
    let first = err.render_json().unwrap();
    let snapshot = ReportSnapshot::from_json(&first).unwrap();
    let second = serde_json::to_string(&snapshot).unwrap();

    let a: serde_json::Value = serde_json::from_str(&first).unwrap();
    let b: serde_json::Value = serde_json::from_str(&second).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_tampered_counts_are_rejected() {
    let err = tiered_bundle();
    let mut json = err.to_json().unwrap();
    json["errors"] = serde_json::json!(7);
    assert!(ReportSnapshot::from_json(&json.to_string()).is_err());
}

#[test]
fn test_csp_context_is_resolved() {
    let source = "var a;\neval('1');\nvar b;";
    let generator = ContextGenerator::new(source);
    let mut err = ErrorBundle::default();
    err.save_resource("app_type", "privileged");

    warn_csp(
        &mut err,
        &FileRef::from("app.js"),
        Some(2),
        Some(0),
        Some(&generator),
        "script",
        CspSeverity::Warning,
    );

    let warning = &err.warnings()[0];
    assert_eq!(warning.context.as_ref().unwrap()[1].as_deref(), Some("eval('1');"));
    assert_eq!(warning.id, vec!["csp", "script"]);
}
