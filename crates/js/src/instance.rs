//! Behaviour keyed on property names, whatever object they are found on.
//!
//! Actions run when a method of that name is called on any receiver.
//! Property hooks run when a property of that name is read or written.

use appvalidator_report::{ErrorBundle, FileRef, MessageKind};
use lazy_static::lazy_static;
use regex::Regex;

use crate::ast::NodeId;
use crate::traverser::Traverser;
use crate::value::{Literal, Value};

/// Receives markup found in string literals assigned to `innerHTML` and
/// friends.
pub trait MarkupChecker {
    fn check_markup(&self, err: &mut ErrorBundle, file: &FileRef, markup: &str);
}

lazy_static! {
    static ref EVENT_ASSIGNMENT: Regex = Regex::new(r"<[^>]+ on[a-z]+=").unwrap();
    static ref JS_URL: Regex = Regex::new(r#"href=['"]javascript:"#).unwrap();
}

const TOUCH_EVENTS: [&str; 4] = ["ontouchstart", "ontouchend", "ontouchmove", "ontouchcancel"];

/// Runs the action registered for `name`, if any. `Some` short-circuits
/// the rest of the call evaluation.
pub(crate) fn call_action(
    t: &mut Traverser<'_>,
    name: &str,
    args: &[NodeId],
    receiver: &Value,
) -> Option<Value> {
    match name {
        "createElement" => {
            let tag = args.first().map(|arg| t.traverse(*arg))?;
            create_element(t, &tag, |tag| tag.eq_ignore_ascii_case("script"));
            None
        }
        "createElementNS" => {
            if args.len() < 2 {
                return None;
            }
            let tag = t.traverse(args[1]);
            create_element(t, &tag, |tag| tag.to_lowercase().contains("script"));
            None
        }
        "insertAdjacentHTML" => {
            if args.len() < 2 {
                return None;
            }
            let content = t.traverse(args[1]);
            set_html_property(t, &content);
            None
        }
        "setAttribute" => {
            let attribute = args.first().map(|arg| t.traverse(*arg))?;
            if t.heap.as_str(&attribute).to_lowercase().starts_with("on") {
                t.warn_csp("setAttribute-on");
            }
            None
        }
        "bind" => {
            if t.heap.is_callable(receiver) {
                Some(receiver.clone())
            } else {
                Some(t.opaque())
            }
        }
        "requestFullScreen" | "mozRequestFullScreen" | "webkitRequestFullScreen" => {
            t.log_feature("FULLSCREEN");
            None
        }
        "requestPointerLock" | "mozRequestPointerLock" | "webkitRequestPointerLock" => {
            t.log_feature("POINTER_LOCK");
            None
        }
        _ => None,
    }
}

fn create_element(t: &mut Traverser<'_>, tag: &Value, is_script: impl Fn(&str) -> bool) {
    if is_script(&t.heap.as_str(tag)) {
        t.warn_csp("createElement-script");
    } else if tag.literal().is_none() {
        t.warn_csp("createElement-variable");
    }
}

/// Hook for reading `name` from any object.
pub(crate) fn on_get(t: &mut Traverser<'_>, name: &str) {
    if TOUCH_EVENTS.contains(&name) {
        t.log_feature("TOUCH");
    }
}

/// Hook for writing `value` to `name` on any object.
pub(crate) fn on_set(t: &mut Traverser<'_>, name: &str, value: &Value) {
    match name {
        "innerHTML" | "outerHTML" => set_html_property(t, value),
        _ if TOUCH_EVENTS.contains(&name) => t.log_feature("TOUCH"),
        _ if is_event_property(name) => {
            if let Value::Lit(Literal::Str(_)) = value {
                t.warn_csp("setting_on-event");
            }
        }
        _ => {}
    }
}

fn is_event_property(name: &str) -> bool {
    name.len() > 2 && name.starts_with("on")
}

fn set_html_property(t: &mut Traverser<'_>, value: &Value) {
    let markup = match value {
        Value::Lit(Literal::Str(markup)) => markup,
        Value::Lit(_) => return,
        Value::Obj(_) => {
            t.report(
                MessageKind::Warning,
                &["js", "innerHTML", "dynamic"],
                "innerHTML should not be set dynamically",
                "Markup assigned from values that cannot be traced statically may carry \
                 inline script. Build the markup from static strings or DOM methods.",
            );
            return;
        }
    };

    if EVENT_ASSIGNMENT.is_match(&markup.to_lowercase()) {
        t.warn_csp("javascript_event_assignment");
    } else if markup.contains("<script") || JS_URL.is_match(markup) {
        t.warn_csp("javascript_url");
    } else {
        t.check_markup(markup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_patterns() {
        assert!(EVENT_ASSIGNMENT.is_match("<a onclick=\"x()\">"));
        assert!(EVENT_ASSIGNMENT.is_match("<img src=x onerror=alert(1)>"));
        assert!(!EVENT_ASSIGNMENT.is_match("<b>on top=</b>"));
        assert!(JS_URL.is_match("<a href='javascript:void(0)'>"));
        assert!(is_event_property("onload"));
        assert!(!is_event_property("on"));
    }
}
