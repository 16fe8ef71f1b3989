//! Content Security Policy violations.
//!
//! Privileged and certified apps run under a CSP that forbids eval, inline
//! script and remote script. Web apps are not bound by it, so their
//! violations are always downgraded to warnings.

use crate::bundle::ErrorBundle;
use crate::context::ContextGenerator;
use crate::message::{Diagnostic, FileRef, MessageKind};

const CSP_INFO: &str = "https://developer.mozilla.org/Apps/CSP";
const MESSAGE_TITLE: &str = "CSP Violation Detected";

fn general_description() -> String {
    format!(
        "You can find more information about what is and is not allowed by the CSP on \
         the Mozilla Developers website. {}",
        CSP_INFO
    )
}

fn description(web: bool) -> Vec<String> {
    let first = if web {
        "An action that you're performing violates the CSP (content security policy). \
         While this does not affect your app, if you decide to add permissions to your \
         app in the future, you will be unable to do so until this problem is corrected. \
         It is highly recommended that you remedy this."
    } else {
        "It appears that your code may be performing an action which violates the CSP \
         (content security policy) for privileged apps."
    };
    vec![first.to_string(), general_description()]
}

/// Severity requested by the code that found the violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CspSeverity {
    Warning,
    Error,
}

/// Reports a CSP violation with id `("csp", violation_type)`.
pub fn warn_csp(
    err: &mut ErrorBundle,
    file: &FileRef,
    line: Option<usize>,
    column: Option<usize>,
    context: Option<&ContextGenerator>,
    violation_type: &str,
    severity: CspSeverity,
) {
    let web = err.resource_str("app_type") == Some("web");
    let kind = match severity {
        _ if web => MessageKind::Warning,
        CspSeverity::Warning => MessageKind::Warning,
        CspSeverity::Error => MessageKind::Error,
    };

    let diagnostic = Diagnostic::new(["csp", violation_type], MESSAGE_TITLE)
        .description(description(web))
        .file(file)
        .maybe_line(line)
        .maybe_column(column)
        .maybe_context_from(context);
    err.report(kind, diagnostic);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_apps_only_get_warnings() {
        let mut err = ErrorBundle::default();
        err.save_resource("app_type", "web");
        warn_csp(&mut err, &"a.html".into(), Some(1), None, None, "script_attribute", CspSeverity::Error);
        assert!(err.errors().is_empty());
        assert_eq!(err.warnings()[0].id, vec!["csp", "script_attribute"]);
    }

    #[test]
    fn test_privileged_apps_keep_severity() {
        let mut err = ErrorBundle::default();
        err.save_resource("app_type", "privileged");
        warn_csp(&mut err, &"a.html".into(), Some(1), None, None, "remote_script", CspSeverity::Error);
        warn_csp(&mut err, &"a.js".into(), Some(2), None, None, "script", CspSeverity::Warning);
        assert_eq!(err.errors().len(), 1);
        assert_eq!(err.warnings().len(), 1);
    }
}
