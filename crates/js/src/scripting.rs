//! Entry points that take JavaScript source all the way to findings.

use std::time::Instant;

use appvalidator_report::{ContextGenerator, Diagnostic, ErrorBundle, FileRef, MessageKind, Text};

use crate::ast::Ast;
use crate::error::ParseError;
use crate::instance::MarkupChecker;
use crate::parser::{strip_escapes, BuiltinParser, JsParser};
use crate::traverser::Traverser;

static BUILTIN: BuiltinParser = BuiltinParser;

/// Knobs shared by every script in a run.
#[derive(Clone, Copy)]
pub struct ScriptOptions<'a> {
    pub parser: &'a dyn JsParser,
    pub markup: Option<&'a dyn MarkupChecker>,
    pub deadline: Option<Instant>,
}

impl Default for ScriptOptions<'_> {
    fn default() -> Self {
        Self { parser: &BUILTIN, markup: None, deadline: None }
    }
}

/// What happened to one script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// Nothing to do
    Empty,
    /// The source did not produce a tree; the reason was reported
    NoTree,
    /// The tree was walked to the end
    Walked,
    /// The deadline passed mid-walk
    TimedOut,
}

/// Parses `source`, reporting why when there is no tree.
pub fn get_tree(
    err: &mut ErrorBundle,
    file: &FileRef,
    source: &str,
    line_offset: usize,
    context: Option<&ContextGenerator>,
    parser: &dyn JsParser,
) -> Option<Ast> {
    let prepared = strip_escapes(source);
    let failure = match parser.parse(&prepared) {
        Ok(ast) => return Some(ast),
        Err(e) => e,
    };
    log::debug!("No syntax tree for {}: {}", file, failure);

    let own;
    let (context, line_offset) = match context {
        Some(context) => (context, line_offset),
        None => {
            own = ContextGenerator::new(source);
            (&own, 0)
        }
    };

    match failure {
        ParseError::Syntax { message, line }
            if message.contains("SyntaxError") || message.contains("ReferenceError") =>
        {
            let detail = message.split_once(':').map_or(message.as_str(), |(_, rest)| rest).trim();
            err.warning(
                Diagnostic::new(
                    ["testcases_scripting", "test_js_file", "syntax_error"],
                    "JavaScript Compile-Time Error",
                )
                .description(vec![
                    "A compile-time error in the JavaScript halted validation of that file.".to_string(),
                    format!("Message: {}", detail),
                ])
                .file(file.clone())
                .maybe_line(line.map(|l| l + line_offset))
                .context_from(context),
            );
        }
        ParseError::TooMuchRecursion => {
            err.notice(
                Diagnostic::new(
                    ["testcases_scripting", "test_js_file", "recursion_error"],
                    "JS too deeply nested for validation",
                )
                .description(
                    "A JS file was encountered that could not be valiated due to limitations \
                     with Spidermonkey. It should be manually inspected.",
                )
                .file(file.clone()),
            );
        }
        ParseError::Runtime(ref message) => runtime_warning(err, file, message),
        ParseError::Io(ref e) => runtime_warning(err, file, &e.to_string()),
        other => {
            err.error(
                Diagnostic::new(
                    ["testcases_scripting", "test_js_file", "retrieving_tree"],
                    "JS reflection error prevented validation",
                )
                .description(vec![
                    "An error in the JavaScript file prevented it from being properly read by \
                     the Spidermonkey JS engine."
                        .to_string(),
                    other.to_string(),
                ])
                .file(file.clone()),
            );
        }
    }
    None
}

fn runtime_warning(err: &mut ErrorBundle, file: &FileRef, message: &str) {
    let title = if message.contains("out of memory") {
        "JS: Out of memory exception"
    } else {
        "JS: Unknown runtime error"
    };
    err.report(
        MessageKind::Warning,
        Diagnostic::new(["js", "parse", "runtimeerror"], title)
            .description(Text::from("An error was encountered while trying to validate a JS file."))
            .file(file.clone()),
    );
}

/// Validates a standalone script file at tier 3.
pub fn test_js_file(
    err: &mut ErrorBundle,
    file: impl Into<FileRef>,
    source: &str,
    line_offset: usize,
    context: Option<&ContextGenerator>,
    options: &ScriptOptions<'_>,
) -> ScriptOutcome {
    if source.trim().is_empty() {
        return ScriptOutcome::Empty;
    }
    let file = file.into();
    let previous_tier = err.tier();
    err.set_tier(3);

    let outcome = match get_tree(err, &file, source, line_offset, context, options.parser) {
        None => {
            err.set_metadata("ran_js_tests", "no;missing ast");
            ScriptOutcome::NoTree
        }
        Some(ast) => {
            let outcome = walk(err, file, source, &ast, line_offset, context, options);
            err.set_metadata("ran_js_tests", "yes");
            outcome
        }
    };

    err.set_tier(previous_tier);
    outcome
}

/// Validates a script embedded in another file (inline `<script>`, event
/// handler attributes). The tier and run metadata are left alone.
pub fn test_js_snippet(
    err: &mut ErrorBundle,
    file: impl Into<FileRef>,
    source: &str,
    line_offset: usize,
    context: Option<&ContextGenerator>,
    options: &ScriptOptions<'_>,
) -> ScriptOutcome {
    if source.trim().is_empty() {
        return ScriptOutcome::Empty;
    }
    let file = file.into();
    match get_tree(err, &file, source, line_offset, context, options.parser) {
        None => ScriptOutcome::NoTree,
        Some(ast) => walk(err, file, source, &ast, line_offset, context, options),
    }
}

fn walk(
    err: &mut ErrorBundle,
    file: FileRef,
    source: &str,
    ast: &Ast,
    line_offset: usize,
    context: Option<&ContextGenerator>,
    options: &ScriptOptions<'_>,
) -> ScriptOutcome {
    let own;
    let context = match context {
        Some(context) => context,
        None => {
            own = ContextGenerator::new(source);
            &own
        }
    };
    let mut traverser = Traverser::new(err, file, ast)
        .with_context(Some(context))
        .with_start_line(line_offset)
        .with_markup(options.markup)
        .with_deadline(options.deadline);
    traverser.run();
    if traverser.timed_out() {
        ScriptOutcome::TimedOut
    } else {
        ScriptOutcome::Walked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tier_is_restored() {
        let mut err = ErrorBundle::new(true);
        err.set_tier(2);
        let outcome = test_js_file(&mut err, "a.js", "var x = 1;", 0, None, &ScriptOptions::default());
        assert_eq!(outcome, ScriptOutcome::Walked);
        assert_eq!(err.tier(), 2);
        assert_eq!(err.metadata()["ran_js_tests"], "yes");
    }

    #[test]
    fn test_syntax_error_is_a_warning() {
        let mut err = ErrorBundle::new(true);
        let outcome = test_js_file(&mut err, "a.js", "var x = ;", 0, None, &ScriptOptions::default());
        assert_eq!(outcome, ScriptOutcome::NoTree);
        assert!(err.has_message(&["testcases_scripting", "test_js_file", "syntax_error"]));
        assert!(!err.failed(false));
        assert_eq!(err.metadata()["ran_js_tests"], "no;missing ast");
    }

    #[test]
    fn test_deep_nesting_is_a_notice() {
        let mut err = ErrorBundle::new(true);
        let source = format!("x = {}1{};", "[".repeat(300), "]".repeat(300));
        test_js_file(&mut err, "a.js", &source, 0, None, &ScriptOptions::default());
        assert!(err.has_message(&["testcases_scripting", "test_js_file", "recursion_error"]));
        assert_eq!(err.notices().len(), 1);
    }

    #[test]
    fn test_blank_source_is_skipped() {
        let mut err = ErrorBundle::new(true);
        let outcome = test_js_snippet(&mut err, "a.html", "  \n ", 3, None, &ScriptOptions::default());
        assert_eq!(outcome, ScriptOutcome::Empty);
        assert!(err.metadata().get("ran_js_tests").is_none());
    }
}
