//! Source-to-tree backends.
//!
//! Every backend produces the same Reflect-dialect [`Ast`]. The built-in
//! parser runs in-process; the SpiderMonkey and Acorn backends shell out to
//! an external engine and read its JSON tree back.

mod acorn;
mod builtin;
mod lexer;
mod spidermonkey;

use std::borrow::Cow;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

pub use acorn::AcornParser;
pub use builtin::BuiltinParser;
pub use lexer::{Lexer, TemplatePart, Tok, Token};
pub use spidermonkey::SpiderMonkeyParser;

use crate::ast::Ast;
use crate::error::{ParseError, ParseResult};

/// Turns JavaScript source into a syntax tree.
pub trait JsParser: Send + Sync {
    fn parse(&self, source: &str) -> ParseResult<Ast>;
}

/// Which parser to use, as it appears in configuration files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JsBackend {
    #[default]
    Builtin,
    /// A SpiderMonkey shell binary exposing `Reflect.parse`
    Spidermonkey { path: PathBuf },
    /// Node.js with the `acorn` package resolvable from its module path
    Acorn {
        #[serde(default = "default_node")]
        node: PathBuf,
    },
}

fn default_node() -> PathBuf {
    PathBuf::from("node")
}

impl JsBackend {
    pub fn parser(&self) -> Box<dyn JsParser> {
        match self {
            JsBackend::Builtin => Box::new(BuiltinParser),
            JsBackend::Spidermonkey { path } => Box::new(SpiderMonkeyParser::new(path.clone())),
            JsBackend::Acorn { node } => Box::new(AcornParser::new(node.clone())),
        }
    }
}

lazy_static! {
    static ref JS_ESCAPE: Regex = Regex::new(r"(?i)\\+[ux]").unwrap();
}

/// Neutralises `\u`/`\x` escape runs before the source is handed to a
/// backend, so escaped identifiers cannot smuggle names past the checks.
pub fn strip_escapes(source: &str) -> Cow<'_, str> {
    JS_ESCAPE.replace_all(source, "u")
}

/// Feeds `input` to the child's stdin and collects its stdout.
///
/// Anything on stderr is treated as a backend failure.
pub(crate) fn run_backend(mut command: Command, input: Vec<u8>) -> ParseResult<String> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| ParseError::Runtime("backend stdin unavailable".to_string()))?;
    // Written from a separate thread so a large tree on stdout cannot
    // deadlock against a large script on stdin.
    let writer = std::thread::spawn(move || stdin.write_all(&input));
    let output = child.wait_with_output()?;
    match writer.join() {
        Ok(result) => result?,
        Err(_) => return Err(ParseError::Runtime("backend writer panicked".to_string())),
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        log::debug!("JS backend stderr: {}", stderr.trim());
        return Err(ParseError::Runtime(stderr.trim().to_string()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Reads a backend's answer: either a tree or an error object of the form
/// `{"error": true, "error_message": ..., "line_number": ...}`.
pub(crate) fn read_backend_output(output: &str) -> ParseResult<Ast> {
    let output = output.trim();
    if output.is_empty() {
        return Err(ParseError::Malformed("Reflection failed".to_string()));
    }
    let tree: Json = match serde_json::from_str(output) {
        Ok(tree) => tree,
        Err(e) if e.to_string().contains("recursion limit") => return Err(ParseError::TooMuchRecursion),
        Err(e) => return Err(ParseError::Malformed(e.to_string())),
    };

    if tree.get("error").and_then(Json::as_bool).unwrap_or(false) {
        let message = tree.get("error_message").and_then(Json::as_str).unwrap_or_default().to_string();
        let line = tree.get("line_number").and_then(Json::as_u64).map(|l| l as usize);
        if message.contains("too much recursion") {
            return Err(ParseError::TooMuchRecursion);
        }
        return Err(ParseError::Syntax { message, line });
    }
    Ast::from_json(&tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strip_escapes() {
        assert_eq!(strip_escapes(r"\u0065val"), "u0065val");
        assert_eq!(strip_escapes(r"\\\X41"), "u41");
        assert_eq!(strip_escapes("plain"), "plain");
    }

    #[test]
    fn test_backend_error_object() {
        let out = r#"{"error":true,"error_message":"SyntaxError: missing ; before statement","line_number":4}"#;
        match read_backend_output(out) {
            Err(ParseError::Syntax { message, line }) => {
                assert_eq!(message, "SyntaxError: missing ; before statement");
                assert_eq!(line, Some(4));
            }
            other => panic!("unexpected {:?}", other.map(|a| a.len())),
        }
    }

    #[test]
    fn test_backend_empty_output() {
        assert!(matches!(read_backend_output("  \n"), Err(ParseError::Malformed(m)) if m == "Reflection failed"));
    }

    #[test]
    fn test_backend_tree() {
        let out = r#"{"type":"Program","body":[{"type":"EmptyStatement","loc":{"start":{"line":1,"column":0}}}]}"#;
        let ast = read_backend_output(out).unwrap();
        assert_eq!(ast.len(), 2);
    }

    #[test]
    fn test_backend_config() {
        let backend: JsBackend = serde_json::from_str(r#"{"kind":"acorn"}"#).unwrap();
        assert_eq!(backend, JsBackend::Acorn { node: PathBuf::from("node") });
        assert_eq!(serde_json::from_str::<JsBackend>(r#"{"kind":"builtin"}"#).unwrap(), JsBackend::Builtin);
    }
}
