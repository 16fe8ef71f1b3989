use std::path::PathBuf;
use std::process::Command;

use super::{read_backend_output, run_backend, JsParser};
use crate::ast::Ast;
use crate::error::{ParseError, ParseResult};

/// Reads one JSON-encoded line of source and prints `Reflect.parse` of it.
const REFLECT_SCRIPT: &str = concat!(
    "var stdin = JSON.parse(readline()); ",
    "try{ print(JSON.stringify(Reflect.parse(stdin))); } ",
    "catch(e) { print(JSON.stringify({",
    "\"error\":true,\"error_message\":e.toString(),\"line_number\":e.lineNumber",
    "})); }",
);

/// Parses through a SpiderMonkey shell.
#[derive(Debug, Clone)]
pub struct SpiderMonkeyParser {
    shell: PathBuf,
}

impl SpiderMonkeyParser {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self { shell: shell.into() }
    }
}

impl JsParser for SpiderMonkeyParser {
    fn parse(&self, source: &str) -> ParseResult<Ast> {
        let mut command = Command::new(&self.shell);
        command.arg("-e").arg(REFLECT_SCRIPT);

        let mut input = serde_json::to_vec(source).map_err(|e| ParseError::Malformed(e.to_string()))?;
        input.push(b'\n');

        let output = run_backend(command, input)?;
        match read_backend_output(&output) {
            Err(ParseError::Syntax { message, .. }) if message.starts_with("ReferenceError: Reflect") => Err(
                ParseError::Runtime("Spidermonkey version too old; Reflect.parse is unavailable".to_string()),
            ),
            Err(e) => Err(e),
            Ok(mut ast) => {
                ast.utf16_columns_to_chars(source);
                Ok(ast)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_shell_is_io_error() {
        let parser = SpiderMonkeyParser::new("/nonexistent/js-shell");
        assert!(matches!(parser.parse("var a;"), Err(ParseError::Io(_))));
    }
}
