use std::path::PathBuf;
use std::process::Command;

use super::{read_backend_output, run_backend, JsParser};
use crate::ast::Ast;
use crate::error::ParseResult;

/// Reads the whole of stdin and prints the Acorn tree, or an error object
/// shaped like the SpiderMonkey one.
const ACORN_SCRIPT: &str = r#"
var chunks = [];
process.stdin.on('data', function (c) { chunks.push(c); });
process.stdin.on('end', function () {
  var data = Buffer.concat(chunks).toString('utf8');
  try {
    var tree = require('acorn').parse(data, {ecmaVersion: 'latest', locations: true});
    process.stdout.write(JSON.stringify(tree));
  } catch (e) {
    process.stdout.write(JSON.stringify({
      error: true,
      error_message: e.toString(),
      line_number: e.loc ? e.loc.line : null
    }));
  }
});
"#;

/// Parses through Node.js and the `acorn` package.
#[derive(Debug, Clone)]
pub struct AcornParser {
    node: PathBuf,
}

impl AcornParser {
    pub fn new(node: impl Into<PathBuf>) -> Self {
        Self { node: node.into() }
    }
}

impl JsParser for AcornParser {
    fn parse(&self, source: &str) -> ParseResult<Ast> {
        let mut command = Command::new(&self.node);
        command.arg("-e").arg(ACORN_SCRIPT);
        let output = run_backend(command, source.as_bytes().to_vec())?;
        let mut ast = read_backend_output(&output)?;
        ast.utf16_columns_to_chars(source);
        Ok(ast)
    }
}
