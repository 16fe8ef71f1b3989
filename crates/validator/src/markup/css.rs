//! Stylesheet checks: remote `url()` references and external bindings.

use appvalidator_report::{Diagnostic, ErrorBundle, FileRef};
use cssparser::{ParseError, Parser, ParserInput, Token};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref REMOTE_URL: Regex = Regex::new(r"^(//|(ht|f)tps?://|data:)").unwrap();
}

const SNIPPET_PREFIX: &str = "#foo{\n\n";
const SNIPPET_SUFFIX: &str = "\n\n}";
const SNIPPET_PREFIX_LINES: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Finding {
    RemoteUrl { line: u32 },
    ExternalBinding { line: u32 },
    Unparsable { line: u32, detail: String },
}

/// Checks a whole stylesheet. `line_start` is the line of the file the
/// stylesheet begins on.
pub fn test_css_file(err: &mut ErrorBundle, file: &FileRef, data: &str, line_start: usize) {
    run(err, file, data, line_start, 0);
}

/// Checks the body of a `style` attribute.
pub fn test_css_snippet(err: &mut ErrorBundle, file: &FileRef, data: &str, line: usize) {
    let wrapped = format!("{}{}{}", SNIPPET_PREFIX, data, SNIPPET_SUFFIX);
    run(err, file, &wrapped, line, SNIPPET_PREFIX_LINES);
}

fn run(err: &mut ErrorBundle, file: &FileRef, data: &str, line_start: usize, skip_lines: u32) {
    // The tokenizer only needs to see printable ASCII.
    let data: String = data.chars().filter(|c| (9..127).contains(&(*c as u32))).collect();

    let mut input = ParserInput::new(&data);
    let mut parser = Parser::new(&mut input);
    let mut findings = Vec::new();
    if let Err(e) = scan_block(&mut parser, &mut findings) {
        findings.push(Finding::Unparsable { line: e.location.line, detail: format!("{:?}", e.kind) });
    }
    log::debug!("Scanned CSS in {} ({} findings)", file, findings.len());

    let line_of = |line: u32| line_start + line.saturating_sub(skip_lines) as usize;
    let mut reported_unparsable = false;
    for finding in findings {
        match finding {
            Finding::RemoteUrl { line } => {
                err.warning(
                    Diagnostic::new(
                        ["testcases_markup_csstester", "test_css_file", "remote_url"],
                        "Remote URL detected in CSS",
                    )
                    .description(
                        "Apps should not load resources from remote URLs in their stylesheets. \
                         Package the resource with the app or reference it relatively.",
                    )
                    .file(file)
                    .line(line_of(line)),
                );
            }
            Finding::ExternalBinding { line } => {
                err.warning(
                    Diagnostic::new(
                        ["testcases_markup_csstester", "test_css_file", "-moz-binding_external"],
                        "Illegal reference to external scripts",
                    )
                    .description(
                        "-moz-binding may not reference external scripts in CSS. This is \
                         considered to be a security issue.",
                    )
                    .file(file)
                    .line(line_of(line)),
                );
            }
            Finding::Unparsable { line, detail } => {
                if reported_unparsable {
                    continue;
                }
                reported_unparsable = true;
                err.warning(
                    Diagnostic::new(
                        ["testcases_markup_csstester", "test_css_file", "could_not_parse"],
                        "Could not parse CSS file",
                    )
                    .description(vec![
                        "CSS file could not be parsed by the tokenizer.".to_string(),
                        detail,
                    ])
                    .file(file)
                    .line(line_of(line)),
                );
            }
        }
    }
}

fn is_remote(url: &str) -> bool {
    let url = url.trim().to_ascii_lowercase();
    !(url.starts_with("chrome:") || url.starts_with("resource:")) && REMOTE_URL.is_match(&url)
}

fn check_url(url: &str, line: u32, property: Option<&str>, findings: &mut Vec<Finding>) {
    if !is_remote(url) {
        return;
    }
    if property == Some("-moz-binding") {
        findings.push(Finding::ExternalBinding { line });
    } else {
        findings.push(Finding::RemoteUrl { line });
    }
}

/// Walks the tokens of one block, descending into nested blocks.
fn scan_block<'i, 't>(
    parser: &mut Parser<'i, 't>,
    findings: &mut Vec<Finding>,
) -> Result<(), ParseError<'i, ()>> {
    let mut property: Option<String> = None;
    let mut last_ident: Option<String> = None;

    loop {
        let line = parser.current_source_location().line;
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => return Ok(()),
        };

        match token {
            Token::WhiteSpace(_) | Token::Comment(_) => {}
            Token::Ident(name) => last_ident = Some(name.to_ascii_lowercase()),
            Token::Colon => property = last_ident.take(),
            Token::Semicolon => {
                property = None;
                last_ident = None;
            }
            Token::UnquotedUrl(url) => check_url(&url, line, property.as_deref(), findings),
            Token::Function(name) if name.eq_ignore_ascii_case("url") => {
                let url = parser.parse_nested_block(|p| -> Result<String, ParseError<'i, ()>> {
                    while let Ok(token) = p.next() {
                        if let Token::QuotedString(value) = token {
                            return Ok(value.to_string());
                        }
                    }
                    Ok(String::new())
                })?;
                check_url(&url, line, property.as_deref(), findings);
            }
            Token::Function(_) | Token::ParenthesisBlock | Token::SquareBracketBlock => {
                parser.parse_nested_block(|p| scan_block(p, findings))?;
            }
            Token::CurlyBracketBlock => {
                parser.parse_nested_block(|p| scan_block(p, findings))?;
                property = None;
                last_ident = None;
            }
            Token::BadUrl(value) | Token::BadString(value) => {
                findings.push(Finding::Unparsable { line, detail: format!("Malformed token: {}", value) });
            }
            Token::CloseCurlyBracket | Token::CloseParenthesis | Token::CloseSquareBracket => {
                findings.push(Finding::Unparsable { line, detail: "Unbalanced closing bracket".to_string() });
            }
            _ => last_ident = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(err: &ErrorBundle) -> Vec<String> {
        err.messages().map(|m| m.id.last().cloned().unwrap_or_default()).collect()
    }

    fn check(css: &str) -> ErrorBundle {
        let mut err = ErrorBundle::new(true);
        test_css_file(&mut err, &"style.css".into(), css, 1);
        err
    }

    #[test]
    fn test_clean_stylesheet() {
        let err = check("body { color: red; background: url(img/bg.png); }\n.x { background: url('chrome://a/b.png') }");
        assert!(ids(&err).is_empty());
    }

    #[test]
    fn test_remote_urls() {
        let err = check("a {\n  background: url(http://example.com/a.png);\n}");
        assert_eq!(ids(&err), vec!["remote_url"]);
        assert_eq!(err.warnings()[0].line, Some(2));

        let err = check("a { background: url(\"//cdn.example.com/a.png\") }");
        assert_eq!(ids(&err), vec!["remote_url"]);

        let err = check("a { background: url(DATA:image/png;base64,AAAA) }");
        assert_eq!(ids(&err), vec!["remote_url"]);
    }

    #[test]
    fn test_nested_rules_are_scanned() {
        let err = check("@media screen { a { background: url(https://e.com/x.png) } }");
        assert_eq!(ids(&err), vec!["remote_url"]);
    }

    #[test]
    fn test_external_binding() {
        let err = check(".x { -moz-binding: url(\"http://evil.com/xbl.xml#exec\"); }");
        assert_eq!(ids(&err), vec!["-moz-binding_external"]);

        let err = check(".x { -moz-binding: url(\"chrome://global/content/b.xml#b\"); }");
        assert!(ids(&err).is_empty());
    }

    #[test]
    fn test_unparsable() {
        let err = check("a { color: red; } }");
        assert_eq!(ids(&err), vec!["could_not_parse"]);
    }

    #[test]
    fn test_snippet_lines_match_the_attribute() {
        let mut err = ErrorBundle::new(true);
        test_css_snippet(&mut err, &"index.html".into(), "background: url(http://e.com/a.png)", 7);
        assert_eq!(err.warnings()[0].line, Some(7));
        assert_eq!(err.warnings()[0].file, FileRef::from("index.html"));
    }
}
