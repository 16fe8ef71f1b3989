use std::collections::HashSet;
use std::time::Instant;

use appvalidator_js::{test_js_snippet, JsParser, MarkupChecker, ScriptOptions};
use appvalidator_report::{warn_csp, ContextGenerator, CspSeverity, Diagnostic, ErrorBundle, FileRef};
use lazy_static::lazy_static;
use regex::Regex;

use super::css;
use super::tokenizer::{MarkupError, Token, Tokenizer};

/// Elements that may be left open; closing an outer element closes them.
pub const SELF_CLOSING_TAGS: [&str; 14] = [
    "area", "base", "basefont", "br", "col", "frame", "hr", "img", "input", "li", "link", "meta",
    "p", "param",
];

pub const DOM_MUTATION_HANDLERS: [&str; 9] = [
    "ondomattrmodified",
    "ondomattributenamechanged",
    "ondomcharacterdatamodified",
    "ondomelementnamechanged",
    "ondomnodeinserted",
    "ondomnodeinsertedintodocument",
    "ondomnoderemoved",
    "ondomnoderemovedfromdocument",
    "ondomsubtreemodified",
];

const JS_TYPES: [&str; 7] = [
    "",
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
    "text/ecmascript",
    "application/ecmascript",
    "module",
];

lazy_static! {
    static ref REMOTE_SRC: Regex = Regex::new(r"^((ht|f)tps?:)?//").unwrap();
}

fn is_js_type(script_type: &str) -> bool {
    let mime = script_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    JS_TYPES.contains(&mime.as_str())
}

fn is_url_local(url: &str) -> bool {
    !REMOTE_SRC.is_match(url.trim())
}

/// Trims a collected body, returning it with the number of lines skipped
/// before its first character.
fn trim_body(buffer: &str) -> (&str, usize) {
    let start = buffer.len() - buffer.trim_start().len();
    (buffer.trim(), buffer[..start].matches('\n').count())
}

/// Drops the `<!-- ... -->` wrapper old pages put around script bodies.
fn strip_comment_markers(body: &str) -> &str {
    let mut body = body;
    if let Some(rest) = body.strip_prefix("<!--") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("-->") {
        let rest = rest.trim_end();
        body = rest.strip_suffix("//").unwrap_or(rest);
    }
    body
}

/// Checks HTML and XML documents, forwarding inline scripts and styles to
/// the script and stylesheet checks.
#[derive(Clone, Copy)]
pub struct MarkupTester<'a> {
    parser: &'a dyn JsParser,
    deadline: Option<Instant>,
    strict: bool,
}

impl<'a> MarkupTester<'a> {
    pub fn new(parser: &'a dyn JsParser, deadline: Option<Instant>) -> Self {
        Self { parser, deadline, strict: true }
    }

    /// Skips the well-formedness warnings. Used for markup fragments built
    /// by scripts.
    pub fn lenient(self) -> Self {
        Self { strict: false, ..self }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Checks one document. `extension` decides whether it is treated as
    /// XML (`xhtml`, `xml`, `xul`) or HTML.
    pub fn process(&self, err: &mut ErrorBundle, file: &FileRef, data: &str, extension: &str) {
        let extension = extension.to_ascii_lowercase();
        let xml = extension.starts_with('x');
        let context = ContextGenerator::new(data);
        let mut run = Run {
            tester: self,
            file,
            context: &context,
            xml,
            stack: Vec::new(),
            reported: HashSet::new(),
        };

        let mut tokenizer = Tokenizer::new(data, xml);
        loop {
            match tokenizer.next_token() {
                Ok((Token::EOF, _)) => break,
                Ok((token, line)) => run.handle(err, token, line),
                Err(e) => {
                    run.parse_error(err, &e, tokenizer.line());
                    break;
                }
            }
        }
    }

    /// Options for scripts found in documents this tester checks. Markup the
    /// scripts build is checked by this tester too.
    pub fn script_options(&self) -> ScriptOptions<'_> {
        ScriptOptions { parser: self.parser, markup: Some(self), deadline: self.deadline }
    }
}

impl MarkupChecker for MarkupTester<'_> {
    fn check_markup(&self, err: &mut ErrorBundle, file: &FileRef, markup: &str) {
        self.lenient().process(err, file, markup, "xul");
    }
}

struct OpenElement {
    tag: String,
    line: usize,
    buffer: String,
    /// A script whose body should be analysed
    script: bool,
    has_src: bool,
}

/// State for one document
struct Run<'t, 'a> {
    tester: &'t MarkupTester<'a>,
    file: &'t FileRef,
    context: &'t ContextGenerator,
    xml: bool,
    stack: Vec<OpenElement>,
    reported: HashSet<&'static str>,
}

impl Run<'_, '_> {
    fn handle(&mut self, err: &mut ErrorBundle, token: Token, line: usize) {
        match token {
            Token::StartTag { name, attributes, self_closing } => {
                self.start_tag(err, &name, &attributes, line);
                if self_closing {
                    self.end_tag(err, &name, line);
                }
            }
            Token::EndTag { name } => self.end_tag(err, &name, line),
            Token::Character { data } | Token::Comment { data } => self.save_to_buffer(&data),
            Token::Doctype { .. } | Token::ProcessingInstruction { .. } | Token::EOF => {}
        }
    }

    fn in_script(&self) -> bool {
        self.stack.iter().any(|element| element.tag == "script")
    }

    fn save_to_buffer(&mut self, data: &str) {
        if let Some(top) = self.stack.last_mut() {
            top.buffer.push_str(data);
        }
    }

    fn start_tag(&mut self, err: &mut ErrorBundle, name: &str, attributes: &[(String, String)], line: usize) {
        let tag = name.to_ascii_lowercase();
        let mut src = None;
        let mut script_type = None;

        for (attr_name, value) in attributes {
            let attr = attr_name.to_ascii_lowercase();
            if attr == "style" {
                css::test_css_snippet(err, self.file, value, line);
            } else if attr.starts_with("on") {
                self.event_attribute(err, &attr, value, line);
            } else if tag == "script" && attr == "src" {
                src = Some(value.as_str());
            } else if tag == "script" && attr == "type" {
                script_type = Some(value.as_str());
            } else if tag == "html" && attr == "manifest" {
                err.set_metadata("appcache", value.as_str());
            }
        }

        let script = tag == "script" && script_type.map_or(true, is_js_type);
        if script {
            if let Some(src) = src.filter(|src| !is_url_local(src)) {
                log::debug!("Remote script {} in {}", src, self.file);
                self.warn_csp(err, line, "remote_script");
            }
        }

        // Markup inside an unescaped script is script text.
        if self.in_script() && tag != "script" {
            let attrs: String = attributes.iter().map(|(k, v)| format!(" {}=\"{}\"", k, v)).collect();
            self.save_to_buffer(&format!("<{}{}>", tag, attrs));
            return;
        }

        self.stack.push(OpenElement {
            tag,
            line,
            buffer: String::new(),
            script,
            has_src: src.is_some(),
        });
    }

    fn event_attribute(&mut self, err: &mut ErrorBundle, attr: &str, value: &str, line: usize) {
        if DOM_MUTATION_HANDLERS.contains(&attr) {
            err.error(
                Diagnostic::new(
                    ["testcases_markup_markuptester", "handle_starttag", "dom_manipulation_handler"],
                    "DOM Mutation Events Prohibited",
                )
                .description(
                    "DOM mutation events are flagged because of their deprecated status, as well \
                     as their extreme inefficiency. Consider using a different event.",
                )
                .file(self.file)
                .line(line)
                .context_from(self.context),
            );
        }
        if !attr.contains('-') {
            self.warn_csp(err, line, "script_attribute");
        }

        let options = self.tester.script_options();
        test_js_snippet(err, self.file, value, line.saturating_sub(1), Some(self.context), &options);
    }

    fn end_tag(&mut self, err: &mut ErrorBundle, name: &str, line: usize) {
        let mut tag = name.to_ascii_lowercase();
        if tag == "xul:script" {
            tag = "script".to_string();
        }

        let Some(depth) = self.stack.len().checked_sub(1) else {
            if self.tester.strict && self.reported.insert("closing_tags") {
                err.warning(
                    Diagnostic::new(
                        ["testcases_markup_markuptester", "handle_endtag", "extra_closing_tags"],
                        "Markup parsing error",
                    )
                    .description("The markup file has more closing tags than it has opening tags.")
                    .file(self.file)
                    .line(line)
                    .context_from(self.context)
                    .tier(2),
                );
            }
            return;
        };

        if self.stack[..depth].iter().any(|element| element.tag == "script") {
            self.save_to_buffer(&format!("</{}>", tag));
            return;
        }

        if !self.stack.iter().any(|element| element.tag == tag) {
            err.warning(
                Diagnostic::new(
                    ["testcases_markup_markuptester", "handle_endtag", "extra_closing_tags"],
                    "Parse error: tag closed before opened",
                )
                .description(vec![
                    "Markup tags cannot be closed before they are opened. Perhaps you were just a \
                     little overzealous with forward-slashes?"
                        .to_string(),
                    format!("Tag \"{}\" closed before it was opened", tag),
                ])
                .file(self.file)
                .line(line)
                .context_from(self.context)
                .tier(2),
            );
            return;
        }

        let Some(element) = self.stack.pop() else { return };

        if element.tag != tag && SELF_CLOSING_TAGS.contains(&element.tag.as_str()) {
            return self.end_tag(err, name, line);
        }

        if element.tag != tag && self.xml && !self.tester.strict {
            err.warning(
                Diagnostic::new(
                    ["testcases_markup_markuptester", "handle_endtag", "invalid_nesting"],
                    "Markup invalidly nested",
                )
                .description(
                    "It has been determined that the document invalidly nests its tags. This is \
                     not permitted in the specified document type.",
                )
                .file(self.file)
                .line(line)
                .context_from(self.context)
                .tier(2),
            );
        }

        if element.tag == "script" && element.script && !element.has_src {
            self.warn_csp(err, element.line, "inline_script");
        }

        let (body, skipped) = trim_body(&element.buffer);
        if body.is_empty() {
            return;
        }
        let first_line = element.line + skipped;

        if element.tag == "script" && element.script {
            let options = self.tester.script_options();
            test_js_snippet(
                err,
                self.file,
                strip_comment_markers(body),
                first_line.saturating_sub(1),
                Some(self.context),
                &options,
            );
        } else if element.tag == "style" {
            css::test_css_file(err, self.file, body, first_line);
        }
    }

    fn parse_error(&mut self, err: &mut ErrorBundle, error: &MarkupError, line: usize) {
        if !self.tester.strict {
            return;
        }
        log::debug!("Markup error in {}: {}", self.file, error);

        if self.in_script() {
            if self.reported.insert("script_comments") {
                err.notice(
                    Diagnostic::new(
                        ["testcases_markup_markuptester", "_feed", "missing_script_comments"],
                        "Missing comments in <script> tag",
                    )
                    .description(
                        "Markup parsing errors occurred while trying to parse the file. This would \
                         likely be mitigated by wrapping <script> tag contents in HTML comment \
                         tags (<!-- -->)",
                    )
                    .file(self.file)
                    .line(line)
                    .context_from(self.context)
                    .tier(2),
                );
            }
            return;
        }

        if self.reported.insert("markup") {
            err.warning(
                Diagnostic::new(["testcases_markup_markuptester", "_feed", "parse_error"], "Markup parsing error")
                    .description(vec![
                        "There was an error parsing a markup file.".to_string(),
                        error.to_string(),
                    ])
                    .file(self.file)
                    .line(line)
                    .context_from(self.context),
            );
        }
    }

    fn warn_csp(&self, err: &mut ErrorBundle, line: usize, violation_type: &str) {
        warn_csp(err, self.file, Some(line), None, Some(self.context), violation_type, CspSeverity::Error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appvalidator_js::BuiltinParser;
    use pretty_assertions::assert_eq;

    fn check(markup: &str, extension: &str) -> ErrorBundle {
        let mut err = ErrorBundle::new(true);
        err.save_resource("app_type", "privileged");
        let parser = BuiltinParser;
        MarkupTester::new(&parser, None).process(&mut err, &"index.html".into(), markup, extension);
        err
    }

    fn ids(err: &ErrorBundle) -> Vec<Vec<String>> {
        err.messages().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn test_js_types() {
        assert!(is_js_type("text/javascript"));
        assert!(is_js_type("application/javascript; version=1.8"));
        assert!(is_js_type(""));
        assert!(!is_js_type("text/template"));
    }

    #[test]
    fn test_local_urls() {
        assert!(is_url_local("js/app.js"));
        assert!(is_url_local("/js/app.js"));
        assert!(!is_url_local("//cdn.example.com/a.js"));
        assert!(!is_url_local("https://cdn.example.com/a.js"));
        assert!(!is_url_local("ftp://example.com/a.js"));
    }

    #[test]
    fn test_comment_markers() {
        assert_eq!(strip_comment_markers("<!--\nvar x;\n//-->"), "\nvar x;");
        assert_eq!(strip_comment_markers("var x;"), "var x;");
    }

    #[test]
    fn test_clean_document() {
        let err = check("<!DOCTYPE html>\n<html><head><script src=\"js/app.js\"></script></head><body><p>Hi<br></body></html>", "html");
        assert_eq!(ids(&err), Vec::<Vec<String>>::new());
    }

    #[test]
    fn test_event_handler_attribute() {
        let err = check("<button onclick=\"alert(1)\"></button>", "html");
        assert_eq!(err.errors().len(), 1);
        assert_eq!(err.errors()[0].id, vec!["csp", "script_attribute"]);
        assert_eq!(err.errors()[0].line, Some(1));
    }

    #[test]
    fn test_web_apps_get_csp_warnings() {
        let mut err = ErrorBundle::new(true);
        err.save_resource("app_type", "web");
        let parser = BuiltinParser;
        MarkupTester::new(&parser, None).process(&mut err, &"a.html".into(), "<a onclick=\"x()\">", "html");
        assert!(err.errors().is_empty());
        assert_eq!(err.warnings()[0].id, vec!["csp", "script_attribute"]);
    }

    #[test]
    fn test_dom_mutation_handler() {
        let err = check("<div ondomnodeinserted=\"f()\"></div>", "html");
        assert!(err.has_message(&["testcases_markup_markuptester", "handle_starttag", "dom_manipulation_handler"]));
        assert!(err.has_message(&["csp", "script_attribute"]));
    }

    #[test]
    fn test_remote_and_inline_scripts() {
        let err = check("<script src=\"https://cdn.example.com/a.js\"></script>", "html");
        assert_eq!(ids(&err), vec![vec!["csp".to_string(), "remote_script".to_string()]]);

        let err = check("<html>\n<script>\nvar x = 1;\n</script>\n</html>", "html");
        assert_eq!(ids(&err), vec![vec!["csp".to_string(), "inline_script".to_string()]]);
        assert_eq!(err.errors()[0].line, Some(2));

        let err = check("<script type=\"text/template\"><b>{{x}}</b></script>", "html");
        assert!(ids(&err).is_empty());
    }

    #[test]
    fn test_empty_inline_script() {
        let err = check("<body>\n<script></script>\n</body>", "html");
        assert_eq!(ids(&err), vec![vec!["csp".to_string(), "inline_script".to_string()]]);
        assert_eq!(err.errors()[0].line, Some(2));

        let err = check("<script src=\"js/app.js\"></script>", "html");
        assert!(ids(&err).is_empty());
    }

    #[test]
    fn test_inline_script_is_analysed_at_its_line() {
        let err = check("<p>\n<script>\n\nvar x = new XMLHttpRequest();\nx.open('GET', '/u', false);\n</script>", "html");
        let sync = err.warnings().iter().find(|m| m.id == vec!["javascript", "xhr", "sync"]).unwrap();
        assert_eq!(sync.line, Some(5));
        assert_eq!(sync.file, FileRef::from("index.html"));
    }

    #[test]
    fn test_extra_closing_tags() {
        let err = check("<div></div></div></span>", "html");
        let extra = err.warnings().iter().filter(|m| m.id.last().map(String::as_str) == Some("extra_closing_tags")).count();
        assert_eq!(extra, 1);
    }

    #[test]
    fn test_tag_closed_before_opened() {
        let err = check("<div>\n</span>\n</div>", "html");
        assert!(err.has_message(&["testcases_markup_markuptester", "handle_endtag", "extra_closing_tags"]));
        assert_eq!(err.warnings()[0].line, Some(2));
    }

    #[test]
    fn test_invalid_nesting_in_lenient_xml() {
        let mut err = ErrorBundle::new(true);
        let parser = BuiltinParser;
        let tester = MarkupTester::new(&parser, None);
        tester.check_markup(&mut err, &"a.js".into(), "<b><i></b></i>");
        assert!(err.has_message(&["testcases_markup_markuptester", "handle_endtag", "invalid_nesting"]));
        assert_eq!(err.warnings()[0].file, FileRef::from("a.js"));

        let err = check("<b><i></b></i>", "xhtml");
        assert!(!err.has_message(&["testcases_markup_markuptester", "handle_endtag", "invalid_nesting"]));
    }

    #[test]
    fn test_unescaped_xml_script() {
        let err = check("<window>\n<script>\nif (a <b) {}\n</window>", "xul");
        assert!(err.has_message(&["testcases_markup_markuptester", "_feed", "missing_script_comments"]));
    }

    #[test]
    fn test_parse_error() {
        let err = check("<div>\n<!-- never closed", "html");
        assert!(err.has_message(&["testcases_markup_markuptester", "_feed", "parse_error"]));
        assert_eq!(err.warnings()[0].line, Some(2));
    }

    #[test]
    fn test_styles_are_checked() {
        let err = check("<div style=\"background: url(http://e.com/a.png)\"></div>", "html");
        assert!(err.has_message(&["testcases_markup_csstester", "test_css_file", "remote_url"]));

        let err = check("<style>\n a { background: url(//e.com/a.png) }\n</style>", "html");
        assert_eq!(err.warnings()[0].line, Some(2));
    }

    #[test]
    fn test_appcache_manifest() {
        let err = check("<html manifest=\"offline.appcache\"></html>", "html");
        assert_eq!(err.metadata()["appcache"], "offline.appcache");
    }
}
