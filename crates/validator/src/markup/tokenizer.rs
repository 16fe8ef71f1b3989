use thiserror::Error;

/// Markup the tokenizer could not make sense of
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkupError {
    #[error("Unexpected end of input inside {0}")]
    UnexpectedEof(&'static str),

    #[error("Malformed markup: {0}")]
    Malformed(String),
}

/// Types of markup tokens
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Document type declaration
    Doctype {
        /// Name
        name: String,
    },
    /// Start tag
    StartTag {
        /// Tag name, as written
        name: String,
        /// Attributes, in source order
        attributes: Vec<(String, String)>,
        /// Written with a trailing `/>`
        self_closing: bool,
    },
    /// End tag
    EndTag {
        /// Tag name, as written
        name: String,
    },
    /// Comment
    Comment {
        /// Comment data
        data: String,
    },
    /// Character data, including CDATA sections
    Character {
        /// Character data
        data: String,
    },
    /// Processing instruction
    ProcessingInstruction {
        /// Target
        target: String,
        /// Data
        data: String,
    },
    /// End of file
    EOF,
}

/// Tags whose content is raw text in HTML documents
const RAW_TEXT_TAGS: [&str; 2] = ["script", "style"];

/// Incremental tokenizer over one markup document.
///
/// In HTML mode the bodies of `<script>` and `<style>` are emitted as a
/// single character token. In XML mode they are tokenized like any other
/// content, which is what makes unescaped scripts break XML documents.
pub struct Tokenizer<'a> {
    /// Input text
    input: &'a str,
    /// Current position
    position: usize,
    /// Current line
    line: usize,
    /// Current column
    column: usize,
    /// Parse script bodies as markup
    xml: bool,
    /// Raw-text element whose end tag ends the current body
    raw_text: Option<String>,
}

impl<'a> Tokenizer<'a> {
    /// Create a new tokenizer over `input`
    pub fn new(input: &'a str, xml: bool) -> Self {
        Self {
            input,
            position: 0,
            line: 1,
            column: 1,
            xml,
            raw_text: None,
        }
    }

    /// The line the next token starts on
    pub fn line(&self) -> usize {
        self.line
    }

    /// Get the next token, with the line it started on
    pub fn next_token(&mut self) -> Result<(Token, usize), MarkupError> {
        let line = self.line;

        if let Some(tag) = self.raw_text.take() {
            let data = self.parse_raw_text(&tag);
            if !data.is_empty() {
                return Ok((Token::Character { data }, line));
            }
        }

        if self.at_end() {
            return Ok((Token::EOF, line));
        }

        let token = if self.starts_tag() {
            self.parse_tag()?
        } else {
            self.parse_character_data()
        };

        if !self.xml {
            if let Token::StartTag { name, self_closing: false, .. } = &token {
                let lower = name.to_ascii_lowercase();
                if RAW_TEXT_TAGS.contains(&lower.as_str()) {
                    self.raw_text = Some(lower);
                }
            }
        }
        Ok((token, line))
    }

    /// Parse all tokens from the input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, MarkupError> {
        let mut tokens = Vec::new();

        loop {
            let (token, _) = self.next_token()?;
            let done = token == Token::EOF;
            tokens.push(token);
            if done {
                break;
            }
        }

        Ok(tokens)
    }

    fn at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn current_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Advance the position by one character
    fn advance(&mut self) {
        if let Some(c) = self.current_char() {
            self.position += c.len_utf8();

            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn advance_by(&mut self, text_len: usize) {
        let end = self.position + text_len;
        while self.position < end && !self.at_end() {
            self.advance();
        }
    }

    /// Skip whitespace characters
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.current_char() {
            if !c.is_whitespace() {
                break;
            }
            self.advance();
        }
    }

    /// A `<` only opens markup when something tag-like follows it.
    fn starts_tag(&self) -> bool {
        let mut chars = self.rest().chars();
        if chars.next() != Some('<') {
            return false;
        }
        match chars.next() {
            Some('/') => chars.next().map_or(false, |c| c.is_ascii_alphabetic()),
            Some('!') | Some('?') => true,
            Some(c) => c.is_ascii_alphabetic(),
            None => false,
        }
    }

    /// Parse a tag (start tag, end tag, comment, or doctype)
    fn parse_tag(&mut self) -> Result<Token, MarkupError> {
        // Skip the '<' character
        self.advance();

        match self.current_char() {
            Some('/') => self.parse_end_tag(),
            Some('!') => self.parse_comment_or_doctype(),
            Some('?') => self.parse_processing_instruction(),
            _ => self.parse_start_tag(),
        }
    }

    /// In XML documents names must be well formed.
    fn check_name(&self, name: &str) -> Result<(), MarkupError> {
        let mut chars = name.chars();
        let valid = chars.next().map_or(false, |c| c.is_ascii_alphabetic() || c == '_' || c == ':')
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'));
        if self.xml && !valid {
            return Err(MarkupError::Malformed(format!("Invalid name {:?} at {}:{}", name, self.line, self.column)));
        }
        Ok(())
    }

    fn parse_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.current_char() {
            if c.is_whitespace() || c == '>' || c == '/' {
                break;
            }
            name.push(c);
            self.advance();
        }
        name
    }

    /// Parse a start tag
    fn parse_start_tag(&mut self) -> Result<Token, MarkupError> {
        let name = self.parse_name();
        self.check_name(&name)?;
        let mut attributes = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();

            match self.current_char() {
                None => return Err(MarkupError::UnexpectedEof("a start tag")),
                Some('>') => {
                    self.advance();
                    break;
                }
                Some('/') => {
                    self.advance();
                    if self.current_char() == Some('>') {
                        self_closing = true;
                        self.advance();
                        break;
                    }
                }
                Some(_) => {
                    let (attr_name, value) = self.parse_attribute();
                    self.check_name(&attr_name)?;
                    attributes.push((attr_name, value));
                }
            }
        }

        Ok(Token::StartTag {
            name,
            attributes,
            self_closing,
        })
    }

    /// Parse an end tag
    fn parse_end_tag(&mut self) -> Result<Token, MarkupError> {
        // Skip the '/' character
        self.advance();

        let name = self.parse_name();
        self.check_name(&name)?;

        // Skip to the end of the tag
        while let Some(c) = self.current_char() {
            self.advance();
            if c == '>' {
                return Ok(Token::EndTag { name });
            }
        }
        Err(MarkupError::UnexpectedEof("an end tag"))
    }

    /// Parse a comment, CDATA section, doctype or other declaration
    fn parse_comment_or_doctype(&mut self) -> Result<Token, MarkupError> {
        // Skip the '!' character
        self.advance();

        if self.rest().starts_with("--") {
            self.advance_by(2);
            return self.parse_comment();
        }

        if self.rest().starts_with("[CDATA[") {
            self.advance_by(7);
            let Some(end) = self.rest().find("]]>") else {
                return Err(MarkupError::UnexpectedEof("a CDATA section"));
            };
            let data = self.rest()[..end].to_string();
            self.advance_by(end + 3);
            return Ok(Token::Character { data });
        }

        let is_doctype = self
            .rest()
            .get(..7)
            .map_or(false, |word| word.eq_ignore_ascii_case("DOCTYPE"));
        if is_doctype {
            self.advance_by(7);
            self.skip_whitespace();
        }
        let name = self.parse_name();

        // Skip to the end of the declaration
        while let Some(c) = self.current_char() {
            self.advance();
            if c == '>' {
                return Ok(if is_doctype {
                    Token::Doctype { name }
                } else {
                    Token::Comment { data: name }
                });
            }
        }
        Err(MarkupError::UnexpectedEof("a declaration"))
    }

    fn parse_comment(&mut self) -> Result<Token, MarkupError> {
        let mut data = String::new();

        while !self.at_end() {
            if self.rest().starts_with("--") {
                self.advance_by(2);
                if self.current_char() == Some('>') {
                    self.advance();
                    return Ok(Token::Comment { data });
                }
                if self.xml {
                    return Err(MarkupError::Malformed("Expected '>' after '--'".to_string()));
                }
                data.push_str("--");
                continue;
            }

            if let Some(c) = self.current_char() {
                data.push(c);
            }
            self.advance();
        }

        Err(MarkupError::UnexpectedEof("a comment"))
    }

    /// Parse a processing instruction
    fn parse_processing_instruction(&mut self) -> Result<Token, MarkupError> {
        // Skip the '?' character
        self.advance();

        let mut target = String::new();
        while let Some(c) = self.current_char() {
            if c.is_whitespace() || self.rest().starts_with("?>") {
                break;
            }
            target.push(c);
            self.advance();
        }

        self.skip_whitespace();

        let Some(end) = self.rest().find("?>") else {
            return Err(MarkupError::UnexpectedEof("a processing instruction"));
        };
        let data = self.rest()[..end].to_string();
        self.advance_by(end + 2);

        Ok(Token::ProcessingInstruction { target, data })
    }

    /// Parse an attribute
    fn parse_attribute(&mut self) -> (String, String) {
        let mut name = String::new();

        // Parse the attribute name
        while let Some(c) = self.current_char() {
            if c.is_whitespace() || c == '=' || c == '>' || (c == '/' && !name.is_empty()) {
                break;
            }
            name.push(c);
            self.advance();
        }

        self.skip_whitespace();

        if self.current_char() != Some('=') {
            return (name, String::new());
        }
        // Skip the '=' character
        self.advance();
        self.skip_whitespace();

        let mut value = String::new();
        match self.current_char() {
            Some(q) if q == '"' || q == '\'' => {
                self.advance();
                // Parse a quoted value
                while let Some(c) = self.current_char() {
                    self.advance();
                    if c == q {
                        break;
                    }
                    value.push(c);
                }
            }
            _ => {
                // Parse an unquoted value
                while let Some(c) = self.current_char() {
                    if c.is_whitespace() || c == '>' {
                        break;
                    }
                    value.push(c);
                    self.advance();
                }
            }
        }

        (name, value)
    }

    /// Parse character data
    fn parse_character_data(&mut self) -> Token {
        let mut data = String::new();

        // A '<' that does not open markup is text.
        if let Some(c) = self.current_char() {
            data.push(c);
            self.advance();
        }
        while !self.at_end() && !self.starts_tag() {
            if let Some(c) = self.current_char() {
                data.push(c);
            }
            self.advance();
        }

        Token::Character { data }
    }

    /// Everything up to the matching end tag, or to the end of input
    fn parse_raw_text(&mut self, tag: &str) -> String {
        let closing = format!("</{}", tag);
        let rest = self.rest();
        let end = rest
            .to_ascii_lowercase()
            .find(&closing)
            .unwrap_or(rest.len());
        let data = rest[..end].to_string();
        self.advance_by(end);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(html: &str) -> Vec<Token> {
        Tokenizer::new(html, false).tokenize().unwrap()
    }

    fn start(name: &str, attributes: &[(&str, &str)]) -> Token {
        Token::StartTag {
            name: name.to_string(),
            attributes: attributes.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            self_closing: false,
        }
    }

    fn text(data: &str) -> Token {
        Token::Character { data: data.to_string() }
    }

    fn end(name: &str) -> Token {
        Token::EndTag { name: name.to_string() }
    }

    #[test]
    fn test_tokenize_simple_html() {
        assert_eq!(
            tokens("<html><body>Hello, world!</body></html>"),
            vec![start("html", &[]), start("body", &[]), text("Hello, world!"), end("body"), end("html"), Token::EOF]
        );
    }

    #[test]
    fn test_tokenize_with_attributes() {
        assert_eq!(
            tokens(r#"<div id="container" class='main' data-x=a/b hidden>Content</div>"#),
            vec![
                start("div", &[("id", "container"), ("class", "main"), ("data-x", "a/b"), ("hidden", "")]),
                text("Content"),
                end("div"),
                Token::EOF,
            ]
        );
    }

    #[test]
    fn test_tokenize_comment_and_doctype() {
        assert_eq!(
            tokens("<!DOCTYPE html><!-- a -- b --><p>Text</p>"),
            vec![
                Token::Doctype { name: "html".to_string() },
                Token::Comment { data: " a -- b ".to_string() },
                start("p", &[]),
                text("Text"),
                end("p"),
                Token::EOF,
            ]
        );
    }

    #[test]
    fn test_script_body_is_raw_text() {
        assert_eq!(
            tokens("<script>if (a<b && c) { x = '</p>'; }</script>"),
            vec![start("script", &[]), text("if (a<b && c) { x = '</p>'; }"), end("script"), Token::EOF]
        );
    }

    #[test]
    fn test_xml_mode_tokenizes_script_bodies() {
        let tokens = Tokenizer::new("<script>a<b>c</script>", true).tokenize().unwrap();
        assert_eq!(tokens[1], text("a"));
        assert_eq!(tokens[2], start("b", &[]));
    }

    #[test]
    fn test_cdata_is_character_data() {
        assert_eq!(
            Tokenizer::new("<x><![CDATA[a < b]]></x>", true).tokenize().unwrap(),
            vec![start("x", &[]), text("a < b"), end("x"), Token::EOF]
        );
    }

    #[test]
    fn test_stray_angle_bracket_is_text() {
        assert_eq!(tokens("a < b"), vec![text("a < b"), Token::EOF]);
    }

    #[test]
    fn test_lines_are_tracked() {
        let mut tokenizer = Tokenizer::new("<a>\n\n<b>", false);
        assert_eq!(tokenizer.next_token().unwrap().1, 1);
        assert_eq!(tokenizer.next_token().unwrap().1, 1);
        assert_eq!(tokenizer.next_token().unwrap(), (start("b", &[]), 3));
    }

    #[test]
    fn test_xml_names_must_be_well_formed() {
        assert!(Tokenizer::new("<a>if (x <b) {}</a>", true).tokenize().is_err());
        assert!(Tokenizer::new("<a>if (x <b) {}</a>", false).tokenize().is_ok());
        assert!(Tokenizer::new("<xul:window xmlns:html=\"x\"/>", true).tokenize().is_ok());
    }

    #[test]
    fn test_unterminated_markup() {
        assert_eq!(
            Tokenizer::new("<div class=", false).tokenize(),
            Err(MarkupError::UnexpectedEof("a start tag"))
        );
        assert!(Tokenizer::new("<!-- a -- b -->", true).tokenize().is_err());
    }
}
