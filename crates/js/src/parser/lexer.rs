use crate::error::{ParseError, ParseResult};

/// Kinds of JavaScript tokens
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    /// Identifier or keyword
    Name(String),
    /// Numeric literal
    Num(f64),
    /// String literal, escapes resolved
    Str(String),
    /// Template literal, split at its substitutions
    Template(Vec<TemplatePart>),
    /// Regular expression literal
    Regex {
        /// Pattern between the slashes
        pattern: String,
        /// Trailing flags
        flags: String,
    },
    /// Punctuator
    Punct(&'static str),
    /// End of input
    Eof,
}

/// A piece of a template literal
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text
    Text(String),
    /// Source of a `${...}` substitution and where it starts
    Expr {
        /// Substitution source
        source: String,
        /// Line of the first character
        line: usize,
        /// Column of the first character
        column: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    /// 1-based line of the first character
    pub line: usize,
    /// 0-based column of the first character
    pub column: usize,
    /// A line break separates this token from the previous one
    pub newline_before: bool,
}

impl Token {
    pub fn is_punct(&self, punct: &str) -> bool {
        matches!(self.tok, Tok::Punct(p) if p == punct)
    }

    pub fn is_name(&self, name: &str) -> bool {
        matches!(&self.tok, Tok::Name(n) if n == name)
    }

    /// Source-ish rendering for error messages
    pub fn describe(&self) -> String {
        match &self.tok {
            Tok::Name(n) => n.clone(),
            Tok::Num(n) => crate::value::format_number(*n),
            Tok::Str(s) => format!("string \"{}\"", s),
            Tok::Template(_) => "template literal".to_string(),
            Tok::Regex { pattern, .. } => format!("/{}/", pattern),
            Tok::Punct(p) => (*p).to_string(),
            Tok::Eof => "end of script".to_string(),
        }
    }
}

/// Longest first, so the scan can stop at the first match
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==", "!=",
    "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=",
    "<<", ">>", "**", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-", "*", "/", "%",
    "&", "|", "^", "!", "~", "?", ":", "=", ".", "#",
];

/// Words after which a `/` starts a regular expression
const REGEX_PREFIX_WORDS: [&str; 14] = [
    "return", "typeof", "case", "do", "else", "in", "instanceof", "new", "delete", "void", "throw",
    "yield", "await", "of",
];

/// JavaScript lexer producing the whole token stream up front
pub struct Lexer {
    /// Input characters
    input: Vec<char>,
    /// Current position
    position: usize,
    /// Current line
    line: usize,
    /// Current column
    column: usize,
    /// Whether the last skip crossed a line break
    newline: bool,
    /// Whether a `/` here would start a regular expression
    regex_allowed: bool,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self::at(source, 1, 0)
    }

    /// A lexer for text that starts at `line`/`column` of a larger file.
    pub fn at(source: &str, line: usize, column: usize) -> Self {
        Self {
            input: source.chars().collect(),
            position: 0,
            line,
            column,
            newline: false,
            regex_allowed: true,
        }
    }

    pub fn tokenize(mut self) -> ParseResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.tok == Tok::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError::Syntax { message: format!("SyntaxError: {}", message), line: Some(self.line) }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.position += 1;
        if c == '\n' || c == '\u{2028}' || c == '\u{2029}' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) -> ParseResult<()> {
        self.newline = false;
        while let Some(c) = self.peek(0) {
            match c {
                '\n' | '\r' | '\u{2028}' | '\u{2029}' => {
                    self.newline = true;
                    self.advance();
                }
                c if c.is_whitespace() || c == '\u{feff}' => {
                    self.advance();
                }
                '/' if self.peek(1) == Some('/') => self.skip_line(),
                '/' if self.peek(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    loop {
                        match self.advance() {
                            Some('*') if self.peek(0) == Some('/') => {
                                self.advance();
                                break;
                            }
                            Some('\n') => self.newline = true,
                            Some(_) => {}
                            None => return Err(self.error("unterminated comment")),
                        }
                    }
                }
                // HTML-style comment openers are line comments in scripts
                '<' if self.peek(1) == Some('!') && self.peek(2) == Some('-') && self.peek(3) == Some('-') => {
                    self.skip_line()
                }
                '-' if self.newline && self.peek(1) == Some('-') && self.peek(2) == Some('>') => {
                    self.skip_line()
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' || c == '\r' {
                break;
            }
            self.advance();
        }
    }

    pub fn next_token(&mut self) -> ParseResult<Token> {
        self.skip_trivia()?;
        let (line, column, newline_before) = (self.line, self.column, self.newline);
        let tok = match self.peek(0) {
            None => Tok::Eof,
            Some(c) if is_id_start(c) => Tok::Name(self.read_name()),
            Some('\\') => return Err(self.error("illegal character")),
            Some(c) if c.is_ascii_digit() => self.read_number()?,
            Some('.') if self.peek(1).map_or(false, |c| c.is_ascii_digit()) => self.read_number()?,
            Some(q @ ('"' | '\'')) => self.read_string(q)?,
            Some('`') => self.read_template()?,
            Some('/') if self.regex_allowed => self.read_regex()?,
            Some(_) => self.read_punct()?,
        };

        self.regex_allowed = match &tok {
            Tok::Name(n) => REGEX_PREFIX_WORDS.contains(&n.as_str()),
            Tok::Punct(p) => !matches!(*p, ")" | "]" | "}" | "++" | "--"),
            _ => false,
        };
        Ok(Token { tok, line, column, newline_before })
    }

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek(0) {
            if !is_id_part(c) {
                break;
            }
            name.push(c);
            self.advance();
        }
        name
    }

    fn read_number(&mut self) -> ParseResult<Tok> {
        let radix = match (self.peek(0), self.peek(1).map(|c| c.to_ascii_lowercase())) {
            (Some('0'), Some('x')) => 16,
            (Some('0'), Some('o')) => 8,
            (Some('0'), Some('b')) => 2,
            _ => 10,
        };

        let mut text = String::new();
        if radix != 10 {
            self.advance();
            self.advance();
            while let Some(c) = self.peek(0) {
                if c == '_' {
                    self.advance();
                } else if c.is_digit(radix) {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            self.skip_bigint_suffix();
            return u64::from_str_radix(&text, radix)
                .map(|n| Tok::Num(n as f64))
                .map_err(|_| self.error("missing digits after radix prefix"));
        }

        let mut seen_exponent = false;
        while let Some(c) = self.peek(0) {
            match c {
                '0'..='9' | '.' => text.push(c),
                '_' => {}
                'e' | 'E' if !seen_exponent => {
                    seen_exponent = true;
                    text.push(c);
                    if let Some(sign @ ('+' | '-')) = self.peek(1) {
                        self.advance();
                        text.push(sign);
                    }
                }
                _ => break,
            }
            self.advance();
        }
        self.skip_bigint_suffix();
        if self.peek(0).map_or(false, is_id_start) {
            return Err(self.error("identifier starts immediately after numeric literal"));
        }
        text.parse::<f64>().map(Tok::Num).map_err(|_| self.error("malformed number"))
    }

    fn skip_bigint_suffix(&mut self) {
        if self.peek(0) == Some('n') {
            self.advance();
        }
    }

    fn read_escape(&mut self, out: &mut String) -> ParseResult<()> {
        let Some(c) = self.advance() else {
            return Err(self.error("unterminated string literal"));
        };
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !self.peek(0).map_or(false, |c| c.is_ascii_digit()) => out.push('\0'),
            '\r' => {
                if self.peek(0) == Some('\n') {
                    self.advance();
                }
            }
            '\n' | '\u{2028}' | '\u{2029}' => {}
            'x' => {
                let code = self.read_hex(2)?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            'u' => {
                let code = if self.peek(0) == Some('{') {
                    self.advance();
                    let mut code = 0u32;
                    while let Some(c) = self.advance() {
                        if c == '}' {
                            break;
                        }
                        let digit = c.to_digit(16).ok_or_else(|| self.error("malformed Unicode character escape sequence"))?;
                        code = code.saturating_mul(16).saturating_add(digit);
                    }
                    code
                } else {
                    self.read_hex(4)?
                };
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            other => out.push(other),
        }
        Ok(())
    }

    fn read_hex(&mut self, digits: usize) -> ParseResult<u32> {
        let mut code = 0;
        for _ in 0..digits {
            let digit = self
                .advance()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("malformed escape sequence"))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn read_string(&mut self, quote: char) -> ParseResult<Tok> {
        self.advance();
        let mut value = String::new();
        loop {
            match self.peek(0) {
                None | Some('\n') | Some('\r') => return Err(self.error("unterminated string literal")),
                Some('\\') => {
                    self.advance();
                    self.read_escape(&mut value)?;
                }
                Some(c) => {
                    self.advance();
                    if c == quote {
                        return Ok(Tok::Str(value));
                    }
                    value.push(c);
                }
            }
        }
    }

    fn read_template(&mut self) -> ParseResult<Tok> {
        self.advance();
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.advance() {
                None => return Err(self.error("unterminated string literal")),
                Some('`') => break,
                Some('\\') => self.read_escape(&mut text)?,
                Some('$') if self.peek(0) == Some('{') => {
                    self.advance();
                    parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    parts.push(self.read_substitution()?);
                }
                Some(c) => text.push(c),
            }
        }
        parts.push(TemplatePart::Text(text));
        Ok(Tok::Template(parts))
    }

    /// Collects the source of a `${...}` up to its matching brace.
    fn read_substitution(&mut self) -> ParseResult<TemplatePart> {
        let (line, column) = (self.line, self.column);
        let mut source = String::new();
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        loop {
            let Some(c) = self.advance() else {
                return Err(self.error("missing } in template string"));
            };
            match quote {
                Some(q) => {
                    if c == '\\' {
                        source.push(c);
                        if let Some(next) = self.advance() {
                            source.push(next);
                        }
                        continue;
                    }
                    if c == q {
                        quote = None;
                    }
                }
                None => match c {
                    '"' | '\'' | '`' => quote = Some(c),
                    '{' => depth += 1,
                    '}' if depth == 0 => return Ok(TemplatePart::Expr { source, line, column }),
                    '}' => depth -= 1,
                    _ => {}
                },
            }
            source.push(c);
        }
    }

    fn read_regex(&mut self) -> ParseResult<Tok> {
        self.advance();
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            match self.advance() {
                None | Some('\n') | Some('\r') => {
                    return Err(self.error("unterminated regular expression literal"))
                }
                Some('\\') => {
                    pattern.push('\\');
                    if let Some(c) = self.advance() {
                        pattern.push(c);
                    }
                }
                Some('[') => {
                    in_class = true;
                    pattern.push('[');
                }
                Some(']') => {
                    in_class = false;
                    pattern.push(']');
                }
                Some('/') if !in_class => break,
                Some(c) => pattern.push(c),
            }
        }
        let flags = self.read_name();
        Ok(Tok::Regex { pattern, flags })
    }

    fn read_punct(&mut self) -> ParseResult<Tok> {
        for &punct in PUNCTUATORS {
            let matches = punct.chars().enumerate().all(|(i, c)| self.peek(i) == Some(c));
            if !matches {
                continue;
            }
            // `a?.5:1` is a conditional, not optional chaining
            if punct == "?." && self.peek(2).map_or(false, |c| c.is_ascii_digit()) {
                continue;
            }
            for _ in 0..punct.len() {
                self.advance();
            }
            return Ok(Tok::Punct(punct));
        }
        let c = self.peek(0).unwrap_or(' ');
        Err(self.error(&format!("illegal character U+{:04X}", c as u32)))
    }
}

fn is_id_start(c: char) -> bool {
    c == '$' || c == '_' || c.is_alphabetic()
}

fn is_id_part(c: char) -> bool {
    is_id_start(c) || c.is_alphanumeric() || c == '\u{200c}' || c == '\u{200d}'
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn toks(source: &str) -> Vec<Tok> {
        Lexer::new(source).tokenize().unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            toks("var x = 0x1f + .5;"),
            vec![
                Tok::Name("var".into()),
                Tok::Name("x".into()),
                Tok::Punct("="),
                Tok::Num(31.0),
                Tok::Punct("+"),
                Tok::Num(0.5),
                Tok::Punct(";"),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_regex_or_division() {
        assert_eq!(
            toks("a / b / c"),
            vec![
                Tok::Name("a".into()),
                Tok::Punct("/"),
                Tok::Name("b".into()),
                Tok::Punct("/"),
                Tok::Name("c".into()),
                Tok::Eof,
            ]
        );
        assert_eq!(
            toks("x = /[/]+/g"),
            vec![
                Tok::Name("x".into()),
                Tok::Punct("="),
                Tok::Regex { pattern: "[/]+".into(), flags: "g".into() },
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_positions_and_newlines() {
        let tokens = Lexer::new("a\n  /* c\n */ b").tokenize().unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 0));
        assert_eq!((tokens[1].line, tokens[1].column), (3, 4));
        assert!(tokens[1].newline_before);
    }

    #[test]
    fn test_template_parts() {
        let tokens = toks("`a${b + {c: 1}.c}d`");
        assert_eq!(
            tokens[0],
            Tok::Template(vec![
                TemplatePart::Text("a".into()),
                TemplatePart::Expr { source: "b + {c: 1}.c".into(), line: 1, column: 4 },
                TemplatePart::Text("d".into()),
            ])
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("var s = 'abc\n';").tokenize().unwrap_err();
        assert_eq!(err.to_string(), "SyntaxError: unterminated string literal (line 1)");
    }
}
