//! In-process recursive-descent parser.
//!
//! Covers ES5 plus the commonly shipped ES2015+ forms (`let`/`const`,
//! arrows, classes, templates, destructuring, spread) and emits the same
//! Reflect-dialect tree the external backends print. Operator chains are
//! parsed with precedence climbing so long `a + b + c` runs loop instead of
//! recursing; everything that does recurse counts against a depth limit.

use serde_json::{json, Value as Json};

use super::lexer::{Lexer, TemplatePart, Tok, Token};
use super::JsParser;
use crate::ast::{Ast, Node, NodeId};
use crate::error::{ParseError, ParseResult};

/// Deepest nesting of statements and expressions we accept
const MAX_DEPTH: usize = 256;

const RESERVED: [&str; 36] = [
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "enum", "export", "extends", "finally", "for", "function", "if", "import", "in",
    "instanceof", "new", "return", "super", "switch", "this", "throw", "try", "typeof", "var",
    "void", "while", "with", "null", "true", "false",
];

const ASSIGNMENT_OPERATORS: [&str; 16] = [
    "=", "+=", "-=", "*=", "/=", "%=", "<<=", ">>=", ">>>=", "&=", "|=", "^=", "**=", "&&=", "||=",
    "??=",
];

fn binary_precedence(op: &str) -> Option<u8> {
    Some(match op {
        "??" => 1,
        "||" => 2,
        "&&" => 3,
        "|" => 4,
        "^" => 5,
        "&" => 6,
        "==" | "!=" | "===" | "!==" => 7,
        "<" | ">" | "<=" | ">=" | "instanceof" | "in" => 8,
        "<<" | ">>" | ">>>" => 9,
        "+" | "-" => 10,
        "*" | "/" | "%" => 11,
        "**" => 12,
        _ => return None,
    })
}

/// The default parser; needs no external binaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinParser;

impl JsParser for BuiltinParser {
    fn parse(&self, source: &str) -> ParseResult<Ast> {
        let tokens = Lexer::new(source).tokenize()?;
        let mut parser = Parser::new(tokens);
        let program = parser.parse_program()?;
        parser.ast.set_root(program);
        Ok(parser.ast)
    }
}

type Pos = (usize, usize);

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    ast: Ast,
    depth: usize,
    /// Inside a `for (...;` head, where `in` ends the expression
    no_in: bool,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0, ast: Ast::new(), depth: 0, no_in: false }
    }

    // Token helpers

    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + offset).min(last)]
    }

    fn current(&self) -> &Token {
        self.peek_at(0)
    }

    fn bump(&mut self) -> Token {
        let token = self.current().clone();
        if token.tok != Tok::Eof {
            self.pos += 1;
        }
        token
    }

    fn at(&self, punct: &str) -> bool {
        self.current().is_punct(punct)
    }

    fn at_name(&self, name: &str) -> bool {
        self.current().is_name(name)
    }

    fn at_eof(&self) -> bool {
        self.current().tok == Tok::Eof
    }

    fn eat(&mut self, punct: &str) -> bool {
        if self.at(punct) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl AsRef<str>) -> ParseError {
        ParseError::Syntax {
            message: format!("SyntaxError: {}", message.as_ref()),
            line: Some(self.current().line),
        }
    }

    fn unexpected(&self) -> ParseError {
        self.error(format!("unexpected token: {}", self.current().describe()))
    }

    fn expect(&mut self, punct: &str) -> ParseResult<()> {
        if self.eat(punct) {
            return Ok(());
        }
        let message = match punct {
            ")" => "missing ) in parenthetical".to_string(),
            "]" => "missing ] after element list".to_string(),
            "}" => "missing } after property list".to_string(),
            _ => format!("expected '{}', got '{}'", punct, self.current().describe()),
        };
        Err(self.error(message))
    }

    fn expect_name(&mut self, name: &str) -> ParseResult<()> {
        if self.at_name(name) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(format!("expected '{}', got '{}'", name, self.current().describe())))
        }
    }

    fn consume_semicolon(&mut self) -> ParseResult<()> {
        if self.eat(";") || self.at("}") || self.at_eof() || self.current().newline_before {
            return Ok(());
        }
        Err(self.error("missing ; before statement"))
    }

    fn start(&self) -> Pos {
        let token = self.current();
        (token.line, token.column)
    }

    fn node(&self, node_type: &str, (line, column): Pos) -> Node {
        Node::new(node_type, line, column)
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.ast.push(node)
    }

    fn identifier(&mut self, name: &str, start: Pos) -> NodeId {
        let node = self.node("Identifier", start).with_value("name", name);
        self.push(node)
    }

    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::TooMuchRecursion);
        }
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Runs `f` with `in` allowed (or not) as an operator.
    fn with_in<T>(&mut self, allowed: bool, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        let saved = std::mem::replace(&mut self.no_in, !allowed);
        let result = f(self);
        self.no_in = saved;
        result
    }

    // Statements

    fn parse_program(&mut self) -> ParseResult<NodeId> {
        let start = (1, 0);
        let mut body = Vec::new();
        while !self.at_eof() {
            body.push(Some(self.parse_statement()?));
        }
        let node = self.node("Program", start).with_list("body", body);
        Ok(self.push(node))
    }

    fn parse_statement(&mut self) -> ParseResult<NodeId> {
        self.guarded(Self::statement)
    }

    fn statement(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let name = match &self.current().tok {
            Tok::Punct("{") => return self.parse_block(),
            Tok::Punct(";") => {
                self.bump();
                let node = self.node("EmptyStatement", start);
                return Ok(self.push(node));
            }
            Tok::Name(name) => name.clone(),
            _ => return self.expression_statement(),
        };

        match name.as_str() {
            "var" | "const" => self.declaration_statement(),
            "let" if self.let_starts_declaration() => self.declaration_statement(),
            "function" => self.parse_function(true, false),
            "async" if self.peek_at(1).is_name("function") && !self.peek_at(1).newline_before => {
                self.bump();
                self.parse_function(true, true)
            }
            "class" => self.parse_class(true),
            "if" => {
                self.bump();
                self.expect("(")?;
                let test = self.with_in(true, Self::parse_expression)?;
                self.expect(")")?;
                let consequent = self.parse_statement()?;
                let alternate = if self.at_name("else") {
                    self.bump();
                    Some(self.parse_statement()?)
                } else {
                    None
                };
                let node = self
                    .node("IfStatement", start)
                    .with_node("test", Some(test))
                    .with_node("consequent", Some(consequent))
                    .with_node("alternate", alternate);
                Ok(self.push(node))
            }
            "for" => self.parse_for(),
            "while" => {
                self.bump();
                self.expect("(")?;
                let test = self.with_in(true, Self::parse_expression)?;
                self.expect(")")?;
                let body = self.parse_statement()?;
                let node = self
                    .node("WhileStatement", start)
                    .with_node("test", Some(test))
                    .with_node("body", Some(body));
                Ok(self.push(node))
            }
            "do" => {
                self.bump();
                let body = self.parse_statement()?;
                self.expect_name("while")?;
                self.expect("(")?;
                let test = self.with_in(true, Self::parse_expression)?;
                self.expect(")")?;
                self.eat(";");
                let node = self
                    .node("DoWhileStatement", start)
                    .with_node("body", Some(body))
                    .with_node("test", Some(test));
                Ok(self.push(node))
            }
            "return" => {
                self.bump();
                let argument = if self.at(";") || self.at("}") || self.at_eof() || self.current().newline_before {
                    None
                } else {
                    Some(self.with_in(true, Self::parse_expression)?)
                };
                self.consume_semicolon()?;
                let node = self.node("ReturnStatement", start).with_node("argument", argument);
                Ok(self.push(node))
            }
            "break" | "continue" => {
                self.bump();
                let label = match &self.current().tok {
                    Tok::Name(label) if !self.current().newline_before && !RESERVED.contains(&label.as_str()) => {
                        let (label, at) = (label.clone(), self.start());
                        self.bump();
                        Some(self.identifier(&label, at))
                    }
                    _ => None,
                };
                self.consume_semicolon()?;
                let node_type = if name == "break" { "BreakStatement" } else { "ContinueStatement" };
                let node = self.node(node_type, start).with_node("label", label);
                Ok(self.push(node))
            }
            "throw" => {
                self.bump();
                if self.current().newline_before {
                    return Err(self.error("no line break is allowed between 'throw' and its expression"));
                }
                let argument = self.with_in(true, Self::parse_expression)?;
                self.consume_semicolon()?;
                let node = self.node("ThrowStatement", start).with_node("argument", Some(argument));
                Ok(self.push(node))
            }
            "try" => self.parse_try(),
            "switch" => self.parse_switch(),
            "with" => {
                self.bump();
                self.expect("(")?;
                let object = self.with_in(true, Self::parse_expression)?;
                self.expect(")")?;
                let body = self.parse_statement()?;
                let node = self
                    .node("WithStatement", start)
                    .with_node("object", Some(object))
                    .with_node("body", Some(body));
                Ok(self.push(node))
            }
            "debugger" => {
                self.bump();
                self.consume_semicolon()?;
                let node = self.node("DebuggerStatement", start);
                Ok(self.push(node))
            }
            "import" | "export" if !self.peek_at(1).is_punct("(") && !self.peek_at(1).is_punct(".") => {
                Err(self.error(format!("{} declarations may only appear at top level of a module", name)))
            }
            _ if self.peek_at(1).is_punct(":") && !RESERVED.contains(&name.as_str()) => {
                self.bump();
                let label = self.identifier(&name, start);
                self.bump();
                let body = self.parse_statement()?;
                let node = self
                    .node("LabeledStatement", start)
                    .with_node("label", Some(label))
                    .with_node("body", Some(body));
                Ok(self.push(node))
            }
            _ => self.expression_statement(),
        }
    }

    fn let_starts_declaration(&self) -> bool {
        let next = self.peek_at(1);
        match &next.tok {
            Tok::Name(name) => !matches!(name.as_str(), "in" | "instanceof" | "of"),
            Tok::Punct(p) => *p == "[" || *p == "{",
            _ => false,
        }
    }

    fn expression_statement(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let expression = self.with_in(true, Self::parse_expression)?;
        self.consume_semicolon()?;
        let node = self.node("ExpressionStatement", start).with_node("expression", Some(expression));
        Ok(self.push(node))
    }

    fn declaration_statement(&mut self) -> ParseResult<NodeId> {
        let declaration = self.parse_var_declaration()?;
        self.consume_semicolon()?;
        Ok(declaration)
    }

    fn parse_block(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        self.expect("{")?;
        let mut body = Vec::new();
        while !self.at("}") {
            if self.at_eof() {
                return Err(self.error("missing } in compound statement"));
            }
            body.push(Some(self.parse_statement()?));
        }
        self.bump();
        let node = self.node("BlockStatement", start).with_list("body", body);
        Ok(self.push(node))
    }

    /// `var`/`let`/`const` and its declarators, without the semicolon.
    fn parse_var_declaration(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let kind = match self.bump().tok {
            Tok::Name(kind) => kind,
            _ => return Err(self.unexpected()),
        };
        let mut declarations = Vec::new();
        loop {
            let at = self.start();
            let id = self.parse_binding_target()?;
            let init = if self.eat("=") { Some(self.parse_assignment()?) } else { None };
            let declarator = self
                .node("VariableDeclarator", at)
                .with_node("id", Some(id))
                .with_node("init", init);
            declarations.push(Some(self.push(declarator)));
            if !self.eat(",") {
                break;
            }
        }
        let node = self
            .node("VariableDeclaration", start)
            .with_value("kind", kind)
            .with_list("declarations", declarations);
        Ok(self.push(node))
    }

    fn parse_for(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        self.bump();
        if self.at_name("await") || self.at_name("each") {
            self.bump();
        }
        self.expect("(")?;

        let init = if self.at(";") {
            None
        } else if self.at_name("var") || self.at_name("const") || (self.at_name("let") && self.let_starts_declaration()) {
            Some(self.with_in(false, Self::parse_var_declaration)?)
        } else {
            Some(self.with_in(false, Self::parse_expression)?)
        };

        if let Some(left) = init {
            if self.at_name("in") || self.at_name("of") {
                let node_type = if self.at_name("of") { "ForOfStatement" } else { "ForInStatement" };
                self.bump();
                let left = self.to_pattern(left)?;
                let right = self.with_in(true, Self::parse_expression)?;
                self.expect(")")?;
                let body = self.parse_statement()?;
                let node = self
                    .node(node_type, start)
                    .with_node("left", Some(left))
                    .with_node("right", Some(right))
                    .with_node("body", Some(body))
                    .with_value("each", false);
                return Ok(self.push(node));
            }
        }

        self.expect(";")?;
        let test = if self.at(";") { None } else { Some(self.with_in(true, Self::parse_expression)?) };
        self.expect(";")?;
        let update = if self.at(")") { None } else { Some(self.with_in(true, Self::parse_expression)?) };
        self.expect(")")?;
        let body = self.parse_statement()?;
        let node = self
            .node("ForStatement", start)
            .with_node("init", init)
            .with_node("test", test)
            .with_node("update", update)
            .with_node("body", Some(body));
        Ok(self.push(node))
    }

    fn parse_try(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        self.bump();
        let block = self.parse_block()?;

        let handler = if self.at_name("catch") {
            let at = self.start();
            self.bump();
            let param = if self.eat("(") {
                let param = self.parse_binding_target()?;
                self.expect(")")?;
                Some(param)
            } else {
                None
            };
            let body = self.parse_block()?;
            let clause = self
                .node("CatchClause", at)
                .with_node("param", param)
                .with_node("guard", None)
                .with_node("body", Some(body));
            Some(self.push(clause))
        } else {
            None
        };

        let finalizer = if self.at_name("finally") {
            self.bump();
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error("missing catch or finally after try"));
        }

        let node = self
            .node("TryStatement", start)
            .with_node("block", Some(block))
            .with_node("handler", handler)
            .with_list("guardedHandlers", Vec::new())
            .with_node("finalizer", finalizer);
        Ok(self.push(node))
    }

    fn parse_switch(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        self.bump();
        self.expect("(")?;
        let discriminant = self.with_in(true, Self::parse_expression)?;
        self.expect(")")?;
        self.expect("{")?;

        let mut cases = Vec::new();
        while !self.eat("}") {
            let at = self.start();
            let test = if self.at_name("case") {
                self.bump();
                Some(self.with_in(true, Self::parse_expression)?)
            } else {
                self.expect_name("default")?;
                None
            };
            self.expect(":")?;
            let mut consequent = Vec::new();
            while !self.at("}") && !self.at_name("case") && !self.at_name("default") {
                if self.at_eof() {
                    return Err(self.error("missing } after switch body"));
                }
                consequent.push(Some(self.parse_statement()?));
            }
            let case = self
                .node("SwitchCase", at)
                .with_node("test", test)
                .with_list("consequent", consequent);
            cases.push(Some(self.push(case)));
        }

        let node = self
            .node("SwitchStatement", start)
            .with_node("discriminant", Some(discriminant))
            .with_list("cases", cases);
        Ok(self.push(node))
    }

    // Functions and classes

    fn parse_function(&mut self, declaration: bool, is_async: bool) -> ParseResult<NodeId> {
        let start = self.start();
        self.expect_name("function")?;
        let generator = self.eat("*");
        let id = match &self.current().tok {
            Tok::Name(_) => Some(self.binding_identifier()?),
            _ if declaration => return Err(self.error("function statement requires a name")),
            _ => None,
        };
        let params = self.parse_params()?;
        let body = self.parse_function_body()?;
        let node_type = if declaration { "FunctionDeclaration" } else { "FunctionExpression" };
        let node = self
            .node(node_type, start)
            .with_node("id", id)
            .with_list("params", params)
            .with_node("body", Some(body))
            .with_value("generator", generator)
            .with_value("async", is_async)
            .with_value("expression", false);
        Ok(self.push(node))
    }

    fn parse_params(&mut self) -> ParseResult<Vec<Option<NodeId>>> {
        self.expect("(")?;
        let mut params = Vec::new();
        while !self.at(")") {
            let start = self.start();
            let param = if self.eat("...") {
                let argument = self.parse_binding_target()?;
                let node = self.node("RestElement", start).with_node("argument", Some(argument));
                self.push(node)
            } else {
                self.parse_binding_element()?
            };
            params.push(Some(param));
            if !self.at(")") {
                self.expect(",")?;
            }
        }
        self.expect(")")?;
        Ok(params)
    }

    fn parse_function_body(&mut self) -> ParseResult<NodeId> {
        self.with_in(true, Self::parse_block)
    }

    /// Parameters and body of a method; the key was already read.
    fn parse_method_function(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let params = self.parse_params()?;
        let body = self.parse_function_body()?;
        let node = self
            .node("FunctionExpression", start)
            .with_node("id", None)
            .with_list("params", params)
            .with_node("body", Some(body));
        Ok(self.push(node))
    }

    fn parse_class(&mut self, declaration: bool) -> ParseResult<NodeId> {
        let start = self.start();
        self.bump();
        let id = match &self.current().tok {
            Tok::Name(name) if name != "extends" => Some(self.binding_identifier()?),
            _ if declaration => return Err(self.error("class statement requires a name")),
            _ => None,
        };
        let super_class = if self.at_name("extends") {
            self.bump();
            Some(self.parse_lhs()?)
        } else {
            None
        };

        let body_start = self.start();
        self.expect("{")?;
        let mut members = Vec::new();
        while !self.eat("}") {
            if self.eat(";") {
                continue;
            }
            if self.at_eof() {
                return Err(self.error("missing } after class body"));
            }
            members.push(Some(self.parse_class_member()?));
        }
        let body = self.node("ClassBody", body_start).with_list("body", members);
        let body = self.push(body);

        let node_type = if declaration { "ClassDeclaration" } else { "ClassExpression" };
        let node = self
            .node(node_type, start)
            .with_node("id", id)
            .with_node("superClass", super_class)
            .with_node("body", Some(body));
        Ok(self.push(node))
    }

    fn parse_class_member(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let modifier_applies = |p: &Self| {
            let next = p.peek_at(1);
            !next.is_punct("(") && !next.is_punct("=") && !next.is_punct(";") && !next.is_punct("}")
        };

        let is_static = self.at_name("static") && modifier_applies(self);
        if is_static {
            self.bump();
            if self.at("{") {
                // static initialisation block
                let body = self.parse_function_body()?;
                let node = self.node("StaticBlock", start).with_node("body", Some(body));
                return Ok(self.push(node));
            }
        }
        let mut kind = "method";
        if (self.at_name("get") || self.at_name("set")) && modifier_applies(self) {
            kind = if self.at_name("get") { "get" } else { "set" };
            self.bump();
        } else if self.at_name("async") && modifier_applies(self) {
            self.bump();
        }
        self.eat("*");

        let (key, computed, name) = self.parse_property_key()?;
        if self.at("(") {
            let value = self.parse_method_function()?;
            if kind == "method" && name.as_deref() == Some("constructor") {
                kind = "constructor";
            }
            let node = self
                .node("MethodDefinition", start)
                .with_node("key", Some(key))
                .with_node("value", Some(value))
                .with_value("kind", kind)
                .with_value("static", is_static)
                .with_value("computed", computed);
            return Ok(self.push(node));
        }

        let value = if self.eat("=") { Some(self.with_in(true, Self::parse_assignment)?) } else { None };
        self.consume_semicolon()?;
        let node = self
            .node("PropertyDefinition", start)
            .with_node("key", Some(key))
            .with_node("value", value)
            .with_value("static", is_static)
            .with_value("computed", computed);
        Ok(self.push(node))
    }

    // Bindings

    fn binding_identifier(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        match &self.current().tok {
            Tok::Name(name) if !RESERVED.contains(&name.as_str()) => {
                let name = name.clone();
                self.bump();
                Ok(self.identifier(&name, start))
            }
            _ => Err(self.error(format!("missing variable name, got '{}'", self.current().describe()))),
        }
    }

    fn parse_binding_target(&mut self) -> ParseResult<NodeId> {
        self.guarded(|p| {
            if p.at("[") {
                p.parse_array_pattern()
            } else if p.at("{") {
                p.parse_object_pattern()
            } else {
                p.binding_identifier()
            }
        })
    }

    /// A binding target with an optional default.
    fn parse_binding_element(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let target = self.parse_binding_target()?;
        if !self.eat("=") {
            return Ok(target);
        }
        let default = self.with_in(true, Self::parse_assignment)?;
        let node = self
            .node("AssignmentPattern", start)
            .with_node("left", Some(target))
            .with_node("right", Some(default));
        Ok(self.push(node))
    }

    fn parse_array_pattern(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        self.bump();
        let mut elements = Vec::new();
        while !self.at("]") {
            if self.eat(",") {
                elements.push(None);
                continue;
            }
            let at = self.start();
            let element = if self.eat("...") {
                let argument = self.parse_binding_target()?;
                let node = self.node("RestElement", at).with_node("argument", Some(argument));
                self.push(node)
            } else {
                self.parse_binding_element()?
            };
            elements.push(Some(element));
            if !self.at("]") {
                self.expect(",")?;
            }
        }
        self.bump();
        let node = self.node("ArrayPattern", start).with_list("elements", elements);
        Ok(self.push(node))
    }

    fn parse_object_pattern(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        self.bump();
        let mut properties = Vec::new();
        while !self.at("}") {
            let at = self.start();
            if self.eat("...") {
                let argument = self.parse_binding_target()?;
                let node = self.node("RestElement", at).with_node("argument", Some(argument));
                properties.push(Some(self.push(node)));
            } else {
                let (key, computed, name) = self.parse_property_key()?;
                let shorthand = !self.at(":");
                let value = if self.eat(":") {
                    self.parse_binding_element()?
                } else {
                    let Some(name) = name.filter(|_| !computed) else {
                        return Err(self.error("missing : after property id"));
                    };
                    let target = self.identifier(&name, at);
                    if self.eat("=") {
                        let default = self.with_in(true, Self::parse_assignment)?;
                        let node = self
                            .node("AssignmentPattern", at)
                            .with_node("left", Some(target))
                            .with_node("right", Some(default));
                        self.push(node)
                    } else {
                        target
                    }
                };
                let node = self
                    .node("Property", at)
                    .with_node("key", Some(key))
                    .with_node("value", Some(value))
                    .with_value("kind", "init")
                    .with_value("computed", computed)
                    .with_value("shorthand", shorthand);
                properties.push(Some(self.push(node)));
            }
            if !self.at("}") {
                self.expect(",")?;
            }
        }
        self.bump();
        let node = self.node("ObjectPattern", start).with_list("properties", properties);
        Ok(self.push(node))
    }

    /// Reinterprets an expression as an assignment target, in place.
    fn to_pattern(&mut self, id: NodeId) -> ParseResult<NodeId> {
        let node_type = self.ast.node(id).node_type.clone();
        match node_type.as_str() {
            "Identifier" | "MemberExpression" | "ObjectPattern" | "ArrayPattern"
            | "AssignmentPattern" | "RestElement" | "VariableDeclaration" => Ok(id),
            "ObjectExpression" => {
                let properties = self.ast.node(id).children("properties");
                for property in properties {
                    let prop = self.ast.node(property);
                    if prop.node_type == "SpreadElement" {
                        self.ast.node_mut(property).node_type = "RestElement".to_string();
                        if let Some(argument) = self.ast.node(property).child("argument") {
                            self.to_pattern(argument)?;
                        }
                    } else if let Some(value) = prop.child("value") {
                        self.to_pattern(value)?;
                    }
                }
                self.ast.node_mut(id).node_type = "ObjectPattern".to_string();
                Ok(id)
            }
            "ArrayExpression" => {
                let elements = self.ast.node(id).children("elements");
                for element in elements {
                    if self.ast.node(element).node_type == "SpreadElement" {
                        self.ast.node_mut(element).node_type = "RestElement".to_string();
                        if let Some(argument) = self.ast.node(element).child("argument") {
                            self.to_pattern(argument)?;
                        }
                    } else {
                        self.to_pattern(element)?;
                    }
                }
                self.ast.node_mut(id).node_type = "ArrayPattern".to_string();
                Ok(id)
            }
            "AssignmentExpression" if self.ast.node(id).str("operator") == Some("=") => {
                if let Some(left) = self.ast.node(id).child("left") {
                    self.to_pattern(left)?;
                }
                self.ast.node_mut(id).node_type = "AssignmentPattern".to_string();
                Ok(id)
            }
            _ => Err(self.error("invalid assignment left-hand side")),
        }
    }

    // Expressions

    fn parse_expression(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let first = self.parse_assignment()?;
        if !self.at(",") {
            return Ok(first);
        }
        let mut expressions = vec![Some(first)];
        while self.eat(",") {
            expressions.push(Some(self.parse_assignment()?));
        }
        let node = self.node("SequenceExpression", start).with_list("expressions", expressions);
        Ok(self.push(node))
    }

    fn parse_assignment(&mut self) -> ParseResult<NodeId> {
        self.guarded(Self::assignment)
    }

    fn assignment(&mut self) -> ParseResult<NodeId> {
        if let Some(arrow) = self.try_arrow()? {
            return Ok(arrow);
        }
        let start = self.start();

        if self.at_name("yield") && !self.peek_at(1).is_punct("=") {
            self.bump();
            let delegate = self.eat("*");
            let ends = [")", "]", "}", ",", ";", ":"];
            let argument = if self.at_eof() || self.current().newline_before || ends.iter().any(|p| self.at(p)) {
                None
            } else {
                Some(self.parse_assignment()?)
            };
            let node = self
                .node("YieldExpression", start)
                .with_node("argument", argument)
                .with_value("delegate", delegate);
            return Ok(self.push(node));
        }

        let left = self.parse_conditional()?;
        let operator = match self.current().tok {
            Tok::Punct(p) if ASSIGNMENT_OPERATORS.contains(&p) => p,
            _ => return Ok(left),
        };

        let left = if operator == "=" { self.to_pattern(left)? } else { left };
        if !matches!(
            self.ast.node(left).node_type.as_str(),
            "Identifier" | "MemberExpression" | "ObjectPattern" | "ArrayPattern" | "CallExpression"
        ) {
            return Err(self.error("invalid assignment left-hand side"));
        }
        self.bump();
        let right = self.parse_assignment()?;
        let node = self
            .node("AssignmentExpression", start)
            .with_value("operator", operator)
            .with_node("left", Some(left))
            .with_node("right", Some(right));
        Ok(self.push(node))
    }

    /// Whether the `(` at `open` is closed by a `)` that is followed by `=>`.
    fn arrow_after_parens(&self, open: usize) -> bool {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(open) {
            match token.tok {
                Tok::Punct("(" | "[" | "{") => depth += 1,
                Tok::Punct(")" | "]" | "}") => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return self.tokens.get(i + 1).map_or(false, |t| t.is_punct("=>"));
                    }
                }
                Tok::Eof => return false,
                _ => {}
            }
        }
        false
    }

    fn try_arrow(&mut self) -> ParseResult<Option<NodeId>> {
        let start = self.start();
        let is_async = self.at_name("async")
            && !self.peek_at(1).newline_before
            && (matches!(self.peek_at(1).tok, Tok::Name(_)) && self.peek_at(2).is_punct("=>")
                || self.peek_at(1).is_punct("(") && self.arrow_after_parens(self.pos + 1));
        let offset = usize::from(is_async);

        let single = match &self.peek_at(offset).tok {
            Tok::Name(name) => !RESERVED.contains(&name.as_str()) && self.peek_at(offset + 1).is_punct("=>"),
            _ => false,
        };
        let parenthesised = !single && self.peek_at(offset).is_punct("(") && self.arrow_after_parens(self.pos + offset);
        if !single && !parenthesised {
            return Ok(None);
        }

        if is_async {
            self.bump();
        }
        let params = if single { vec![Some(self.binding_identifier()?)] } else { self.parse_params()? };
        self.expect("=>")?;

        let (body, expression) = if self.at("{") {
            (self.parse_function_body()?, false)
        } else {
            (self.parse_assignment()?, true)
        };
        let node = self
            .node("ArrowFunctionExpression", start)
            .with_node("id", None)
            .with_list("params", params)
            .with_node("body", Some(body))
            .with_value("expression", expression)
            .with_value("async", is_async);
        Ok(Some(self.push(node)))
    }

    fn parse_conditional(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let test = self.parse_binary(0)?;
        if !self.eat("?") {
            return Ok(test);
        }
        let consequent = self.with_in(true, Self::parse_assignment)?;
        self.expect(":")?;
        let alternate = self.parse_assignment()?;
        let node = self
            .node("ConditionalExpression", start)
            .with_node("test", Some(test))
            .with_node("consequent", Some(consequent))
            .with_node("alternate", Some(alternate));
        Ok(self.push(node))
    }

    fn binary_operator(&self) -> Option<(&'static str, u8)> {
        let op: &'static str = match &self.current().tok {
            Tok::Punct(p) => *p,
            Tok::Name(name) if name == "instanceof" => "instanceof",
            Tok::Name(name) if name == "in" && !self.no_in => "in",
            _ => return None,
        };
        binary_precedence(op).map(|prec| (op, prec))
    }

    fn parse_binary(&mut self, min_precedence: u8) -> ParseResult<NodeId> {
        let start = self.start();
        let mut left = self.parse_unary()?;
        while let Some((op, precedence)) = self.binary_operator() {
            if precedence < min_precedence {
                break;
            }
            self.bump();
            // `**` is the one right-associative operator
            let next = if op == "**" { precedence } else { precedence + 1 };
            let right = self.parse_binary(next)?;
            let node_type = if matches!(op, "&&" | "||" | "??") { "LogicalExpression" } else { "BinaryExpression" };
            let node = self
                .node(node_type, start)
                .with_value("operator", op)
                .with_node("left", Some(left))
                .with_node("right", Some(right));
            left = self.push(node);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<NodeId> {
        self.guarded(Self::unary)
    }

    fn starts_operand(token: &Token) -> bool {
        match &token.tok {
            Tok::Name(name) => !matches!(name.as_str(), "in" | "instanceof" | "of"),
            Tok::Num(_) | Tok::Str(_) | Tok::Template(_) | Tok::Regex { .. } => true,
            Tok::Punct(p) => matches!(*p, "(" | "[" | "{" | "!" | "~" | "+" | "-" | "++" | "--"),
            Tok::Eof => false,
        }
    }

    fn unary(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let operator: Option<&'static str> = match &self.current().tok {
            Tok::Punct(p @ ("!" | "~" | "+" | "-")) => Some(*p),
            Tok::Name(name) => match name.as_str() {
                "typeof" => Some("typeof"),
                "void" => Some("void"),
                "delete" => Some("delete"),
                _ => None,
            },
            _ => None,
        };
        if let Some(operator) = operator {
            self.bump();
            let argument = self.parse_unary()?;
            let node = self
                .node("UnaryExpression", start)
                .with_value("operator", operator)
                .with_value("prefix", true)
                .with_node("argument", Some(argument));
            return Ok(self.push(node));
        }

        if self.at_name("await") && !self.peek_at(1).newline_before && Self::starts_operand(self.peek_at(1)) {
            self.bump();
            let argument = self.parse_unary()?;
            let node = self.node("AwaitExpression", start).with_node("argument", Some(argument));
            return Ok(self.push(node));
        }

        if let Tok::Punct(op @ ("++" | "--")) = self.current().tok {
            self.bump();
            let argument = self.parse_unary()?;
            let node = self
                .node("UpdateExpression", start)
                .with_value("operator", op)
                .with_value("prefix", true)
                .with_node("argument", Some(argument));
            return Ok(self.push(node));
        }

        let expression = self.parse_lhs()?;
        if let Tok::Punct(op @ ("++" | "--")) = self.current().tok {
            if !self.current().newline_before {
                self.bump();
                let node = self
                    .node("UpdateExpression", start)
                    .with_value("operator", op)
                    .with_value("prefix", false)
                    .with_node("argument", Some(expression));
                return Ok(self.push(node));
            }
        }
        Ok(expression)
    }

    /// Member, call and `new` expressions.
    fn parse_lhs(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let base = if self.at_name("new") { self.parse_new()? } else { self.parse_primary()? };
        self.parse_tail(start, base, true)
    }

    fn parse_new(&mut self) -> ParseResult<NodeId> {
        self.guarded(|p| {
            let start = p.start();
            p.bump();
            if p.eat(".") {
                let meta = p.identifier("new", start);
                let property = p.property_identifier()?;
                let node = p
                    .node("MetaProperty", start)
                    .with_node("meta", Some(meta))
                    .with_node("property", Some(property));
                return Ok(p.push(node));
            }
            let callee_start = p.start();
            let callee = if p.at_name("new") { p.parse_new()? } else { p.parse_primary()? };
            let callee = p.parse_tail(callee_start, callee, false)?;
            let arguments = if p.at("(") { p.parse_arguments()? } else { Vec::new() };
            let node = p
                .node("NewExpression", start)
                .with_node("callee", Some(callee))
                .with_list("arguments", arguments);
            Ok(p.push(node))
        })
    }

    fn property_identifier(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let private = self.eat("#");
        match self.current().tok.clone() {
            Tok::Name(name) => {
                self.bump();
                let name = if private { format!("#{}", name) } else { name };
                Ok(self.identifier(&name, start))
            }
            _ => Err(self.error("missing name after . operator")),
        }
    }

    fn member(&mut self, start: Pos, object: NodeId, property: NodeId, computed: bool, optional: bool) -> NodeId {
        let node = self
            .node("MemberExpression", start)
            .with_node("object", Some(object))
            .with_node("property", Some(property))
            .with_value("computed", computed)
            .with_value("optional", optional);
        self.push(node)
    }

    fn call(&mut self, start: Pos, callee: NodeId, optional: bool) -> ParseResult<NodeId> {
        let arguments = self.parse_arguments()?;
        let node = self
            .node("CallExpression", start)
            .with_node("callee", Some(callee))
            .with_list("arguments", arguments)
            .with_value("optional", optional);
        Ok(self.push(node))
    }

    fn parse_tail(&mut self, start: Pos, mut expression: NodeId, allow_call: bool) -> ParseResult<NodeId> {
        loop {
            match self.current().tok {
                Tok::Punct(".") => {
                    self.bump();
                    let property = self.property_identifier()?;
                    expression = self.member(start, expression, property, false, false);
                }
                Tok::Punct("?.") => {
                    self.bump();
                    if self.at("(") {
                        expression = self.call(start, expression, true)?;
                    } else if self.eat("[") {
                        let property = self.with_in(true, Self::parse_expression)?;
                        self.expect("]")?;
                        expression = self.member(start, expression, property, true, true);
                    } else {
                        let property = self.property_identifier()?;
                        expression = self.member(start, expression, property, false, true);
                    }
                }
                Tok::Punct("[") => {
                    self.bump();
                    let property = self.with_in(true, Self::parse_expression)?;
                    self.expect("]")?;
                    expression = self.member(start, expression, property, true, false);
                }
                Tok::Punct("(") if allow_call => {
                    expression = self.call(start, expression, false)?;
                }
                Tok::Template(_) => {
                    let quasi = self.parse_template()?;
                    let node = self
                        .node("TaggedTemplateExpression", start)
                        .with_node("tag", Some(expression))
                        .with_node("quasi", Some(quasi));
                    expression = self.push(node);
                }
                _ => return Ok(expression),
            }
        }
    }

    fn parse_arguments(&mut self) -> ParseResult<Vec<Option<NodeId>>> {
        self.expect("(")?;
        let arguments = self.with_in(true, |p| {
            let mut arguments = Vec::new();
            while !p.at(")") {
                if p.at_eof() {
                    return Err(p.error("missing ) after argument list"));
                }
                arguments.push(Some(p.parse_spread_or_assignment()?));
                if !p.at(")") {
                    if !p.at(",") {
                        return Err(p.error("missing ) after argument list"));
                    }
                    p.bump();
                }
            }
            Ok(arguments)
        })?;
        self.bump();
        Ok(arguments)
    }

    fn parse_spread_or_assignment(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        if !self.eat("...") {
            return self.parse_assignment();
        }
        let argument = self.parse_assignment()?;
        let node = self.node("SpreadElement", start).with_node("argument", Some(argument));
        Ok(self.push(node))
    }

    fn literal(&mut self, value: Json, start: Pos) -> NodeId {
        let node = self.node("Literal", start).with_value("value", value);
        self.push(node)
    }

    fn parse_primary(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let token = self.current().clone();
        match token.tok {
            Tok::Num(n) => {
                self.bump();
                Ok(self.literal(json!(n), start))
            }
            Tok::Str(s) => {
                self.bump();
                Ok(self.literal(Json::String(s), start))
            }
            Tok::Regex { pattern, flags } => {
                self.bump();
                let node = self
                    .node("Literal", start)
                    .with_value("value", json!({}))
                    .with_value("regex", json!({ "pattern": pattern, "flags": flags }));
                Ok(self.push(node))
            }
            Tok::Template(_) => self.parse_template(),
            Tok::Punct("(") => {
                self.bump();
                let expression = self.with_in(true, Self::parse_expression)?;
                self.expect(")")?;
                Ok(expression)
            }
            Tok::Punct("[") => self.parse_array_literal(),
            Tok::Punct("{") => self.parse_object_literal(),
            Tok::Name(name) => match name.as_str() {
                "this" => {
                    self.bump();
                    let node = self.node("ThisExpression", start);
                    Ok(self.push(node))
                }
                "null" => {
                    self.bump();
                    Ok(self.literal(Json::Null, start))
                }
                "true" | "false" => {
                    self.bump();
                    Ok(self.literal(Json::Bool(name == "true"), start))
                }
                "function" => self.parse_function(false, false),
                "async" if self.peek_at(1).is_name("function") && !self.peek_at(1).newline_before => {
                    self.bump();
                    self.parse_function(false, true)
                }
                "class" => self.parse_class(false),
                "super" => {
                    self.bump();
                    let node = self.node("Super", start);
                    Ok(self.push(node))
                }
                _ if RESERVED.contains(&name.as_str()) => {
                    Err(self.error(format!("expected expression, got keyword '{}'", name)))
                }
                _ => {
                    self.bump();
                    Ok(self.identifier(&name, start))
                }
            },
            _ => Err(self.error(format!("expected expression, got '{}'", token.describe()))),
        }
    }

    fn parse_template(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        let Tok::Template(parts) = self.bump().tok else {
            return Err(self.unexpected());
        };
        let mut quasis = Vec::new();
        let mut expressions = Vec::new();
        let count = parts.len();
        for (i, part) in parts.into_iter().enumerate() {
            match part {
                TemplatePart::Text(text) => {
                    let node = self
                        .node("TemplateElement", start)
                        .with_value("value", json!({ "raw": text, "cooked": text }))
                        .with_value("tail", i + 1 == count);
                    quasis.push(Some(self.push(node)));
                }
                TemplatePart::Expr { source, line, column } => {
                    expressions.push(Some(self.parse_substitution(&source, line, column)?));
                }
            }
        }
        let node = self
            .node("TemplateLiteral", start)
            .with_list("quasis", quasis)
            .with_list("expressions", expressions);
        Ok(self.push(node))
    }

    /// Parses a `${...}` body with its own token stream.
    fn parse_substitution(&mut self, source: &str, line: usize, column: usize) -> ParseResult<NodeId> {
        let tokens = Lexer::at(source, line, column).tokenize()?;
        let saved_tokens = std::mem::replace(&mut self.tokens, tokens);
        let saved_pos = std::mem::replace(&mut self.pos, 0);
        let result = self.with_in(true, Self::parse_expression).and_then(|expression| {
            if self.at_eof() {
                Ok(expression)
            } else {
                Err(self.unexpected())
            }
        });
        self.tokens = saved_tokens;
        self.pos = saved_pos;
        result
    }

    fn parse_array_literal(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        self.bump();
        let elements = self.with_in(true, |p| {
            let mut elements = Vec::new();
            while !p.at("]") {
                if p.at_eof() {
                    return Err(p.error("missing ] after element list"));
                }
                if p.eat(",") {
                    elements.push(None);
                    continue;
                }
                elements.push(Some(p.parse_spread_or_assignment()?));
                if !p.at("]") {
                    p.expect(",")?;
                }
            }
            Ok(elements)
        })?;
        self.bump();
        let node = self.node("ArrayExpression", start).with_list("elements", elements);
        Ok(self.push(node))
    }

    fn is_property_key_start(token: &Token) -> bool {
        matches!(token.tok, Tok::Name(_) | Tok::Str(_) | Tok::Num(_) | Tok::Punct("[" | "#"))
    }

    /// Returns the key node, whether it is computed, and its static name.
    fn parse_property_key(&mut self) -> ParseResult<(NodeId, bool, Option<String>)> {
        let start = self.start();
        match self.current().tok.clone() {
            Tok::Name(name) => {
                self.bump();
                Ok((self.identifier(&name, start), false, Some(name)))
            }
            Tok::Str(s) => {
                self.bump();
                Ok((self.literal(Json::String(s.clone()), start), false, Some(s)))
            }
            Tok::Num(n) => {
                self.bump();
                let name = crate::value::format_number(n);
                Ok((self.literal(json!(n), start), false, Some(name)))
            }
            Tok::Punct("[") => {
                self.bump();
                let key = self.with_in(true, Self::parse_assignment)?;
                self.expect("]")?;
                Ok((key, true, None))
            }
            Tok::Punct("#") => {
                let key = self.property_identifier()?;
                Ok((key, false, None))
            }
            _ => Err(self.error(format!("invalid property id '{}'", self.current().describe()))),
        }
    }

    fn parse_object_literal(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        self.bump();
        let properties = self.with_in(true, |p| {
            let mut properties = Vec::new();
            while !p.at("}") {
                if p.at_eof() {
                    return Err(p.error("missing } after property list"));
                }
                properties.push(Some(p.parse_property()?));
                if !p.at("}") {
                    p.expect(",")?;
                }
            }
            Ok(properties)
        })?;
        self.bump();
        let node = self.node("ObjectExpression", start).with_list("properties", properties);
        Ok(self.push(node))
    }

    fn parse_property(&mut self) -> ParseResult<NodeId> {
        let start = self.start();
        if self.eat("...") {
            let argument = self.parse_assignment()?;
            let node = self.node("SpreadElement", start).with_node("argument", Some(argument));
            return Ok(self.push(node));
        }

        let mut kind = "init";
        let next = self.peek_at(1);
        if (self.at_name("get") || self.at_name("set")) && Self::is_property_key_start(next) {
            kind = if self.at_name("get") { "get" } else { "set" };
            self.bump();
        } else if self.at_name("async") && Self::is_property_key_start(next) && !next.newline_before {
            self.bump();
        }
        self.eat("*");

        let (key, computed, name) = self.parse_property_key()?;
        let mut method = false;
        let mut shorthand = false;
        let value = if kind != "init" || self.at("(") {
            method = kind == "init";
            self.parse_method_function()?
        } else if self.eat(":") {
            self.parse_assignment()?
        } else {
            let is_identifier = self.ast.node(key).node_type == "Identifier";
            let Some(name) = name.clone().filter(|_| is_identifier) else {
                return Err(self.error("missing : after property id"));
            };
            shorthand = true;
            let target = self.identifier(&name, start);
            if self.eat("=") {
                // `{a = 1} = obj` is only valid once turned into a pattern
                let default = self.parse_assignment()?;
                let node = self
                    .node("AssignmentExpression", start)
                    .with_value("operator", "=")
                    .with_node("left", Some(target))
                    .with_node("right", Some(default));
                self.push(node)
            } else {
                target
            }
        };

        if name.as_deref() == Some("__proto__") && !computed && !shorthand && !method && kind == "init" {
            let node = self.node("PrototypeMutation", start).with_node("value", Some(value));
            return Ok(self.push(node));
        }

        let node = self
            .node("Property", start)
            .with_node("key", Some(key))
            .with_node("value", Some(value))
            .with_value("kind", kind)
            .with_value("computed", computed)
            .with_value("method", method)
            .with_value("shorthand", shorthand);
        Ok(self.push(node))
    }
}
