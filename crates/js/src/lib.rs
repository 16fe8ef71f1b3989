//! Abstract JavaScript interpreter for app validation
//!
//! Scripts are parsed into a Reflect-dialect syntax tree and walked once by
//! a [`Traverser`] that propagates literal values where it can and treats
//! everything else as opaque. Along the way it reports CSP violations,
//! dangerous DOM use and the platform features the script touches.

pub mod ast;
pub mod error;
pub mod globals;
pub mod instance;
mod nodes;
mod operators;
pub mod parser;
pub mod scripting;
pub mod traverser;
pub mod value;

pub use ast::{Ast, Node, NodeId};
pub use error::{ParseError, ParseResult};
pub use instance::MarkupChecker;
pub use parser::{AcornParser, BuiltinParser, JsBackend, JsParser, SpiderMonkeyParser};
pub use scripting::{get_tree, test_js_file, test_js_snippet, ScriptOptions, ScriptOutcome};
pub use traverser::Traverser;
pub use value::{Literal, Value, MAX_STR_SIZE};
