//! Markup and stylesheet glue.
//!
//! Documents are tokenized incrementally; inline scripts, event handler
//! attributes and styles are handed to the script and stylesheet checks
//! with the line they started on.

pub mod css;
pub mod tester;
pub mod tokenizer;

pub use css::{test_css_file, test_css_snippet};
pub use tester::MarkupTester;
pub use tokenizer::{MarkupError, Token, Tokenizer};
