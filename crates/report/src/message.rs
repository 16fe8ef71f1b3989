//! Report entries and the builder used to raise them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::ContextGenerator;

/// Severity of a report entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Error,
    Warning,
    Notice,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Error => write!(f, "error"),
            MessageKind::Warning => write!(f, "warning"),
            MessageKind::Notice => write!(f, "notice"),
        }
    }
}

/// A message or description: one string or a list of paragraphs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Text {
    Single(String),
    Lines(Vec<String>),
}

impl Text {
    pub fn is_empty(&self) -> bool {
        match self {
            Text::Single(s) => s.is_empty(),
            Text::Lines(lines) => lines.iter().all(|l| l.is_empty()),
        }
    }

    /// Joins paragraphs with newlines for plain-text output.
    pub fn flatten(&self) -> String {
        match self {
            Text::Single(s) => s.clone(),
            Text::Lines(lines) => lines.join("\n"),
        }
    }

    /// Appends a paragraph, promoting a single string to a list.
    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        match self {
            Text::Single(s) if s.is_empty() => *s = line,
            Text::Single(s) => *self = Text::Lines(vec![std::mem::take(s), line]),
            Text::Lines(lines) => lines.push(line),
        }
    }
}

impl Default for Text {
    fn default() -> Self {
        Text::Single(String::new())
    }
}

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Text::Single(s.to_string())
    }
}

impl From<String> for Text {
    fn from(s: String) -> Self {
        Text::Single(s)
    }
}

impl From<Vec<String>> for Text {
    fn from(lines: Vec<String>) -> Self {
        Text::Lines(lines)
    }
}

impl From<&[&str]> for Text {
    fn from(lines: &[&str]) -> Self {
        Text::Lines(lines.iter().map(|l| l.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Text {
    fn from(lines: [&str; N]) -> Self {
        Text::Lines(lines.iter().map(|l| l.to_string()).collect())
    }
}

/// Where a message was raised. Files inside nested packages are a path of
/// archive members, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileRef {
    Path(String),
    Nested(Vec<String>),
}

impl FileRef {
    pub fn is_empty(&self) -> bool {
        match self {
            FileRef::Path(p) => p.is_empty(),
            FileRef::Nested(parts) => parts.is_empty(),
        }
    }

    /// Returns a reference to a member inside this file (for nested packages).
    pub fn join(&self, member: &str) -> FileRef {
        match self {
            FileRef::Path(p) if p.is_empty() => FileRef::Path(member.to_string()),
            FileRef::Path(p) => FileRef::Nested(vec![p.clone(), member.to_string()]),
            FileRef::Nested(parts) => {
                let mut parts = parts.clone();
                parts.push(member.to_string());
                FileRef::Nested(parts)
            }
        }
    }

    /// The innermost file name.
    pub fn leaf(&self) -> &str {
        match self {
            FileRef::Path(p) => p,
            FileRef::Nested(parts) => parts.last().map(String::as_str).unwrap_or(""),
        }
    }
}

impl Default for FileRef {
    fn default() -> Self {
        FileRef::Path(String::new())
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileRef::Path(p) => write!(f, "{}", p),
            FileRef::Nested(parts) => {
                let mut shown: Vec<&str> = parts.iter().map(String::as_str).collect();
                if shown.last() == Some(&"") {
                    shown.pop();
                    shown.push("(none)");
                }
                write!(f, "{}", shown.join(" > "))
            }
        }
    }
}

impl From<&str> for FileRef {
    fn from(s: &str) -> Self {
        FileRef::Path(s.to_string())
    }
}

impl From<String> for FileRef {
    fn from(s: String) -> Self {
        FileRef::Path(s)
    }
}

impl From<&String> for FileRef {
    fn from(s: &String) -> Self {
        FileRef::Path(s.clone())
    }
}

impl From<Vec<String>> for FileRef {
    fn from(parts: Vec<String>) -> Self {
        FileRef::Nested(parts)
    }
}

impl From<&FileRef> for FileRef {
    fn from(f: &FileRef) -> Self {
        f.clone()
    }
}

/// Previous, current and next source line around a message.
pub type ContextWindow = [Option<String>; 3];

/// A stored report entry, in the shape it is rendered to JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub uid: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub id: Vec<String>,
    pub message: Text,
    pub description: Text,
    pub file: FileRef,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub tier: u8,
    pub context: Option<ContextWindow>,
}

#[derive(Debug, Clone)]
pub(crate) enum ContextSource<'a> {
    Window(ContextWindow),
    Generator(&'a ContextGenerator),
}

/// Builder for a message before it is handed to the bundle.
///
/// ```
/// use appvalidator_report::{Diagnostic, ErrorBundle};
///
/// let mut bundle = ErrorBundle::new(true);
/// bundle.error(
///     Diagnostic::new(["spec", "webapp", "dev_url"], "`developer.url` is invalid")
///         .file("manifest.webapp"),
/// );
/// assert!(bundle.failed(false));
/// ```
#[derive(Debug, Clone)]
pub struct Diagnostic<'a> {
    pub(crate) id: Vec<String>,
    pub(crate) message: Text,
    pub(crate) description: Text,
    pub(crate) file: FileRef,
    pub(crate) line: Option<usize>,
    pub(crate) column: Option<usize>,
    pub(crate) tier: Option<u8>,
    pub(crate) context: Option<ContextSource<'a>>,
}

impl<'a> Diagnostic<'a> {
    pub fn new<I, S>(id: I, message: impl Into<Text>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            id: id.into_iter().map(|s| s.as_ref().to_string()).collect(),
            message: message.into(),
            description: Text::default(),
            file: FileRef::default(),
            line: None,
            column: None,
            tier: None,
            context: None,
        }
    }

    pub fn description(mut self, description: impl Into<Text>) -> Self {
        self.description = description.into();
        self
    }

    pub fn file(mut self, file: impl Into<FileRef>) -> Self {
        self.file = file.into();
        self
    }

    pub fn line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn maybe_line(mut self, line: Option<usize>) -> Self {
        self.line = line;
        self
    }

    pub fn column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }

    pub fn maybe_column(mut self, column: Option<usize>) -> Self {
        self.column = column;
        self
    }

    pub fn tier(mut self, tier: u8) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Attaches a ready-made three-line window.
    pub fn context(mut self, window: ContextWindow) -> Self {
        self.context = Some(ContextSource::Window(window));
        self
    }

    /// Asks `generator` for the window once line and column are known.
    pub fn context_from(mut self, generator: &'a ContextGenerator) -> Self {
        self.context = Some(ContextSource::Generator(generator));
        self
    }

    pub fn maybe_context_from(mut self, generator: Option<&'a ContextGenerator>) -> Self {
        if let Some(generator) = generator {
            self.context = Some(ContextSource::Generator(generator));
        }
        self
    }

    pub fn id(&self) -> &[String] {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_file_display() {
        let file = FileRef::Nested(vec!["outer.zip".into(), "inner.js".into()]);
        assert_eq!(file.to_string(), "outer.zip > inner.js");

        let file = FileRef::Nested(vec!["outer.zip".into(), "".into()]);
        assert_eq!(file.to_string(), "outer.zip > (none)");
    }

    #[test]
    fn test_file_join() {
        let root = FileRef::from("");
        assert_eq!(root.join("a.js"), FileRef::from("a.js"));

        let sub = FileRef::from("lib.zip").join("a.js");
        assert_eq!(sub, FileRef::Nested(vec!["lib.zip".into(), "a.js".into()]));
        assert_eq!(sub.leaf(), "a.js");
    }

    #[test]
    fn test_text_push_and_flatten() {
        let mut text = Text::from("first");
        text.push("second");
        assert_eq!(text.flatten(), "first\nsecond");

        let mut empty = Text::default();
        empty.push("only");
        assert_eq!(empty, Text::from("only"));
    }
}
