use std::error::Error;
use std::fmt;

/// Failures while turning source text into a syntax tree
#[derive(Debug)]
pub enum ParseError {
    /// The source does not parse. `message` carries the backend's text,
    /// usually in the form `SyntaxError: ...`
    Syntax { message: String, line: Option<usize> },
    /// The tree nests deeper than we are willing to walk
    TooMuchRecursion,
    /// The backend itself failed while parsing
    Runtime(String),
    /// The backend could not be started or talked to
    Io(std::io::Error),
    /// The backend answered with something that is not a tree
    Malformed(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Syntax { message, line: Some(line) } => {
                write!(f, "{} (line {})", message, line)
            }
            ParseError::Syntax { message, line: None } => write!(f, "{}", message),
            ParseError::TooMuchRecursion => write!(f, "Too much recursion"),
            ParseError::Runtime(msg) => write!(f, "Parser runtime error: {}", msg),
            ParseError::Io(e) => write!(f, "Parser I/O error: {}", e),
            ParseError::Malformed(msg) => write!(f, "Malformed syntax tree: {}", msg),
        }
    }
}

impl Error for ParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ParseError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::Io(e)
    }
}

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ParseError::Syntax { message: "SyntaxError: missing ;".to_string(), line: Some(3) };
        assert_eq!(err.to_string(), "SyntaxError: missing ; (line 3)");

        assert_eq!(ParseError::TooMuchRecursion.to_string(), "Too much recursion");
    }

    #[test]
    fn test_error_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "js");
        let err = ParseError::from(io);
        assert!(err.source().is_some());

        let err = ParseError::Runtime("boom".to_string());
        assert!(err.source().is_none());
    }
}
