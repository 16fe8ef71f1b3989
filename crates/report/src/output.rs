//! Colour markup for terminal summaries.
//!
//! Summary text carries markers such as `<<RED>>` and `<<NORMAL>>`. The
//! handler turns them into ANSI sequences, or drops them in boring mode.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref COLOR_MARKER: Regex = Regex::new(r"<<([A-Z]+)>>").unwrap();
}

fn ansi_code(name: &str) -> Option<&'static str> {
    Some(match name {
        "BLACK" => "\x1b[30m",
        "RED" => "\x1b[31m",
        "GREEN" => "\x1b[32m",
        "YELLOW" => "\x1b[33m",
        "BLUE" => "\x1b[34m",
        "MAGENTA" => "\x1b[35m",
        "CYAN" => "\x1b[36m",
        "WHITE" => "\x1b[37m",
        "NORMAL" => "\x1b[0m",
        _ => return None,
    })
}

/// Accumulates summary lines, rendering colour markers as it goes.
#[derive(Debug, Default)]
pub struct OutputHandler {
    buffer: String,
    no_color: bool,
}

impl OutputHandler {
    pub fn new(no_color: bool) -> Self {
        Self { buffer: String::new(), no_color }
    }

    /// Writes one line.
    pub fn write(&mut self, text: &str) -> &mut Self {
        let rendered = self.colorize(text);
        self.buffer.push_str(&rendered);
        if !self.no_color && COLOR_MARKER.is_match(text) {
            self.buffer.push_str("\x1b[0m");
        }
        self.buffer.push('\n');
        self
    }

    pub fn colorize(&self, text: &str) -> String {
        COLOR_MARKER
            .replace_all(text, |caps: &Captures<'_>| {
                if self.no_color {
                    String::new()
                } else {
                    ansi_code(&caps[1]).map(str::to_string).unwrap_or_else(|| caps[0].to_string())
                }
            })
            .into_owned()
    }

    pub fn into_string(self) -> String {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boring_strips_markers() {
        let mut handler = OutputHandler::new(true);
        handler.write("<<BLUE>><<GREEN>><<YELLOW>>text");
        assert_eq!(handler.into_string(), "text\n");
    }

    #[test]
    fn test_colour_sequences() {
        let handler = OutputHandler::new(false);
        assert_eq!(handler.colorize("<<RED>>x<<NORMAL>>"), "\x1b[31mx\x1b[0m");
        assert_eq!(handler.colorize("<<UNKNOWN>>"), "<<UNKNOWN>>");
    }
}
