//! Three-line source windows attached to messages.

use crate::message::ContextWindow;

/// Longest line shown before it gets cropped.
const MAX_LINE_WIDTH: usize = 140;
const HALF_WIDTH: usize = MAX_LINE_WIDTH / 2;

/// Serves context windows for one source text.
#[derive(Debug, Clone)]
pub struct ContextGenerator {
    lines: Vec<String>,
}

impl ContextGenerator {
    pub fn new(data: &str) -> Self {
        Self {
            lines: data.split('\n').map(|l| l.trim_end_matches('\r').to_string()).collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns the previous, current and next line around the 1-based
    /// `line`, or `None` when the line lies past the end of the data.
    ///
    /// Leading whitespace common to the three lines is removed. Lines longer
    /// than 140 characters are cropped: the previous line keeps its tail,
    /// the next line keeps its head and the current line keeps the region
    /// around `column`.
    ///
    /// `column` is a 0-based count of characters, not bytes or UTF-16 units.
    /// Script backends that report UTF-16 offsets are converted before their
    /// positions reach a message.
    pub fn get_context(&self, line: usize, column: Option<usize>) -> Option<ContextWindow> {
        let index = line.saturating_sub(1);
        if index >= self.lines.len() {
            return None;
        }

        let mut build: ContextWindow = [
            index.checked_sub(1).map(|i| self.lines[i].clone()),
            Some(self.lines[index].clone()),
            self.lines.get(index + 1).cloned(),
        ];

        let mut leading = [usize::MAX; 3];
        let mut strip = usize::MAX;
        for (slot, text) in build.iter().enumerate() {
            let Some(text) = text else { continue };
            if text.trim().is_empty() {
                continue;
            }
            let count = text.chars().count() - text.trim_start().chars().count();
            leading[slot] = count;
            strip = strip.min(count);
        }

        if strip == usize::MAX {
            return Some([Some(String::new()), Some(String::new()), Some(String::new())]);
        }

        let column = column.unwrap_or(0);
        for (slot, text) in build.iter_mut().enumerate() {
            let Some(raw) = text.as_mut() else { continue };
            if raw.is_empty() {
                continue;
            }
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                *raw = String::new();
                continue;
            }
            let formatted = format_line(trimmed, column, slot);
            *raw = format!("{}{}", " ".repeat(leading[slot] - strip), formatted);
        }

        Some(build)
    }

    /// Maps a character offset into the data to its 1-based line number.
    /// Offsets past the end resolve to the last line.
    pub fn get_line(&self, position: usize) -> usize {
        let mut count = self.lines.first().map(|l| l.chars().count()).unwrap_or(0);
        let mut line = 1;
        while count < position {
            if line >= self.lines.len() {
                break;
            }
            count += self.lines[line].chars().count() + 1;
            line += 1;
        }
        line
    }
}

fn format_line(data: &str, column: usize, rel_line: usize) -> String {
    let chars: Vec<char> = data.chars().collect();
    let length = chars.len();
    if length <= MAX_LINE_WIDTH {
        return data.to_string();
    }

    let slice = |from: usize, to: usize| chars[from..to].iter().collect::<String>();
    match rel_line {
        0 => format!("... {}", slice(length - MAX_LINE_WIDTH, length)),
        1 if column < HALF_WIDTH => format!("{} ...", slice(0, MAX_LINE_WIDTH)),
        1 if column > length - HALF_WIDTH => {
            format!("... {}", slice(length - MAX_LINE_WIDTH, length))
        }
        1 => format!("... {} ...", slice(column - HALF_WIDTH, column + HALF_WIDTH)),
        _ => format!("{} ...", slice(0, MAX_LINE_WIDTH)),
    }
}
