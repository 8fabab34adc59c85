//! Document and text-block model shared by detectors, cache and orchestrator.
//! A `TextBlock` is one translatable unit; its range only positions the overlay.

use serde::Serialize;

/// Zero-based line / character position. `character` counts chars, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

impl Position {
    pub fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }
}

/// Half-open source span `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Whole-line span helper.
    pub fn lines(start_line: usize, end_line: usize, end_character: usize) -> Self {
        Self {
            start: Position::new(start_line, 0),
            end: Position::new(end_line, end_character),
        }
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.start <= pos && pos <= self.end
    }

    /// Ordering key used to pick the smallest enclosing block.
    pub fn extent(&self) -> (usize, usize) {
        let lines = self.end.line.saturating_sub(self.start.line);
        let chars = if lines == 0 {
            self.end.character.saturating_sub(self.start.character)
        } else {
            self.end.character
        };
        (lines, chars)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BlockKind {
    /// Module / class / function documentation (docstring, JSDoc, godoc).
    DocComment,
    /// Trailing or standalone single-line comment.
    InlineComment,
}

/// One translatable unit. `text` is never empty or whitespace-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextBlock {
    pub text: String,
    pub range: Range,
    pub kind: BlockKind,
}

impl TextBlock {
    /// Builds a block from raw comment content. Returns `None` when nothing
    /// worth translating is left after trimming.
    pub fn new(text: &str, range: Range, kind: BlockKind) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() || !text.chars().any(char::is_alphanumeric) {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            range,
            kind,
        })
    }
}

/// An open source file as seen by the pipeline.
#[derive(Debug, Clone)]
pub struct Document {
    uri: String,
    language_id: String,
    text: String,
    lines: Vec<String>,
}

impl Document {
    pub fn new(uri: impl Into<String>, language_id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let lines = text
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
            .collect();
        Self {
            uri: uri.into(),
            language_id: language_id.into(),
            text,
            lines,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Line content without its terminator; empty past the end.
    pub fn line(&self, index: usize) -> &str {
        self.lines.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Char length of a line, used for end-of-line positions.
    pub fn line_len(&self, index: usize) -> usize {
        self.line(index).chars().count()
    }
}

/// Converts a byte offset within `line` into a char column.
pub fn char_column(line: &str, byte_offset: usize) -> usize {
    line.get(..byte_offset)
        .map(|prefix| prefix.chars().count())
        .unwrap_or_else(|| line.chars().count())
}
