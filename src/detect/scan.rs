//! Shared scanning primitives: quote-state machine, delimited-comment extraction
//! and a document-level comment lexer. Detectors classify what this module finds.

use std::collections::HashSet;

use crate::document::{char_column, BlockKind, Position, Range, TextBlock};

/// Comment and string syntax of one language family.
#[derive(Debug, Clone, Copy)]
pub struct Syntax {
    pub line_marker: &'static str,
    /// Block comment open / close, e.g. `/*` `*/`.
    pub block: Option<(&'static str, &'static str)>,
    /// Per-line continuation marker stripped from block comment lines.
    pub continuation: Option<char>,
    /// Whether `'` opens a string (or rune) literal.
    pub single_quote: bool,
    /// Back-tick / raw string delimiter; may span lines.
    pub raw_quote: Option<char>,
    /// Python-style `"""` / `'''` strings.
    pub triple_quotes: bool,
}

/// Tracks whether the scanner is inside a string literal.
///
/// A quote toggles its own state only when it is not escaped and no other
/// quote type is open. Single and double quoted strings end at the line break;
/// raw strings survive it.
#[derive(Debug, Default, Clone)]
pub struct QuoteState {
    single: bool,
    double: bool,
    raw: bool,
    escaped: bool,
}

impl QuoteState {
    pub fn in_string(&self) -> bool {
        self.single || self.double || self.raw
    }

    pub fn feed(&mut self, ch: char, syntax: &Syntax) {
        if self.escaped {
            self.escaped = false;
            return;
        }
        if ch == '\\' && self.in_string() {
            self.escaped = true;
            return;
        }
        match ch {
            '\'' if syntax.single_quote && !self.double && !self.raw => self.single = !self.single,
            '"' if !self.single && !self.raw => self.double = !self.double,
            c if Some(c) == syntax.raw_quote && !self.single && !self.double => {
                self.raw = !self.raw
            }
            _ => {}
        }
    }

    pub fn end_line(&mut self) {
        self.single = false;
        self.double = false;
        self.escaped = false;
    }
}

/// Byte offset of the first `marker` in `line` that is outside any string literal.
pub fn find_line_comment(line: &str, marker: &str, syntax: &Syntax) -> Option<usize> {
    let mut quotes = QuoteState::default();
    for (i, ch) in line.char_indices() {
        if !quotes.in_string() && line[i..].starts_with(marker) {
            return Some(i);
        }
        quotes.feed(ch, syntax);
    }
    None
}

/// A delimited comment (or docstring) located in the source.
#[derive(Debug, Clone)]
pub struct Delimited {
    pub range: Range,
    pub start_line: usize,
    pub end_line: usize,
    /// Byte offset just past the closing delimiter on `end_line`.
    pub end_byte: usize,
    pub content: String,
}

/// Extracts a delimited block starting at `(line, byte_col)`, where `open` begins.
///
/// The first `close` after the opener wins, on the same line or any later one
/// (no nesting). Each line is trimmed and loses its continuation marker; the
/// result is trimmed as a whole. Returns `None` when the block is unterminated.
pub fn extract_delimited(
    lines: &[String],
    line: usize,
    byte_col: usize,
    open: &str,
    close: &str,
    continuation: Option<char>,
) -> Option<Delimited> {
    let first = lines.get(line)?;
    let body_start = byte_col + open.len();
    let mut parts: Vec<&str> = Vec::new();
    let mut end = None;

    let head = first.get(body_start..)?;
    if let Some(rel) = head.find(close) {
        parts.push(&head[..rel]);
        end = Some((line, body_start + rel + close.len()));
    } else {
        parts.push(head);
        for (idx, text) in lines.iter().enumerate().skip(line + 1) {
            if let Some(rel) = text.find(close) {
                parts.push(&text[..rel]);
                end = Some((idx, rel + close.len()));
                break;
            }
            parts.push(text);
        }
    }

    let (end_line, end_byte) = end?;
    let last = parts.len() - 1;
    let content = parts
        .iter()
        .enumerate()
        .map(|(i, p)| strip_continuation(p, continuation, i == last))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    Some(Delimited {
        range: Range::new(
            Position::new(line, char_column(first, byte_col)),
            Position::new(end_line, char_column(&lines[end_line], end_byte)),
        ),
        start_line: line,
        end_line,
        end_byte,
        content,
    })
}

/// Drops one leading continuation marker. A line made only of markers is
/// banner residue and becomes empty; on the closing line a lone marker left
/// before the delimiter (`**/`) is dropped as well.
fn strip_continuation(part: &str, continuation: Option<char>, closing: bool) -> &str {
    let trimmed = part.trim();
    let Some(c) = continuation else {
        return trimmed;
    };
    if trimmed.chars().all(|ch| ch == c) {
        return "";
    }
    let mut text = trimmed.strip_prefix(c).map_or(trimmed, str::trim_start);
    if closing {
        if let Some(rest) = text.strip_suffix(c) {
            if rest.ends_with(char::is_whitespace) {
                text = rest.trim_end();
            }
        }
    }
    text
}

/// A comment found by [`scan_comments`].
#[derive(Debug, Clone)]
pub enum RawComment {
    Line {
        line: usize,
        /// Byte offset of the marker.
        marker_byte: usize,
        text: String,
        /// Nothing but whitespace precedes the marker.
        standalone: bool,
    },
    Block {
        block: Delimited,
        /// Opened with a doc opener (`/**`) or is a statement-level docstring.
        doc_opener: bool,
    },
}

impl RawComment {
    pub fn start_line(&self) -> usize {
        match self {
            RawComment::Line { line, .. } => *line,
            RawComment::Block { block, .. } => block.start_line,
        }
    }

    pub fn end_line(&self) -> usize {
        match self {
            RawComment::Line { line, .. } => *line,
            RawComment::Block { block, .. } => block.end_line,
        }
    }
}

/// Walks the whole document once and returns every comment outside string literals.
///
/// For triple-quote languages only statement-level triple-quoted strings are
/// reported (as `Block`); other triple-quoted strings are skipped over.
pub fn scan_comments(lines: &[String], syntax: &Syntax) -> Vec<RawComment> {
    let mut out = Vec::new();
    let mut quotes = QuoteState::default();
    let mut line = 0;
    let mut col = 0;

    while line < lines.len() {
        let text = &lines[line];
        let mut jump: Option<(usize, usize)> = None;

        for (off, ch) in text[col..].char_indices() {
            let i = col + off;
            if quotes.in_string() {
                quotes.feed(ch, syntax);
                continue;
            }
            let tail = &text[i..];

            if syntax.triple_quotes {
                if let Some(delim) = ["\"\"\"", "'''"].into_iter().find(|d| tail.starts_with(d)) {
                    let Some(found) = extract_delimited(lines, line, i, delim, delim, None) else {
                        // Unterminated string swallows the rest of the file.
                        return out;
                    };
                    if starts_statement(&text[..i]) {
                        jump = Some((found.end_line, found.end_byte));
                        out.push(RawComment::Block {
                            block: found,
                            doc_opener: true,
                        });
                    } else {
                        jump = Some((found.end_line, found.end_byte));
                    }
                    break;
                }
            }

            if let Some((open, close)) = syntax.block {
                if tail.starts_with(open) {
                    let doc_opener = tail.starts_with("/**") && !tail.starts_with("/**/");
                    let Some(found) =
                        extract_delimited(lines, line, i, open, close, syntax.continuation)
                    else {
                        return out;
                    };
                    jump = Some((found.end_line, found.end_byte));
                    out.push(RawComment::Block {
                        block: found,
                        doc_opener,
                    });
                    break;
                }
            }

            if tail.starts_with(syntax.line_marker) {
                out.push(RawComment::Line {
                    line,
                    marker_byte: i,
                    text: tail[syntax.line_marker.len()..].to_string(),
                    standalone: text[..i].trim().is_empty(),
                });
                jump = Some((line + 1, 0));
                break;
            }

            quotes.feed(ch, syntax);
        }

        match jump {
            Some((next_line, next_col)) if next_line == line => col = next_col,
            Some((next_line, next_col)) => {
                quotes.end_line();
                line = next_line;
                col = next_col;
            }
            None => {
                quotes.end_line();
                line += 1;
                col = 0;
            }
        }
    }

    out
}

/// True when only an optional string prefix (`r`, `u`, `b`...) precedes the literal.
fn starts_statement(before: &str) -> bool {
    let before = before.trim_start();
    before.len() <= 2 && before.chars().all(|c| "rRuUbB".contains(c))
}

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// First non-blank line index at or after `from`.
pub fn next_non_blank(lines: &[String], from: usize) -> Option<usize> {
    (from..lines.len()).find(|&i| !is_blank(&lines[i]))
}

/// Last non-blank line index strictly before `before`.
pub fn prev_non_blank(lines: &[String], before: usize) -> Option<usize> {
    (0..before.min(lines.len())).rev().find(|&i| !is_blank(&lines[i]))
}

/// Block for a line comment: text after the marker, positioned at the marker.
pub fn line_comment_block(
    lines: &[String],
    line: usize,
    marker_byte: usize,
    text: &str,
    kind: BlockKind,
) -> Option<TextBlock> {
    let src = &lines[line];
    let range = Range::new(
        Position::new(line, char_column(src, marker_byte)),
        Position::new(line, src.chars().count()),
    );
    TextBlock::new(text, range, kind)
}

/// Sorts blocks by position and keeps the first occurrence of each text.
pub fn dedup_blocks(mut blocks: Vec<TextBlock>) -> Vec<TextBlock> {
    blocks.sort_by_key(|b| b.range.start);
    let mut seen = HashSet::new();
    blocks.retain(|b| seen.insert(b.text.clone()));
    blocks
}
