//! Go detector: godoc is a run of `//` lines (or a `/* */` block) directly
//! above `package` or a declaration; everything else is an inline comment.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::scan::{self, RawComment, Syntax};
use super::{query_symbols, BlockDetector};
use crate::document::{BlockKind, Document, Position, Range, TextBlock};
use crate::symbols::{flatten, SymbolProvider};

const SYNTAX: Syntax = Syntax {
    line_marker: "//",
    block: Some(("/*", "*/")),
    continuation: Some('*'),
    single_quote: true,
    raw_quote: Some('`'),
    triple_quotes: false,
};

const PACKAGE_LOOKAHEAD: usize = 100;

static DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:func|type|var|const|package)\b").unwrap());

/// Tool directives are not prose.
fn is_directive(text: &str) -> bool {
    text.starts_with("go:")
        || text.starts_with("nolint")
        || text.starts_with("line ")
        || text.trim_start().starts_with("+build")
}

/// First line after `end_line` that is not a tool directive.
fn attached_line(lines: &[String], end_line: usize) -> usize {
    (end_line + 1..lines.len())
        .find(|&i| {
            !lines[i]
                .trim_start()
                .strip_prefix("//")
                .is_some_and(is_directive)
        })
        .unwrap_or(lines.len())
}

/// A candidate doc comment: a run of standalone `//` lines or one block comment.
struct Candidate {
    start_line: usize,
    end_line: usize,
    /// Indices into the raw comment list.
    members: Vec<usize>,
    range: Range,
    text: String,
}

pub struct GoDetector {
    symbols: Arc<dyn SymbolProvider>,
}

impl GoDetector {
    pub fn new(symbols: Arc<dyn SymbolProvider>) -> Self {
        Self { symbols }
    }
}

impl BlockDetector for GoDetector {
    fn name(&self) -> &'static str {
        "go"
    }

    fn collect_blocks(&self, document: &Document) -> Vec<TextBlock> {
        let lines = document.lines();
        let comments: Vec<RawComment> = scan::scan_comments(lines, &SYNTAX)
            .into_iter()
            .filter(|c| !matches!(c, RawComment::Line { text, .. } if is_directive(text)))
            .collect();
        let candidates = group_candidates(lines, &comments);

        let mut docs = HashSet::new();
        if let Some(idx) = package_doc(lines, &candidates) {
            docs.insert(idx);
        }

        let before = docs.len();
        let symbols = query_symbols(self.symbols.as_ref(), document);
        for symbol in flatten(&symbols) {
            if !symbol.kind.is_documentable() {
                continue;
            }
            let line = symbol.range.start.line;
            if let Some(idx) = candidates.iter().position(|c| attached_line(lines, c.end_line) == line) {
                docs.insert(idx);
            }
        }

        if docs.len() == before {
            for (idx, c) in candidates.iter().enumerate() {
                let next = lines
                    .get(attached_line(lines, c.end_line))
                    .map(|l| l.trim())
                    .unwrap_or("");
                if DECLARATION.is_match(next) {
                    docs.insert(idx);
                }
            }
        }

        let mut consumed = HashSet::new();
        let mut blocks = Vec::new();
        for idx in &docs {
            let c = &candidates[*idx];
            consumed.extend(c.members.iter().copied());
            blocks.extend(TextBlock::new(&c.text, c.range, BlockKind::DocComment));
        }

        for (i, comment) in comments.iter().enumerate() {
            if consumed.contains(&i) {
                continue;
            }
            match comment {
                RawComment::Line { line, marker_byte, text, .. } => blocks.extend(
                    scan::line_comment_block(lines, *line, *marker_byte, text, BlockKind::InlineComment),
                ),
                RawComment::Block { block, .. } => {
                    blocks.extend(TextBlock::new(&block.content, block.range, BlockKind::InlineComment))
                }
            }
        }
        blocks
    }
}

/// Groups adjacent standalone line comments into runs; each block comment
/// that starts its own line is a candidate by itself.
fn group_candidates(lines: &[String], comments: &[RawComment]) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = Vec::new();
    let mut run: Vec<(usize, usize, usize, String)> = Vec::new();

    let flush = |run: &mut Vec<(usize, usize, usize, String)>, out: &mut Vec<Candidate>| {
        let (Some(first), Some(last)) = (run.first(), run.last()) else {
            return;
        };
        let start = Position::new(first.1, crate::document::char_column(&lines[first.1], first.2));
        let end = Position::new(last.1, lines[last.1].chars().count());
        out.push(Candidate {
            start_line: first.1,
            end_line: last.1,
            members: run.iter().map(|r| r.0).collect(),
            range: Range::new(start, end),
            text: run.iter().map(|r| r.3.trim()).collect::<Vec<_>>().join("\n"),
        });
        run.clear();
    };

    for (i, comment) in comments.iter().enumerate() {
        match comment {
            RawComment::Line {
                line,
                marker_byte,
                text,
                standalone: true,
            } => {
                if run.last().is_some_and(|r| r.1 + 1 != *line) {
                    flush(&mut run, &mut out);
                }
                run.push((i, *line, *marker_byte, text.clone()));
            }
            RawComment::Block { block, .. } if lines[block.start_line].trim_start().starts_with("/*") => {
                flush(&mut run, &mut out);
                out.push(Candidate {
                    start_line: block.start_line,
                    end_line: block.end_line,
                    members: vec![i],
                    range: block.range,
                    text: block.content.clone(),
                });
            }
            _ => flush(&mut run, &mut out),
        }
    }
    flush(&mut run, &mut out);
    out
}

/// Candidate directly above the `package` clause.
fn package_doc(lines: &[String], candidates: &[Candidate]) -> Option<usize> {
    let package_line = lines
        .iter()
        .take(PACKAGE_LOOKAHEAD)
        .position(|l| l.trim_start().starts_with("package "))?;
    candidates
        .iter()
        .position(|c| attached_line(lines, c.end_line) == package_line && c.start_line < package_line)
}
