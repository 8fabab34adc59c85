//! C-family detector for JavaScript / TypeScript: `/** */` doc blocks before
//! declarations, `/* */` plain blocks, `//` line comments.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::scan::{self, Delimited, RawComment, Syntax};
use super::{query_symbols, BlockDetector};
use crate::document::{BlockKind, Document, TextBlock};
use crate::symbols::{flatten, SymbolProvider};

const SYNTAX: Syntax = Syntax {
    line_marker: "//",
    block: Some(("/*", "*/")),
    continuation: Some('*'),
    single_quote: true,
    raw_quote: Some('`'),
    triple_quotes: false,
};

const HEADER_LOOKAHEAD: usize = 100;

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:async\s+)?(?:function\b|class\b|interface\b|type\b|enum\b|const\b|let\b|var\b|namespace\b|module\b)",
    )
    .unwrap()
});

/// Class members: modifiers, constructors, or `name(args) {` definitions.
static MEMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:(?:public|private|protected|static|readonly|async|get|set|override)\s+)+[\w$#]|constructor\s*\(|[A-Za-z_$][\w$]*\s*(?:<[^>]*>)?\([^;]*\)\s*(?::[^;{]+)?\{?\s*$)",
    )
    .unwrap()
});

pub struct CFamilyDetector {
    symbols: Arc<dyn SymbolProvider>,
}

impl CFamilyDetector {
    pub fn new(symbols: Arc<dyn SymbolProvider>) -> Self {
        Self { symbols }
    }
}

impl BlockDetector for CFamilyDetector {
    fn name(&self) -> &'static str {
        "c-family"
    }

    fn collect_blocks(&self, document: &Document) -> Vec<TextBlock> {
        let lines = document.lines();
        let comments = scan::scan_comments(lines, &SYNTAX);
        let block_comments: Vec<(&Delimited, bool)> = comments
            .iter()
            .filter_map(|c| match c {
                RawComment::Block { block, doc_opener } => Some((block, *doc_opener)),
                RawComment::Line { .. } => None,
            })
            .collect();

        let mut docs = HashSet::new();
        if let Some(idx) = file_header(lines, &block_comments) {
            docs.insert(idx);
        }

        let before = docs.len();
        let symbols = query_symbols(self.symbols.as_ref(), document);
        for symbol in flatten(&symbols) {
            if !symbol.kind.is_documentable() {
                continue;
            }
            if let Some(idx) = block_before(lines, symbol.range.start.line, &block_comments) {
                docs.insert(idx);
            }
        }

        if docs.len() == before {
            for (idx, (block, doc_opener)) in block_comments.iter().enumerate() {
                if *doc_opener && precedes_declaration(lines, block) {
                    docs.insert(idx);
                }
            }
        }

        let mut blocks = Vec::new();
        for (idx, (block, _)) in block_comments.iter().enumerate() {
            let kind = if docs.contains(&idx) {
                BlockKind::DocComment
            } else {
                BlockKind::InlineComment
            };
            blocks.extend(TextBlock::new(&block.content, block.range, kind));
        }
        for comment in &comments {
            if let RawComment::Line { line, marker_byte, text, .. } = comment {
                blocks.extend(scan::line_comment_block(
                    lines,
                    *line,
                    *marker_byte,
                    text,
                    BlockKind::InlineComment,
                ));
            }
        }
        blocks
    }
}

/// Leading block comment reached before any code.
fn file_header(lines: &[String], blocks: &[(&Delimited, bool)]) -> Option<usize> {
    for (i, line) in lines.iter().enumerate().take(HEADER_LOOKAHEAD) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") || (i == 0 && trimmed.starts_with("#!")) {
            continue;
        }
        return blocks.iter().position(|(b, _)| b.start_line == i);
    }
    None
}

/// Block comment ending right above `line`, allowing blank and decorator lines between.
fn block_before(lines: &[String], line: usize, blocks: &[(&Delimited, bool)]) -> Option<usize> {
    let mut cursor = line;
    while cursor > 0 {
        cursor -= 1;
        let trimmed = lines[cursor].trim();
        if trimmed.is_empty() || trimmed.starts_with('@') {
            continue;
        }
        return blocks.iter().position(|(b, _)| b.end_line == cursor);
    }
    None
}

/// Text-only check: the code after the block looks like a declaration.
fn precedes_declaration(lines: &[String], block: &Delimited) -> bool {
    let rest = lines[block.end_line][block.end_byte..].trim();
    let next = if rest.is_empty() {
        let mut from = block.end_line + 1;
        loop {
            let Some(i) = scan::next_non_blank(lines, from) else {
                return false;
            };
            if lines[i].trim_start().starts_with('@') {
                from = i + 1;
                continue;
            }
            break lines[i].trim();
        }
    } else {
        rest
    };
    DECLARATION.is_match(next) || MEMBER.is_match(next)
}
