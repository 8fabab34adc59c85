//! Markdown detector: one block per prose line (headings, quotes, list items,
//! paragraphs). Code fences, HTML comments, rules, bare images and tables are skipped.

use std::sync::LazyLock;

use regex::Regex;

use super::BlockDetector;
use crate::document::{char_column, BlockKind, Document, Position, Range, TextBlock};

static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s{0,3}#{1,6}\s+").unwrap());
static CLOSING_HASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:^|\s+)#+\s*$").unwrap());
static QUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(?:>\s?)+").unwrap());
static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+(?:\[[ xX]\]\s+)?").unwrap());
static RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:(?:\*\s*){3,}|(?:-\s*){3,}|(?:_\s*){3,})$").unwrap());
static BARE_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*!\[[^\]]*\]\([^)]*\)\s*$").unwrap());

#[derive(Default)]
pub struct MarkdownDetector;

impl MarkdownDetector {
    pub fn new() -> Self {
        Self
    }
}

impl BlockDetector for MarkdownDetector {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn collect_blocks(&self, document: &Document) -> Vec<TextBlock> {
        let mut blocks = Vec::new();
        let mut in_fence = false;
        let mut in_html_comment = false;

        for (i, line) in document.lines().iter().enumerate() {
            let trimmed = line.trim();

            if in_html_comment {
                if trimmed.contains("-->") {
                    in_html_comment = false;
                }
                continue;
            }
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }
            if trimmed.starts_with("<!--") {
                in_html_comment = !trimmed.contains("-->");
                continue;
            }
            if trimmed.is_empty() || RULE.is_match(line) || BARE_IMAGE.is_match(line) {
                continue;
            }
            // Tables are detected but left alone: translating cells breaks alignment.
            if trimmed.starts_with('|') {
                continue;
            }

            let content_start = content_offset(line);
            let content = &line[content_start..];
            // Only a whitespace-separated closing sequence belongs to the heading syntax.
            let content = if HEADING.is_match(line) {
                CLOSING_HASHES.replace(content, "")
            } else {
                content.into()
            };
            let range = Range::new(
                Position::new(i, char_column(line, content_start)),
                Position::new(i, line.chars().count()),
            );
            blocks.extend(TextBlock::new(&content, range, BlockKind::DocComment));
        }
        blocks
    }
}

/// Byte offset where translatable content begins, past heading, quote and list markers.
fn content_offset(line: &str) -> usize {
    if let Some(m) = HEADING.find(line) {
        return m.end();
    }
    let mut offset = 0;
    if let Some(m) = QUOTE.find(line) {
        offset = m.end();
    }
    if let Some(m) = LIST_ITEM.find(&line[offset..]) {
        offset += m.end();
    }
    if offset == 0 {
        offset = line.len() - line.trim_start().len();
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Title #\n\nIntro paragraph.\n\n```rust\n// code\n```\n\n<!--\nhidden\n-->\n---\n![logo](logo.png)\n\n> Quoted text\n  - nested item\n1. [x] done task\n| a | b |\n";

    #[test]
    fn structural_blocks() {
        let doc = Document::new("file:///README.md", "markdown", SAMPLE);
        let blocks = MarkdownDetector::new().extract_all_blocks(&doc);
        let texts: Vec<&str> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, ["Title", "Intro paragraph.", "Quoted text", "nested item", "done task"]);
        assert!(blocks.iter().all(|b| b.kind == BlockKind::DocComment));
    }

    #[test]
    fn prefix_offsets_are_preserved() {
        let doc = Document::new("file:///README.md", "markdown", SAMPLE);
        let blocks = MarkdownDetector::new().extract_all_blocks(&doc);
        let nested = blocks.iter().find(|b| b.text == "nested item").unwrap();
        assert_eq!(nested.range.start, Position::new(15, 4));
        let quoted = blocks.iter().find(|b| b.text == "Quoted text").unwrap();
        assert_eq!(quoted.range.start.character, 2);
        let task = blocks.iter().find(|b| b.text == "done task").unwrap();
        assert_eq!(task.range.start.character, 7);
    }

    #[test]
    fn heading_keeps_attached_hashes() {
        let doc = Document::new("file:///a.md", "markdown", "## Learn C#\n### Closed ###  \n## F# and C# ##\n");
        let blocks = MarkdownDetector::new().extract_all_blocks(&doc);
        let texts: Vec<&str> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, ["Learn C#", "Closed", "F# and C#"]);
    }

    #[test]
    fn fence_marker_inside_html_comment_is_ignored() {
        let src = "<!--
```
-->
After comment
```
not prose
```
Tail
";
        let doc = Document::new("file:///a.md", "markdown", src);
        let blocks = MarkdownDetector::new().extract_all_blocks(&doc);
        let texts: Vec<&str> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, ["After comment", "Tail"]);
    }

    #[test]
    fn single_line_html_comment_does_not_open_state() {
        let doc = Document::new("file:///a.md", "markdown", "<!-- note -->\nVisible\n");
        let blocks = MarkdownDetector::new().extract_all_blocks(&doc);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "Visible");
    }
}
