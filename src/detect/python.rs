//! Python-like detector: `"""` / `'''` docstrings after headers, `#` comments.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::scan::{self, Delimited, RawComment, Syntax};
use super::{query_symbols, BlockDetector};
use crate::document::{BlockKind, Document, TextBlock};
use crate::symbols::{flatten, DocumentSymbol, SymbolKind, SymbolProvider};

const SYNTAX: Syntax = Syntax {
    line_marker: "#",
    block: None,
    continuation: None,
    single_quote: true,
    raw_quote: None,
    triple_quotes: true,
};

/// Module docstring must appear within this many leading lines.
const MODULE_DOC_LOOKAHEAD: usize = 50;
/// How far a multi-line signature may run before its closing `:`.
const MAX_HEADER_LINES: usize = 20;

static DEFINITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:async\s+def|def|class)\b").unwrap());

pub struct PythonDetector {
    symbols: Arc<dyn SymbolProvider>,
}

impl PythonDetector {
    pub fn new(symbols: Arc<dyn SymbolProvider>) -> Self {
        Self { symbols }
    }
}

impl BlockDetector for PythonDetector {
    fn name(&self) -> &'static str {
        "python"
    }

    fn collect_blocks(&self, document: &Document) -> Vec<TextBlock> {
        let lines = document.lines();
        let comments = scan::scan_comments(lines, &SYNTAX);
        let docstrings: Vec<&Delimited> = comments
            .iter()
            .filter_map(|c| match c {
                RawComment::Block { block, .. } => Some(block),
                RawComment::Line { .. } => None,
            })
            .collect();

        let mut used = HashSet::new();
        let mut blocks = Vec::new();
        let push_doc = |idx: usize, used: &mut HashSet<usize>, blocks: &mut Vec<TextBlock>| {
            if used.insert(idx) {
                let d = docstrings[idx];
                blocks.extend(TextBlock::new(&d.content, d.range, BlockKind::DocComment));
            }
        };

        if let Some(idx) = module_docstring(lines, &docstrings) {
            push_doc(idx, &mut used, &mut blocks);
        }

        let before = used.len();
        let symbols = query_symbols(self.symbols.as_ref(), document);
        for symbol in flatten(&symbols) {
            if !matches!(
                symbol.kind,
                SymbolKind::Class | SymbolKind::Function | SymbolKind::Method | SymbolKind::Constructor
            ) {
                continue;
            }
            if let Some(idx) = docstring_after_header(lines, symbol, &docstrings) {
                push_doc(idx, &mut used, &mut blocks);
            }
        }

        if used.len() == before {
            for (idx, d) in docstrings.iter().enumerate() {
                if !used.contains(&idx) && follows_definition(lines, d.start_line) {
                    push_doc(idx, &mut used, &mut blocks);
                }
            }
        }

        for comment in &comments {
            if let RawComment::Line { line, marker_byte, text, .. } = comment {
                if *line == 0 && text.starts_with('!') {
                    continue;
                }
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

/// Index of the docstring that is the module's first statement.
fn module_docstring(lines: &[String], docstrings: &[&Delimited]) -> Option<usize> {
    for (i, line) in lines.iter().enumerate().take(MODULE_DOC_LOOKAHEAD) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        return docstrings.iter().position(|d| d.start_line == i);
    }
    None
}

/// Docstring directly below the symbol's header (the line ending in `:`).
fn docstring_after_header(
    lines: &[String],
    symbol: &DocumentSymbol,
    docstrings: &[&Delimited],
) -> Option<usize> {
    let first = symbol.selection_range.start.line;
    let last = symbol.range.end.line.min(first + MAX_HEADER_LINES);
    let header_end = (first..=last).find(|&i| {
        lines
            .get(i)
            .is_some_and(|l| l.trim_end().ends_with(':'))
    })?;
    let body = scan::next_non_blank(lines, header_end + 1)?;
    if body > symbol.range.end.line {
        return None;
    }
    docstrings.iter().position(|d| d.start_line == body)
}

/// Text-only check: the docstring sits right after a `def` / `class` header.
fn follows_definition(lines: &[String], docstring_line: usize) -> bool {
    let Some(header_end) = scan::prev_non_blank(lines, docstring_line) else {
        return false;
    };
    if !lines[header_end].trim_end().ends_with(':') {
        return false;
    }
    (header_end.saturating_sub(MAX_HEADER_LINES)..=header_end)
        .rev()
        .take_while(|&i| !scan::is_blank(&lines[i]))
        .any(|i| DEFINITION.is_match(lines[i].trim_start()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Position, Range};
    use crate::symbols::{NoSymbols, SymbolError};

    const SAMPLE: &str = r#""""
Sample module
"""

import os


def run(path):
    """Does X"""
    return os.path.exists(path)  # note
"#;

    fn kinds(blocks: &[TextBlock]) -> Vec<(&str, BlockKind)> {
        blocks.iter().map(|b| (b.text.as_str(), b.kind)).collect()
    }

    #[test]
    fn module_function_and_inline() {
        let doc = Document::new("file:///s.py", "python", SAMPLE);
        let blocks = PythonDetector::new(Arc::new(NoSymbols)).extract_all_blocks(&doc);
        assert_eq!(
            kinds(&blocks),
            vec![
                ("Sample module", BlockKind::DocComment),
                ("Does X", BlockKind::DocComment),
                ("note", BlockKind::InlineComment),
            ]
        );
    }

    #[test]
    fn extraction_is_idempotent() {
        let doc = Document::new("file:///s.py", "python", SAMPLE);
        let detector = PythonDetector::new(Arc::new(NoSymbols));
        let first = detector.extract_all_blocks(&doc);
        let second = detector.extract_all_blocks(&doc);
        assert_eq!(kinds(&first), kinds(&second));
    }

    #[test]
    fn repeated_comment_yields_one_block() {
        let src = "x = 1  # same note\ny = 2\nz = 3  # same note\n";
        let doc = Document::new("file:///d.py", "python", src);
        let blocks = PythonDetector::new(Arc::new(NoSymbols)).extract_all_blocks(&doc);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].range.start.line, 0);
    }

    #[test]
    fn stray_string_statement_is_not_doc_in_fallback() {
        let src = "import os\n\nx = 1\n\"\"\"Just a string.\"\"\"\n";
        let doc = Document::new("file:///d.py", "python", src);
        let blocks = PythonDetector::new(Arc::new(NoSymbols)).extract_all_blocks(&doc);
        assert!(blocks.is_empty());
    }

    #[test]
    fn multi_line_signature_in_fallback() {
        let src = "def f(\n    a,\n    b,\n):\n    '''Adds things.'''\n    return a + b\n";
        let doc = Document::new("file:///d.py", "python", src);
        let blocks = PythonDetector::new(Arc::new(NoSymbols)).extract_all_blocks(&doc);
        assert_eq!(kinds(&blocks), vec![("Adds things.", BlockKind::DocComment)]);
    }

    struct FixedSymbols(Vec<DocumentSymbol>);

    impl SymbolProvider for FixedSymbols {
        fn document_symbols(&self, _: &Document) -> Result<Vec<DocumentSymbol>, SymbolError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenSymbols;

    impl SymbolProvider for BrokenSymbols {
        fn document_symbols(&self, _: &Document) -> Result<Vec<DocumentSymbol>, SymbolError> {
            Err(SymbolError::Unavailable("server not started".into()))
        }
    }

    #[test]
    fn symbol_docstrings_suppress_fallback() {
        // `helper` is not in the symbol tree, so with symbols present its
        // docstring is not picked up by the text scan.
        let src = "def run():\n    \"\"\"Runs.\"\"\"\n\ndef helper():\n    \"\"\"Helps.\"\"\"\n";
        let doc = Document::new("file:///d.py", "python", src);
        let run = DocumentSymbol {
            name: "run".into(),
            kind: SymbolKind::Function,
            range: Range::new(Position::new(0, 0), Position::new(1, 15)),
            selection_range: Range::new(Position::new(0, 4), Position::new(0, 7)),
            children: Vec::new(),
        };
        let detector = PythonDetector::new(Arc::new(FixedSymbols(vec![run])));
        let blocks = detector.extract_all_blocks(&doc);
        assert_eq!(kinds(&blocks), vec![("Runs.", BlockKind::DocComment)]);
    }

    #[test]
    fn failing_symbol_provider_degrades_to_scan() {
        let doc = Document::new("file:///s.py", "python", SAMPLE);
        let blocks = PythonDetector::new(Arc::new(BrokenSymbols)).extract_all_blocks(&doc);
        assert_eq!(blocks.len(), 3);
    }

    #[test]
    fn reference_sample_blocks() {
        let src = r#"class FileManager:
    '''Utility class for file operations'''

    @staticmethod
    def read_file(path: str):
        """
        Read the contents of a text file.
        """
        try:
            return open(path).read()
        except Exception as e:
            print(f"Error reading file: {e}")  # Log the error
            return None
"#;
        let doc = Document::new("file:///s.py", "python", src);
        let blocks = PythonDetector::new(Arc::new(NoSymbols)).extract_all_blocks(&doc);
        assert_eq!(
            kinds(&blocks),
            vec![
                ("Utility class for file operations", BlockKind::DocComment),
                ("Read the contents of a text file.", BlockKind::DocComment),
                ("Log the error", BlockKind::InlineComment),
            ]
        );
    }
}
