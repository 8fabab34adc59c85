//! Block detection: one `BlockDetector` per source-language family plus the
//! registry that maps editor language ids onto them.

pub mod cfamily;
pub mod golang;
pub mod markdown;
pub mod python;
pub mod scan;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::document::{BlockKind, Document, Position, TextBlock};
use crate::symbols::{DocumentSymbol, SymbolProvider};

pub use cfamily::CFamilyDetector;
pub use golang::GoDetector;
pub use markdown::MarkdownDetector;
pub use python::PythonDetector;

/// Extracts translatable blocks from a document.
pub trait BlockDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every block in the document, repeats included.
    fn collect_blocks(&self, document: &Document) -> Vec<TextBlock>;

    /// Full block set for the document, deduplicated by text (first location wins).
    fn extract_all_blocks(&self, document: &Document) -> Vec<TextBlock> {
        let blocks = scan::dedup_blocks(self.collect_blocks(document));
        debug!(detector = self.name(), uri = %document.uri(), count = blocks.len(), "blocks extracted");
        blocks
    }

    /// Smallest doc comment enclosing `position`, if any.
    fn extract_block_at(&self, document: &Document, position: Position) -> Option<TextBlock> {
        self.collect_blocks(document)
            .into_iter()
            .filter(|b| b.kind == BlockKind::DocComment && b.range.contains(position))
            .min_by_key(|b| b.range.extent())
    }
}

/// Queries the symbol provider, degrading to an empty tree on error.
pub(crate) fn query_symbols(provider: &dyn SymbolProvider, document: &Document) -> Vec<DocumentSymbol> {
    match provider.document_symbols(document) {
        Ok(symbols) => symbols,
        Err(e) => {
            warn!(uri = %document.uri(), error = %e, "symbol query failed, using text scan");
            Vec::new()
        }
    }
}

/// Maps language ids to detector instances. Built once at startup.
#[derive(Default)]
pub struct DetectorRegistry {
    detectors: HashMap<String, Arc<dyn BlockDetector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the built-in detectors for every language id in `supported`.
    /// Unknown ids are logged and skipped.
    pub fn with_defaults(symbols: Arc<dyn SymbolProvider>, supported: &[String]) -> Self {
        let python: Arc<dyn BlockDetector> = Arc::new(PythonDetector::new(Arc::clone(&symbols)));
        let cfamily: Arc<dyn BlockDetector> = Arc::new(CFamilyDetector::new(Arc::clone(&symbols)));
        let go: Arc<dyn BlockDetector> = Arc::new(GoDetector::new(symbols));
        let markdown: Arc<dyn BlockDetector> = Arc::new(MarkdownDetector::new());

        let mut registry = Self::new();
        for language_id in supported {
            let detector = match language_id.as_str() {
                "python" => &python,
                "javascript" | "javascriptreact" | "typescript" | "typescriptreact" => &cfamily,
                "go" => &go,
                "markdown" => &markdown,
                other => {
                    warn!(language_id = other, "no detector for configured language");
                    continue;
                }
            };
            registry.register(language_id.clone(), Arc::clone(detector));
        }
        registry
    }

    pub fn register(&mut self, language_id: impl Into<String>, detector: Arc<dyn BlockDetector>) {
        self.detectors.insert(language_id.into(), detector);
    }

    pub fn get(&self, language_id: &str) -> Option<Arc<dyn BlockDetector>> {
        self.detectors.get(language_id).cloned()
    }

    pub fn supports(&self, language_id: &str) -> bool {
        self.detectors.contains_key(language_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::NoSymbols;

    #[test]
    fn registry_gates_on_supported_languages() {
        let supported = vec!["python".to_string(), "typescript".to_string(), "cobol".to_string()];
        let registry = DetectorRegistry::with_defaults(Arc::new(NoSymbols), &supported);
        assert!(registry.supports("python"));
        assert!(registry.supports("typescript"));
        assert!(!registry.supports("javascript"));
        assert!(!registry.supports("cobol"));
    }

    #[test]
    fn aliases_share_one_instance() {
        let supported = vec!["javascript".to_string(), "typescript".to_string()];
        let registry = DetectorRegistry::with_defaults(Arc::new(NoSymbols), &supported);
        let js = registry.get("javascript").unwrap();
        let ts = registry.get("typescript").unwrap();
        assert!(Arc::ptr_eq(&js, &ts));
    }

    #[test]
    fn block_at_picks_smallest_doc_comment() {
        let src = "\"\"\"Module doc.\"\"\"\n\nclass A:\n    \"\"\"Class doc.\n\n    More.\n    \"\"\"\n    x = 1  # field\n";
        let doc = Document::new("file:///a.py", "python", src);
        let detector = PythonDetector::new(Arc::new(NoSymbols));
        let block = detector.extract_block_at(&doc, Position::new(4, 0)).unwrap();
        assert_eq!(block.text, "Class doc.\n\nMore.");
        assert!(detector.extract_block_at(&doc, Position::new(7, 10)).is_none());
    }
}
