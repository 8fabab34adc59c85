//! Symbol-tree interface consumed by detectors (typically backed by a language server).

use thiserror::Error;

use crate::document::{Document, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Module,
    Namespace,
    Class,
    Interface,
    Struct,
    Enum,
    Function,
    Method,
    Constructor,
    Property,
    Field,
    Variable,
    Constant,
    TypeParameter,
    Other,
}

impl SymbolKind {
    /// Kinds that conventionally carry documentation.
    pub fn is_documentable(self) -> bool {
        !matches!(self, SymbolKind::TypeParameter | SymbolKind::Other)
    }
}

/// One node of a document's symbol tree.
#[derive(Debug, Clone)]
pub struct DocumentSymbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Full extent of the declaration including its body.
    pub range: Range,
    /// Signature / name span.
    pub selection_range: Range,
    pub children: Vec<DocumentSymbol>,
}

impl DocumentSymbol {
    /// Depth-first walk over this symbol and its descendants.
    pub fn walk<'a>(&'a self, out: &mut Vec<&'a DocumentSymbol>) {
        out.push(self);
        for child in &self.children {
            child.walk(out);
        }
    }
}

/// Flattens a forest into depth-first order.
pub fn flatten(symbols: &[DocumentSymbol]) -> Vec<&DocumentSymbol> {
    let mut out = Vec::new();
    for symbol in symbols {
        symbol.walk(&mut out);
    }
    out
}

#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("symbol provider unavailable: {0}")]
    Unavailable(String),
    #[error("symbol query failed: {0}")]
    Query(String),
}

pub trait SymbolProvider: Send + Sync {
    fn document_symbols(&self, document: &Document) -> Result<Vec<DocumentSymbol>, SymbolError>;
}

/// Provider for hosts without a language server; detectors fall back to text scanning.
pub struct NoSymbols;

impl SymbolProvider for NoSymbols {
    fn document_symbols(&self, _document: &Document) -> Result<Vec<DocumentSymbol>, SymbolError> {
        Ok(Vec::new())
    }
}
