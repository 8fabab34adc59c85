//! doc-translate: incremental translation of doc comments and inline comments.
//! Main library: module wiring and the command-line host.

pub mod cache;
pub mod config;
pub mod detect;
pub mod document;
pub mod orchestrator;
pub mod provider;
pub mod scheduler;
pub mod symbols;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use thiserror::Error;
use tracing::{info, warn};

use cache::{KeyValueStore, MemoryStore, SqliteStore, TranslationCache};
use config::{Config, ConfigError};
use detect::DetectorRegistry;
use document::Document;
use orchestrator::{Orchestrator, PassOutcome, PassSummary, RecordingSink};
use provider::ProviderRegistry;
use symbols::NoSymbols;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("usage: doc-translate [--config PATH] FILE...")]
    Usage,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cache(#[from] cache::CacheError),
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

struct Args {
    config: Option<PathBuf>,
    files: Vec<PathBuf>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, RunError> {
    let mut config = None;
    let mut files = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => config = Some(PathBuf::from(args.next().ok_or(RunError::Usage)?)),
            "--help" | "-h" => return Err(RunError::Usage),
            _ => files.push(PathBuf::from(arg)),
        }
    }
    if files.is_empty() {
        return Err(RunError::Usage);
    }
    Ok(Args { config, files })
}

/// Editor language id for a file extension.
pub fn language_id_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "py" | "pyi" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "javascriptreact",
        "ts" | "mts" | "cts" => "typescript",
        "tsx" => "typescriptreact",
        "go" => "go",
        "md" | "markdown" => "markdown",
        _ => "plaintext",
    }
}

/// Cache store at the configured path; falls back to memory if it cannot be opened.
fn open_store(path: &Path) -> Arc<dyn KeyValueStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(path = %parent.display(), error = %e, "cannot create cache directory");
        }
    }
    match SqliteStore::open(path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cache store unavailable, translations will not persist");
            Arc::new(MemoryStore::new())
        }
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("doc_translate=info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Translate every file named on the command line and print the overlays.
/// Files whose pass partly failed get one retry of the failed blocks; files
/// that failed outright get one whole-file retry.
pub async fn run(args: impl IntoIterator<Item = String>) -> Result<(), RunError> {
    let args = parse_args(args)?;
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    info!(provider = %config.provider, target = %config.target_language, "doc-translate starting");

    let store = open_store(&config.cache_path);
    let cache = TranslationCache::open(store, config.cache_namespace.clone())?;
    let detectors = DetectorRegistry::with_defaults(Arc::new(NoSymbols), &config.supported_languages);
    let sink = Arc::new(RecordingSink::new());
    let orchestrator = Orchestrator::new(
        Arc::new(detectors),
        Arc::new(ProviderRegistry::with_defaults()),
        Arc::clone(&cache),
        sink.clone(),
        config,
    );

    let mut documents = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let text = std::fs::read_to_string(path).map_err(|source| RunError::Read {
            path: path.clone(),
            source,
        })?;
        let uri = format!("file://{}", path.display());
        documents.push(Arc::new(Document::new(uri, language_id_for(path), text)));
    }

    let passes = documents.iter().map(|doc| {
        let orchestrator = Arc::clone(&orchestrator);
        let doc = Arc::clone(doc);
        async move {
            let summary = orchestrator.translate_document(Arc::clone(&doc)).await;
            match summary.outcome {
                PassOutcome::PartialFailure => orchestrator.retry_failed(doc.uri()).await,
                PassOutcome::FileFailed => orchestrator.retry_document(doc).await,
                _ => summary,
            }
        }
    });
    let summaries: Vec<PassSummary> = join_all(passes).await;
    cache.flush().await;

    for summary in &summaries {
        info!(
            uri = %summary.uri,
            outcome = ?summary.outcome,
            total = summary.total,
            cached = summary.cached,
            translated = summary.translated,
            failed = summary.failed,
            "file done"
        );
        let Some(mut blocks) = sink.latest(&summary.uri) else {
            continue;
        };
        blocks.sort_by_key(|b| b.block.range.start);
        println!("{}", summary.uri);
        for b in blocks {
            let line = b.block.range.start.line + 1;
            println!("  {line}: {}", b.translation.replace('\n', "\n      "));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_config_flag_and_files() {
        let args = parse_args(strings(&["--config", "c.json", "a.py", "b.go"])).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("c.json")));
        assert_eq!(args.files.len(), 2);
        assert!(matches!(parse_args(strings(&[])), Err(RunError::Usage)));
        assert!(matches!(parse_args(strings(&["--config"])), Err(RunError::Usage)));
    }

    #[test]
    fn language_ids_from_extensions() {
        assert_eq!(language_id_for(Path::new("src/app.tsx")), "typescriptreact");
        assert_eq!(language_id_for(Path::new("main.go")), "go");
        assert_eq!(language_id_for(Path::new("README.md")), "markdown");
        assert_eq!(language_id_for(Path::new("Makefile")), "plaintext");
    }
}
