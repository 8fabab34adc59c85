//! Per-file translation passes: extract blocks, serve cache hits, translate
//! misses in bounded waves, display progressively, remember failures.
//!
//! At most one pass runs per file. A request for a file whose pass is still
//! running waits for that pass and receives the same summary.

pub mod sink;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cache::TranslationCache;
use crate::config::Config;
use crate::detect::DetectorRegistry;
use crate::document::{Document, Position, TextBlock};
use crate::provider::{ProviderError, ProviderRegistry, TranslationProvider};
use crate::scheduler::{plan_batches, run_in_waves};

pub use sink::{DisplaySink, Notice, RecordingSink, RetryAction, TranslatedBlock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// No detector for the document's language.
    Unsupported,
    /// The detector found nothing to translate.
    NoBlocks,
    /// Same content and target language as the last clean pass.
    Unchanged,
    Complete,
    PartialFailure,
    /// Nothing could be translated (provider unavailable).
    FileFailed,
    /// `retry_failed` found no stored failures.
    NothingToRetry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub uri: String,
    pub outcome: PassOutcome,
    pub total: usize,
    pub cached: usize,
    pub translated: usize,
    pub failed: usize,
}

impl PassSummary {
    fn empty(uri: &str, outcome: PassOutcome) -> Self {
        Self {
            uri: uri.to_string(),
            outcome,
            total: 0,
            cached: 0,
            translated: 0,
            failed: 0,
        }
    }
}

/// What the last pass left behind for a file.
struct FileState {
    fingerprint: String,
    target_lang: String,
    shown: Vec<TranslatedBlock>,
    failed: Vec<TextBlock>,
}

type PassFuture = Shared<BoxFuture<'static, PassSummary>>;
type JobResult = Vec<(TextBlock, Result<String, ProviderError>)>;

pub struct Orchestrator {
    detectors: Arc<DetectorRegistry>,
    providers: Arc<ProviderRegistry>,
    cache: Arc<TranslationCache>,
    sink: Arc<dyn DisplaySink>,
    config: RwLock<Arc<Config>>,
    in_flight: Mutex<HashMap<String, (u64, PassFuture)>>,
    files: Mutex<HashMap<String, FileState>>,
    next_pass: AtomicU64,
}

/// Content fingerprint used as the per-file done marker.
fn fingerprint(document: &Document, target_lang: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(document.language_id().as_bytes());
    hasher.update(b"|");
    hasher.update(target_lang.as_bytes());
    hasher.update(b"|");
    hasher.update(document.text().as_bytes());
    hasher.finalize().to_hex().to_string()
}

impl Orchestrator {
    pub fn new(
        detectors: Arc<DetectorRegistry>,
        providers: Arc<ProviderRegistry>,
        cache: Arc<TranslationCache>,
        sink: Arc<dyn DisplaySink>,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            detectors,
            providers,
            cache,
            sink,
            config: RwLock::new(Arc::new(config)),
            in_flight: Mutex::new(HashMap::new()),
            files: Mutex::new(HashMap::new()),
            next_pass: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config.read())
    }

    /// Swap in new settings. The provider is rebuilt on next use.
    pub fn update_config(&self, config: Config) {
        info!(provider = %config.provider, target = %config.target_language, "configuration updated");
        *self.config.write() = Arc::new(config);
        self.providers.reset();
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    /// Number of blocks waiting for `retry_failed`.
    pub fn pending_failures(&self, uri: &str) -> usize {
        self.files.lock().get(uri).map_or(0, |s| s.failed.len())
    }

    /// Forget the done marker and any pending failures for `uri`.
    pub fn clear_file_state(&self, uri: &str) {
        if self.files.lock().remove(uri).is_some() {
            debug!(uri, "file state cleared");
        }
    }

    /// Forget every file and empty the translation cache.
    pub fn clear_all(&self) {
        self.files.lock().clear();
        self.cache.clear();
    }

    /// Doc block under `position`, for hover-style hosts.
    pub fn block_at(&self, document: &Document, position: Position) -> Option<TextBlock> {
        self.detectors
            .get(document.language_id())?
            .extract_block_at(document, position)
    }

    /// Run a full pass over `document`, or join the one already running for its URI.
    pub async fn translate_document(self: &Arc<Self>, document: Arc<Document>) -> PassSummary {
        let uri = document.uri().to_string();
        let this = Arc::clone(self);
        self.exclusive(&uri, async move { this.run_pass(document).await }.boxed())
            .await
    }

    /// Re-send only the blocks that failed in the last pass over `uri`.
    pub async fn retry_failed(self: &Arc<Self>, uri: &str) -> PassSummary {
        let this = Arc::clone(self);
        let owned = uri.to_string();
        self.exclusive(uri, async move { this.run_retry(owned).await }.boxed())
            .await
    }

    /// Whole-file retry: wait the configured delay, then run a fresh pass.
    pub async fn retry_document(self: &Arc<Self>, document: Arc<Document>) -> PassSummary {
        let delay = self.config().file_retry_delay();
        debug!(uri = %document.uri(), delay_ms = delay.as_millis() as u64, "file retry scheduled");
        tokio::time::sleep(delay).await;
        self.clear_file_state(document.uri());
        self.translate_document(document).await
    }

    async fn exclusive(&self, uri: &str, pass: BoxFuture<'static, PassSummary>) -> PassSummary {
        let (id, running) = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(uri) {
                Some((id, running)) => {
                    debug!(uri, "pass already running, waiting for it");
                    (*id, running.clone())
                }
                None => {
                    let id = self.next_pass.fetch_add(1, Ordering::Relaxed);
                    let shared = pass.shared();
                    in_flight.insert(uri.to_string(), (id, shared.clone()));
                    (id, shared)
                }
            }
        };

        let summary = running.await;
        // Whoever finishes first retires the entry, unless a newer pass replaced it.
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(uri).is_some_and(|(current, _)| *current == id) {
            in_flight.remove(uri);
        }
        summary
    }

    async fn run_pass(self: Arc<Self>, document: Arc<Document>) -> PassSummary {
        let span = info_span!("pass", pass_id = %Uuid::new_v4(), uri = %document.uri());
        async move {
            let uri = document.uri();
            let config = self.config();

            let Some(detector) = self.detectors.get(document.language_id()) else {
                debug!(language_id = document.language_id(), "no detector, skipping");
                return PassSummary::empty(uri, PassOutcome::Unsupported);
            };

            let target_lang = config.target_language.clone();
            let fingerprint = fingerprint(&document, &target_lang);
            if let Some(shown) = self.unchanged(uri, &fingerprint) {
                debug!(blocks = shown.len(), "content unchanged, redisplaying");
                self.sink.show_translations(uri, &shown);
                return PassSummary {
                    total: shown.len(),
                    cached: shown.len(),
                    ..PassSummary::empty(uri, PassOutcome::Unchanged)
                };
            }

            let start = Instant::now();
            self.sink.status(uri, "Extracting comments");
            let blocks = detector.extract_all_blocks(&document);
            if blocks.is_empty() {
                self.sink.status(uri, "No translatable comments found");
                self.remember(uri, fingerprint, target_lang, Vec::new(), Vec::new());
                return PassSummary::empty(uri, PassOutcome::NoBlocks);
            }

            let total = blocks.len();
            let mut shown = Vec::with_capacity(total);
            let mut misses = Vec::new();
            for block in blocks {
                match self.cache.get(&block.text, &target_lang) {
                    Some(translation) => shown.push(TranslatedBlock { block, translation }),
                    None => misses.push(block),
                }
            }
            let cached = shown.len();
            info!(total, cached, misses = misses.len(), "blocks classified");
            self.sink.show_translations(uri, &shown);

            let mut summary = PassSummary {
                total,
                cached,
                ..PassSummary::empty(uri, PassOutcome::Complete)
            };
            if misses.is_empty() {
                self.sink.status(uri, &format!("All {total} comments served from cache"));
                self.remember(uri, fingerprint, target_lang, shown, Vec::new());
                return summary;
            }

            let provider = match self.providers.active(&config) {
                Ok(provider) => provider,
                Err(e) => {
                    summary.failed = misses.len();
                    summary.outcome = PassOutcome::FileFailed;
                    self.file_failed(uri, &e);
                    return summary;
                }
            };

            let failed = self
                .translate_blocks(uri, provider, misses, &target_lang, &config, &mut shown)
                .await;
            summary.translated = shown.len() - cached;
            summary.failed = failed.len();
            info!(
                translated = summary.translated,
                failed = summary.failed,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "pass finished"
            );

            if failed.is_empty() {
                self.sink.status(uri, &format!("Translated {total} comments"));
            } else {
                summary.outcome = PassOutcome::PartialFailure;
                self.sink.notify(Notice::PartialFailure {
                    uri: uri.to_string(),
                    failed: failed.len(),
                    retry: RetryAction::FailedBlocks {
                        uri: uri.to_string(),
                    },
                });
            }
            self.remember(uri, fingerprint, target_lang, shown, failed);
            summary
        }
        .instrument(span)
        .await
    }

    async fn run_retry(self: Arc<Self>, uri: String) -> PassSummary {
        let span = info_span!("retry", pass_id = %Uuid::new_v4(), uri = %uri);
        async move {
            let uri = uri.as_str();
            let Some((target_lang, mut shown, pending)) = self.take_failures(uri) else {
                debug!("no failed blocks to retry");
                return PassSummary::empty(uri, PassOutcome::NothingToRetry);
            };
            let config = self.config();
            let mut summary = PassSummary {
                total: shown.len() + pending.len(),
                cached: shown.len(),
                ..PassSummary::empty(uri, PassOutcome::Complete)
            };

            let provider = match self.providers.active(&config) {
                Ok(provider) => provider,
                Err(e) => {
                    summary.failed = pending.len();
                    summary.outcome = PassOutcome::FileFailed;
                    self.restore_failures(uri, shown, pending);
                    self.file_failed(uri, &e);
                    return summary;
                }
            };

            info!(blocks = pending.len(), "retrying failed blocks");
            let before = shown.len();
            let failed = self
                .translate_blocks(uri, provider, pending, &target_lang, &config, &mut shown)
                .await;
            summary.translated = shown.len() - before;
            summary.failed = failed.len();

            if failed.is_empty() {
                self.sink.notify(Notice::Info {
                    uri: uri.to_string(),
                    message: format!("Retried {} comments successfully", summary.translated),
                });
            } else {
                summary.outcome = PassOutcome::PartialFailure;
                self.sink.notify(Notice::Failed {
                    uri: uri.to_string(),
                    failed: failed.len(),
                    retry: RetryAction::FailedBlocks {
                        uri: uri.to_string(),
                    },
                });
            }
            self.restore_failures(uri, shown, failed);
            summary
        }
        .instrument(span)
        .await
    }

    /// Translate `blocks` in waves, caching and displaying after each wave.
    /// Returns the blocks that could not be translated.
    async fn translate_blocks(
        &self,
        uri: &str,
        provider: Arc<dyn TranslationProvider>,
        blocks: Vec<TextBlock>,
        target_lang: &str,
        config: &Config,
        shown: &mut Vec<TranslatedBlock>,
    ) -> Vec<TextBlock> {
        let jobs = if config.batch.enabled && provider.supports_batch() {
            plan_batches(blocks, config.batch_limits(), |b| b.text.chars().count())
        } else {
            blocks.into_iter().map(|b| vec![b]).collect()
        };
        debug!(jobs = jobs.len(), provider = provider.name(), "translation jobs planned");

        let mut failed = Vec::new();
        run_in_waves(
            jobs,
            config.concurrency,
            |job| translate_job(Arc::clone(&provider), job, target_lang.to_string()),
            |results: Vec<JobResult>| {
                for (block, result) in results.into_iter().flatten() {
                    match result {
                        Ok(translation) => {
                            self.cache.set(&block.text, &translation, target_lang);
                            shown.push(TranslatedBlock { block, translation });
                        }
                        Err(e) => {
                            warn!(error = %e, line = block.range.start.line, "block translation failed");
                            failed.push(block);
                        }
                    }
                }
                self.sink.show_translations(uri, shown);
            },
        )
        .await;
        failed
    }

    fn unchanged(&self, uri: &str, fingerprint: &str) -> Option<Vec<TranslatedBlock>> {
        self.files
            .lock()
            .get(uri)
            .filter(|s| s.failed.is_empty() && s.fingerprint == fingerprint)
            .map(|s| s.shown.clone())
    }

    fn remember(
        &self,
        uri: &str,
        fingerprint: String,
        target_lang: String,
        shown: Vec<TranslatedBlock>,
        failed: Vec<TextBlock>,
    ) {
        self.files.lock().insert(
            uri.to_string(),
            FileState {
                fingerprint,
                target_lang,
                shown,
                failed,
            },
        );
    }

    fn take_failures(&self, uri: &str) -> Option<(String, Vec<TranslatedBlock>, Vec<TextBlock>)> {
        let mut files = self.files.lock();
        let state = files.get_mut(uri).filter(|s| !s.failed.is_empty())?;
        Some((
            state.target_lang.clone(),
            std::mem::take(&mut state.shown),
            std::mem::take(&mut state.failed),
        ))
    }

    fn restore_failures(&self, uri: &str, shown: Vec<TranslatedBlock>, failed: Vec<TextBlock>) {
        if let Some(state) = self.files.lock().get_mut(uri) {
            state.shown = shown;
            state.failed = failed;
        }
    }

    fn file_failed(&self, uri: &str, e: &ProviderError) {
        error!(error = %e, "translation provider unavailable");
        self.sink.notify(Notice::FileFailed {
            uri: uri.to_string(),
            message: e.to_string(),
            retry: RetryAction::WholeFile {
                uri: uri.to_string(),
            },
        });
    }
}

/// One job: a batch request when it holds several blocks, falling back to
/// one request per block if the batch fails or returns the wrong count.
async fn translate_job(
    provider: Arc<dyn TranslationProvider>,
    job: Vec<TextBlock>,
    target_lang: String,
) -> JobResult {
    if job.len() > 1 {
        let texts: Vec<String> = job.iter().map(|b| b.text.clone()).collect();
        match provider.translate_batch(&texts, &target_lang).await {
            Ok(translations) if translations.len() == job.len() => {
                return job.into_iter().zip(translations.into_iter().map(Ok)).collect();
            }
            Ok(translations) => warn!(
                expected = job.len(),
                got = translations.len(),
                "batch size mismatch, translating one by one"
            ),
            Err(e) => warn!(error = %e, size = job.len(), "batch failed, translating one by one"),
        }
    }

    let mut out = Vec::with_capacity(job.len());
    for block in job {
        let result = provider.translate(&block.text, &target_lang).await;
        out.push((block, result));
    }
    out
}
