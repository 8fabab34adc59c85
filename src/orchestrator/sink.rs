//! Display side of a translation pass: overlays, status text and notices.

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::document::TextBlock;

/// A block paired with its translation, ready to render next to the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslatedBlock {
    pub block: TextBlock,
    pub translation: String,
}

/// Action a notice offers the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAction {
    /// Re-send only the blocks that failed last time.
    FailedBlocks { uri: String },
    /// Run the whole file again after the retry delay.
    WholeFile { uri: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info {
        uri: String,
        message: String,
    },
    /// Some blocks failed; the rest are displayed.
    PartialFailure {
        uri: String,
        failed: usize,
        retry: RetryAction,
    },
    /// A retry of failed blocks still left failures.
    Failed {
        uri: String,
        failed: usize,
        retry: RetryAction,
    },
    /// The pass could not run at all (no provider, no credentials).
    FileFailed {
        uri: String,
        message: String,
        retry: RetryAction,
    },
}

/// Host surface the orchestrator renders into. Calls may come from any task.
pub trait DisplaySink: Send + Sync {
    /// Replace the overlay set for `uri` with `blocks`.
    fn show_translations(&self, uri: &str, blocks: &[TranslatedBlock]);
    fn status(&self, uri: &str, message: &str);
    fn notify(&self, notice: Notice);
}

/// Sink that keeps every call in memory and mirrors it to the log.
#[derive(Default)]
pub struct RecordingSink {
    displays: Mutex<Vec<(String, Vec<TranslatedBlock>)>>,
    statuses: Mutex<Vec<(String, String)>>,
    notices: Mutex<Vec<Notice>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every display call in order.
    pub fn displays(&self) -> Vec<(String, Vec<TranslatedBlock>)> {
        self.displays.lock().clone()
    }

    pub fn display_count(&self, uri: &str) -> usize {
        self.displays.lock().iter().filter(|(u, _)| u == uri).count()
    }

    /// Overlays most recently shown for `uri`.
    pub fn latest(&self, uri: &str) -> Option<Vec<TranslatedBlock>> {
        self.displays
            .lock()
            .iter()
            .rev()
            .find(|(u, _)| u == uri)
            .map(|(_, blocks)| blocks.clone())
    }

    pub fn statuses(&self) -> Vec<(String, String)> {
        self.statuses.lock().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl DisplaySink for RecordingSink {
    fn show_translations(&self, uri: &str, blocks: &[TranslatedBlock]) {
        debug!(uri, count = blocks.len(), "display updated");
        self.displays.lock().push((uri.to_string(), blocks.to_vec()));
    }

    fn status(&self, uri: &str, message: &str) {
        info!(uri, "{message}");
        self.statuses.lock().push((uri.to_string(), message.to_string()));
    }

    fn notify(&self, notice: Notice) {
        match &notice {
            Notice::Info { uri, message } => info!(uri = %uri, "{message}"),
            Notice::PartialFailure { uri, failed, .. } => {
                warn!(uri = %uri, failed, "some blocks failed to translate")
            }
            Notice::Failed { uri, failed, .. } => {
                warn!(uri = %uri, failed, "blocks still failing after retry")
            }
            Notice::FileFailed { uri, message, .. } => {
                warn!(uri = %uri, error = %message, "file translation failed")
            }
        }
        self.notices.lock().push(notice);
    }
}
