//! Content-addressed translation cache.
//! Key: blake3 hex of (text | target_lang). No TTL; only `clear` removes entries.
//! The in-memory map is authoritative; every write schedules a background save
//! of the whole namespace.

pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

pub use store::{KeyValueStore, MemoryStore, SqliteStore, StoreError};

/// Default namespace the cache persists under.
pub const DEFAULT_NAMESPACE: &str = "translationCache";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store: {0}")]
    Store(#[from] StoreError),
    #[error("cache persistence needs a tokio runtime")]
    NoRuntime,
}

/// Cache key for `text` translated into `target_lang`.
pub fn cache_key(text: &str, target_lang: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(text.as_bytes());
    hasher.update(b"|");
    hasher.update(target_lang.as_bytes());
    hasher.finalize().to_hex().to_string()
}

enum PersistMsg {
    Dirty,
    Flush(oneshot::Sender<()>),
}

pub struct TranslationCache {
    entries: Arc<RwLock<HashMap<String, String>>>,
    namespace: String,
    persist_tx: mpsc::UnboundedSender<PersistMsg>,
}

impl TranslationCache {
    /// Load `namespace` from `store` and start the background persistence task.
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        namespace: impl Into<String>,
    ) -> Result<Arc<Self>, CacheError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        let namespace = namespace.into();
        let loaded = store.load(&namespace)?;
        info!(namespace = %namespace, entries = loaded.len(), "translation cache loaded");

        let entries = Arc::new(RwLock::new(loaded));
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        handle.spawn(persist_loop(
            persist_rx,
            Arc::clone(&entries),
            store,
            namespace.clone(),
        ));

        Ok(Arc::new(Self {
            entries,
            namespace,
            persist_tx,
        }))
    }

    pub fn get(&self, text: &str, target_lang: &str) -> Option<String> {
        let hit = self.entries.read().get(&cache_key(text, target_lang)).cloned();
        if hit.is_some() {
            debug!(target_lang, "cache hit");
        }
        hit
    }

    /// Store a translation (last write wins) and schedule a save.
    pub fn set(&self, text: &str, translation: &str, target_lang: &str) {
        self.entries
            .write()
            .insert(cache_key(text, target_lang), translation.to_string());
        self.schedule(PersistMsg::Dirty);
    }

    /// Drop every entry and persist the empty namespace.
    pub fn clear(&self) {
        self.entries.write().clear();
        info!(namespace = %self.namespace, "translation cache cleared");
        self.schedule(PersistMsg::Dirty);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Resolves once every write issued before this call has been saved (or failed to).
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.persist_tx.send(PersistMsg::Flush(tx)).is_err() {
            return;
        }
        let _ = rx.await;
    }

    fn schedule(&self, msg: PersistMsg) {
        if self.persist_tx.send(msg).is_err() {
            warn!(namespace = %self.namespace, "cache persistence loop is gone, write kept in memory only");
        }
    }
}

/// Drains queued messages, then saves one snapshot for all of them.
async fn persist_loop(
    mut rx: mpsc::UnboundedReceiver<PersistMsg>,
    entries: Arc<RwLock<HashMap<String, String>>>,
    store: Arc<dyn KeyValueStore>,
    namespace: String,
) {
    while let Some(first) = rx.recv().await {
        let mut dirty = false;
        let mut waiters = Vec::new();
        let mut take = |msg: PersistMsg| match msg {
            PersistMsg::Dirty => dirty = true,
            PersistMsg::Flush(ack) => waiters.push(ack),
        };
        take(first);
        while let Ok(msg) = rx.try_recv() {
            take(msg);
        }

        if dirty {
            let snapshot = entries.read().clone();
            let store = Arc::clone(&store);
            let ns = namespace.clone();
            let count = snapshot.len();
            match tokio::task::spawn_blocking(move || store.save(&ns, &snapshot)).await {
                Ok(Ok(())) => debug!(namespace = %namespace, count, "cache persisted"),
                Ok(Err(e)) => warn!(namespace = %namespace, error = %e, "cache save failed"),
                Err(e) => warn!(namespace = %namespace, error = %e, "cache save task failed"),
            }
        }

        for ack in waiters {
            let _ = ack.send(());
        }
    }
    debug!(namespace = %namespace, "cache persistence loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_memory() -> (Arc<MemoryStore>, Arc<TranslationCache>) {
        let store = Arc::new(MemoryStore::new());
        let cache = TranslationCache::open(store.clone(), DEFAULT_NAMESPACE).unwrap();
        (store, cache)
    }

    #[tokio::test]
    async fn independent_entries_per_target_language() {
        let (_, cache) = open_memory();
        cache.set("Hello", "Bonjour", "fr");
        cache.set("Hello", "Hallo", "de");
        assert_eq!(cache.get("Hello", "fr").as_deref(), Some("Bonjour"));
        assert_eq!(cache.get("Hello", "de").as_deref(), Some("Hallo"));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn key_is_whitespace_sensitive_and_overwrite_keeps_size() {
        let (_, cache) = open_memory();
        cache.set("test", "a", "zh");
        cache.set("test ", "b", "zh");
        assert_eq!(cache.len(), 2);
        cache.set("test", "c", "zh");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("test", "zh").as_deref(), Some("c"));
        assert_eq!(cache.get("test ", "zh").as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn round_trip_edge_values() {
        let (_, cache) = open_memory();
        cache.set("empty", "", "ja");
        cache.set("line one\nline two", "一行目\n二行目", "ja");
        cache.set("naïve café 🚀", "ナイーブ", "ja");
        assert_eq!(cache.get("empty", "ja").as_deref(), Some(""));
        assert_eq!(cache.get("line one\nline two", "ja").as_deref(), Some("一行目\n二行目"));
        assert_eq!(cache.get("naïve café 🚀", "ja").as_deref(), Some("ナイーブ"));
        assert_eq!(cache.get("missing", "ja"), None);
    }

    #[tokio::test]
    async fn persisted_values_reload_in_fresh_instance() {
        let (store, cache) = open_memory();
        cache.set("Sample module", "示例模块", "zh");
        cache.flush().await;
        assert!(store.save_count() >= 1);

        let reopened = TranslationCache::open(store, DEFAULT_NAMESPACE).unwrap();
        assert_eq!(reopened.get("Sample module", "zh").as_deref(), Some("示例模块"));
    }

    #[tokio::test]
    async fn clear_persists_empty_state() {
        let (store, cache) = open_memory();
        cache.set("a", "b", "zh");
        cache.clear();
        cache.flush().await;
        assert!(cache.is_empty());
        assert!(store.load(DEFAULT_NAMESPACE).unwrap().is_empty());
    }

    #[tokio::test]
    async fn sqlite_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let store = Arc::new(SqliteStore::open(&path).unwrap());
            let cache = TranslationCache::open(store, "ns").unwrap();
            cache.set("Does X", "做 X", "zh");
            cache.flush().await;
        }
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let cache = TranslationCache::open(store, "ns").unwrap();
        assert_eq!(cache.get("Does X", "zh").as_deref(), Some("做 X"));
    }

    #[test]
    fn key_is_hex_and_language_sensitive() {
        let a = cache_key("text", "en");
        assert_eq!(a.len(), 64);
        assert_ne!(a, cache_key("text", "fr"));
        assert_eq!(a, cache_key("text", "en"));
    }

    #[test]
    fn open_without_runtime_fails() {
        let result = TranslationCache::open(Arc::new(MemoryStore::new()), "ns");
        assert!(matches!(result, Err(CacheError::NoRuntime)));
    }
}
