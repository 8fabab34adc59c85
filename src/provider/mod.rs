//! Translation providers: the contract every backend implements, the error
//! taxonomy the orchestrator reacts to, and a registry that builds the
//! active backend from configuration.

pub mod chat;
pub mod language;
pub mod retry;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;

pub use chat::ChatCompletionsProvider;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("missing credentials for provider {0}")]
    MissingCredentials(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {message}")]
    TransientServer { status: u16, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("request failed: {0}")]
    Request(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

impl ProviderError {
    /// Whether another attempt could succeed without user intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::RateLimited { .. }
                | ProviderError::TransientServer { .. }
                | ProviderError::MalformedResponse(_)
        )
    }

    /// Server-requested wait, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// A translation backend. Object safe so the registry can hand out `Arc<dyn _>`.
pub trait TranslationProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Translate one text into `target_lang`.
    fn translate<'a>(
        &'a self,
        text: &'a str,
        target_lang: &'a str,
    ) -> BoxFuture<'a, Result<String, ProviderError>>;

    fn supports_batch(&self) -> bool {
        false
    }

    /// Translate several texts, one output per input in order.
    ///
    /// The default sends them one at a time. An item that fails keeps its
    /// original text; only missing credentials abort the whole batch.
    fn translate_batch<'a>(
        &'a self,
        texts: &'a [String],
        target_lang: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, ProviderError>> {
        Box::pin(async move {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                match self.translate(text, target_lang).await {
                    Ok(translated) => out.push(translated),
                    Err(e @ ProviderError::MissingCredentials(_)) => return Err(e),
                    Err(e) => {
                        warn!(provider = self.name(), error = %e, "batch item failed, keeping original");
                        out.push(text.clone());
                    }
                }
            }
            Ok(out)
        })
    }
}

pub type ProviderFactory =
    Box<dyn Fn(&Config) -> Result<Arc<dyn TranslationProvider>, ProviderError> + Send + Sync>;

/// Provider factories by name plus the lazily built active instance.
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
    active: Mutex<Option<(String, Arc<dyn TranslationProvider>)>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            active: Mutex::new(None),
        }
    }

    /// Registry with the built-in OpenAI-compatible chat backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for name in ["deepseek", "openai"] {
            registry.register(
                name,
                Box::new(move |config: &Config| {
                    let provider = ChatCompletionsProvider::from_config(name, config)?;
                    Ok(Arc::new(provider) as Arc<dyn TranslationProvider>)
                }),
            );
        }
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: ProviderFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The provider named by `config.provider`, built on first use and
    /// reused until the name changes or [`reset`](Self::reset) is called.
    pub fn active(&self, config: &Config) -> Result<Arc<dyn TranslationProvider>, ProviderError> {
        let mut active = self.active.lock();
        if let Some((name, provider)) = active.as_ref() {
            if *name == config.provider {
                return Ok(Arc::clone(provider));
            }
        }
        let factory = self
            .factories
            .get(&config.provider)
            .ok_or_else(|| ProviderError::UnknownProvider(config.provider.clone()))?;
        let provider = factory(config)?;
        info!(provider = %config.provider, "translation provider ready");
        *active = Some((config.provider.clone(), Arc::clone(&provider)));
        Ok(provider)
    }

    /// Forget the built provider so the next call rebuilds it from fresh config.
    pub fn reset(&self) {
        self.active.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Upper;

    impl TranslationProvider for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn translate<'a>(
            &'a self,
            text: &'a str,
            _target_lang: &'a str,
        ) -> BoxFuture<'a, Result<String, ProviderError>> {
            Box::pin(async move {
                if text.contains("boom") {
                    Err(ProviderError::Api {
                        status: 400,
                        message: "bad".into(),
                    })
                } else {
                    Ok(text.to_uppercase())
                }
            })
        }
    }

    #[tokio::test]
    async fn default_batch_keeps_original_on_item_failure() {
        let texts = vec!["one".to_string(), "boom".to_string(), "three".to_string()];
        let out = Upper.translate_batch(&texts, "xx").await.unwrap();
        assert_eq!(out, ["ONE", "boom", "THREE"]);
    }

    #[test]
    fn retryable_classification() {
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ProviderError::RateLimited { retry_after: None }.is_retryable());
        assert!(ProviderError::MalformedResponse("x".into()).is_retryable());
        assert!(!ProviderError::MissingCredentials("deepseek".into()).is_retryable());
        assert!(!ProviderError::Api {
            status: 401,
            message: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn registry_caches_until_reset() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let mut registry = ProviderRegistry::new();
        registry.register(
            "upper",
            Box::new(move |_: &Config| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Upper) as Arc<dyn TranslationProvider>)
            }),
        );
        let config = Config {
            provider: "upper".into(),
            ..Config::default()
        };
        registry.active(&config).unwrap();
        registry.active(&config).unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        registry.reset();
        registry.active(&config).unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(registry.names(), ["deepseek", "openai"]);
        let config = Config {
            provider: "nope".into(),
            ..Config::default()
        };
        assert!(matches!(
            registry.active(&config),
            Err(ProviderError::UnknownProvider(_))
        ));
    }
}
