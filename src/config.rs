//! Runtime configuration loaded from a JSON file. Every field has a default,
//! so an empty object (or no file at all) is a valid configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::provider::retry::RetryPolicy;
use crate::scheduler::BatchLimits;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-vendor settings. Missing values fall back to the built-in vendor defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is absent.
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Minimum spacing between outbound requests.
    pub min_interval_ms: Option<u64>,
}

impl ProviderSettings {
    /// Key from the file, else from the configured environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                self.api_key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|k| !k.trim().is_empty())
            })
    }

    fn or(self, fallback: ProviderSettings) -> ProviderSettings {
        ProviderSettings {
            api_key: self.api_key.or(fallback.api_key),
            api_key_env: self.api_key_env.or(fallback.api_key_env),
            base_url: self.base_url.or(fallback.base_url),
            model: self.model.or(fallback.model),
            min_interval_ms: self.min_interval_ms.or(fallback.min_interval_ms),
        }
    }
}

fn vendor_defaults(name: &str) -> ProviderSettings {
    let (env, url, model) = match name {
        "deepseek" => ("DEEPSEEK_API_KEY", "https://api.deepseek.com", "deepseek-chat"),
        "openai" => ("OPENAI_API_KEY", "https://api.openai.com", "gpt-4o-mini"),
        _ => return ProviderSettings::default(),
    };
    ProviderSettings {
        api_key: None,
        api_key_env: Some(env.to_string()),
        base_url: Some(url.to_string()),
        model: Some(model.to_string()),
        min_interval_ms: Some(100),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub enabled: bool,
    pub max_items: usize,
    pub max_chars: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_items: 10,
            max_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Active provider name (a key of the provider registry).
    pub provider: String,
    pub target_language: String,
    pub providers: HashMap<String, ProviderSettings>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_multiplier: f64,
    pub retry_max_delay_ms: u64,
    /// Language ids that get a detector.
    pub supported_languages: Vec<String>,
    /// Max in-flight translation requests per file.
    pub concurrency: usize,
    pub batch: BatchSettings,
    pub file_retry_delay_ms: u64,
    pub cache_path: PathBuf,
    pub cache_namespace: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: "deepseek".into(),
            target_language: "zh".into(),
            providers: HashMap::new(),
            timeout_secs: 30,
            max_retries: 3,
            retry_initial_delay_ms: 500,
            retry_multiplier: 2.0,
            retry_max_delay_ms: 8000,
            supported_languages: [
                "python",
                "javascript",
                "javascriptreact",
                "typescript",
                "typescriptreact",
                "go",
                "markdown",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            concurrency: 5,
            batch: BatchSettings::default(),
            file_retry_delay_ms: 2000,
            cache_path: PathBuf::from(".doc-translate/cache.db"),
            cache_namespace: crate::cache::DEFAULT_NAMESPACE.into(),
        }
    }
}

impl Config {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_language.trim().is_empty() {
            return Err(ConfigError::Invalid("target_language is empty".into()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be > 0".into()));
        }
        if self.batch.max_items == 0 || self.batch.max_chars == 0 {
            return Err(ConfigError::Invalid("batch limits must be > 0".into()));
        }
        if !(self.retry_multiplier >= 1.0) {
            return Err(ConfigError::Invalid("retry_multiplier must be >= 1".into()));
        }
        Ok(())
    }

    /// Settings for `name`, user values layered over vendor defaults.
    pub fn provider_settings(&self, name: &str) -> ProviderSettings {
        self.providers
            .get(name)
            .cloned()
            .unwrap_or_default()
            .or(vendor_defaults(name))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_initial_delay_ms),
            multiplier: self.retry_multiplier,
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            max_items: self.batch.max_items,
            max_chars: self.batch.max_chars,
        }
    }

    pub fn file_retry_delay(&self) -> Duration {
        Duration::from_millis(self.file_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.provider, "deepseek");
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.batch.max_items, 10);
        assert!(config.supported_languages.iter().any(|l| l == "go"));
        config.validate().unwrap();
    }

    #[test]
    fn provider_settings_layer_over_vendor_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"provider":"openai","providers":{"openai":{"model":"gpt-4.1"}}}"#,
        )
        .unwrap();
        let settings = config.provider_settings("openai");
        assert_eq!(settings.model.as_deref(), Some("gpt-4.1"));
        assert_eq!(settings.base_url.as_deref(), Some("https://api.openai.com"));
        assert_eq!(settings.api_key_env.as_deref(), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn api_key_in_file_wins() {
        let settings = ProviderSettings {
            api_key: Some("sk-file".into()),
            api_key_env: Some("DOC_TRANSLATE_UNSET_VARIABLE".into()),
            ..Default::default()
        };
        assert_eq!(settings.resolve_api_key().as_deref(), Some("sk-file"));
        let blank = ProviderSettings {
            api_key: Some("  ".into()),
            api_key_env: Some("DOC_TRANSLATE_UNSET_VARIABLE".into()),
            ..Default::default()
        };
        assert_eq!(blank.resolve_api_key(), None);
    }

    #[test]
    fn validation_rejects_zero_concurrency() {
        let config = Config {
            concurrency: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"target_language":"ja","concurrency":2}"#).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.target_language, "ja");
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.retry_policy().max_retries, 3);
    }
}
