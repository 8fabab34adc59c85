//! OpenAI-compatible chat/completions client (DeepSeek, OpenAI and clones).
//! Connection pooling via reqwest, min-interval request pacing, retries
//! through [`retry_with_backoff`].

use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::language::already_in_target;
use super::retry::{retry_with_backoff, with_timeout, RetryPolicy};
use super::{ProviderError, TranslationProvider};
use crate::config::Config;

/// System prompt for single texts.
const SYSTEM_PROMPT: &str = "You translate source-code documentation. Translate the text \"t\" \
into the language \"l\". Keep identifiers, code, URLs and markdown syntax unchanged. \
Output only the translation, nothing else.";

/// System prompt for batches.
const BATCH_PROMPT: &str = "You translate source-code documentation. Translate every string \
in \"items\" into the language \"l\". Keep identifiers, code, URLs and markdown syntax unchanged. \
Reply with a JSON array of strings holding exactly one translation per item, in order, \
and nothing else.";

pub struct ChatCompletionsProvider {
    name: String,
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    retry: RetryPolicy,
    /// Next instant a request may leave.
    next_allowed: tokio::sync::Mutex<Instant>,
    min_interval: Duration,
}

impl ChatCompletionsProvider {
    /// Build the client for provider `name`. Fails fast when no API key is configured.
    pub fn from_config(name: &str, config: &Config) -> Result<Self, ProviderError> {
        let settings = config.provider_settings(name);
        let api_key = settings
            .resolve_api_key()
            .ok_or_else(|| ProviderError::MissingCredentials(name.to_string()))?;
        let base_url = settings
            .base_url
            .ok_or_else(|| ProviderError::Request(format!("no base_url configured for {name}")))?;
        let model = settings
            .model
            .ok_or_else(|| ProviderError::Request(format!("no model configured for {name}")))?;

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout: config.timeout(),
            retry: config.retry_policy(),
            next_allowed: tokio::sync::Mutex::new(Instant::now()),
            min_interval: Duration::from_millis(settings.min_interval_ms.unwrap_or(0)),
        })
    }

    /// Wait until the pacing window allows a request.
    async fn rate_limit_wait(&self) {
        let mut next = self.next_allowed.lock().await;
        let now = Instant::now();
        if *next > now {
            tokio::time::sleep(*next - now).await;
        }
        *next = Instant::now() + self.min_interval;
    }

    /// One chat completion with pacing, timeout and retries. Returns the message content.
    async fn complete(&self, system: &str, user: String) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "stream": false,
            "temperature": 0.1
        });
        let body = &body;
        let start = Instant::now();
        let content = retry_with_backoff(&self.retry, &self.name, move || async move {
            self.rate_limit_wait().await;
            with_timeout(self.timeout, self.send_once(body)).await
        })
        .await?;
        debug!(
            provider = %self.name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "completion received"
        );
        Ok(content)
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<String, ProviderError> {
        let resp = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::Request(e.to_string())
                }
            })?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let message: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(if status.is_server_error() {
                ProviderError::TransientServer {
                    status: status.as_u16(),
                    message,
                }
            } else {
                ProviderError::Api {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::MalformedResponse("empty completion".into()))
    }
}

impl TranslationProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn translate<'a>(
        &'a self,
        text: &'a str,
        target_lang: &'a str,
    ) -> BoxFuture<'a, Result<String, ProviderError>> {
        Box::pin(async move {
            if already_in_target(text, target_lang) {
                debug!(target_lang, "text already in target language");
                return Ok(text.to_string());
            }
            let prompt = serde_json::json!({"t": text, "l": target_lang}).to_string();
            self.complete(SYSTEM_PROMPT, prompt).await
        })
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn translate_batch<'a>(
        &'a self,
        texts: &'a [String],
        target_lang: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, ProviderError>> {
        Box::pin(async move {
            let pending: Vec<usize> = (0..texts.len())
                .filter(|&i| !already_in_target(&texts[i], target_lang))
                .collect();
            let mut out = texts.to_vec();
            if pending.is_empty() {
                return Ok(out);
            }

            let items: Vec<&str> = pending.iter().map(|&i| texts[i].as_str()).collect();
            let prompt = serde_json::json!({"items": items, "l": target_lang}).to_string();
            let content = self.complete(BATCH_PROMPT, prompt).await?;
            let translated = parse_batch_response(&content, pending.len())?;
            for (i, t) in pending.into_iter().zip(translated) {
                out[i] = t;
            }
            Ok(out)
        })
    }
}

/// Parse a batch reply: a JSON array of strings, optionally inside a
/// markdown code fence, with exactly `expected` entries.
pub fn parse_batch_response(content: &str, expected: usize) -> Result<Vec<String>, ProviderError> {
    let items: Vec<String> = serde_json::from_str(strip_fence(content))
        .map_err(|e| ProviderError::MalformedResponse(format!("batch reply is not a string array: {e}")))?;
    if items.len() != expected {
        return Err(ProviderError::MalformedResponse(format!(
            "batch reply has {} items, expected {expected}",
            items.len()
        )));
    }
    Ok(items)
}

fn strip_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

// --- Response types ---

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;

    fn config_with(settings: ProviderSettings) -> Config {
        let mut config = Config::default();
        config.providers.insert("deepseek".into(), settings);
        config
    }

    #[test]
    fn missing_key_fails_fast() {
        let config = config_with(ProviderSettings {
            api_key_env: Some("DOC_TRANSLATE_UNSET_VARIABLE".into()),
            ..Default::default()
        });
        assert!(matches!(
            ChatCompletionsProvider::from_config("deepseek", &config),
            Err(ProviderError::MissingCredentials(name)) if name == "deepseek"
        ));
    }

    #[test]
    fn parses_plain_and_fenced_arrays() {
        assert_eq!(parse_batch_response(r#"["一","二"]"#, 2).unwrap(), ["一", "二"]);
        let fenced = "```json\n[\"a\", \"b\", \"c\"]\n```";
        assert_eq!(parse_batch_response(fenced, 3).unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn rejects_wrong_count_and_non_arrays() {
        assert!(matches!(
            parse_batch_response(r#"["only one"]"#, 2),
            Err(ProviderError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_batch_response("Sure! Here you go.", 1),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn text_in_target_language_skips_the_network() {
        // Nothing listens on the discard port; reaching it would fail the test.
        let config = config_with(ProviderSettings {
            api_key: Some("sk-test".into()),
            base_url: Some("http://127.0.0.1:9".into()),
            ..Default::default()
        });
        let provider = ChatCompletionsProvider::from_config("deepseek", &config).unwrap();
        let text = "This function reads the configuration file from disk and returns \
            the parsed settings, falling back to the defaults when the file does not exist.";
        assert_eq!(provider.translate(text, "en").await.unwrap(), text);

        let batch = vec![text.to_string()];
        assert_eq!(provider.translate_batch(&batch, "en-US").await.unwrap(), batch);
    }
}
