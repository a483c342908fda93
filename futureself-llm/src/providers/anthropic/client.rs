//! Anthropic HTTP client with rate limiting

use super::types::ApiError;
use futureself_core::{ConfigError, GenerationFailure, LetterError, LetterResult};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

pub(crate) const PROVIDER: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const API_VERSION: &str = "2023-06-01";

/// Connection settings for the Anthropic Messages API.
#[derive(Clone, PartialEq)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: i32,
    pub requests_per_minute: u32,
    pub request_timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: 1024,
            requests_per_minute: 50,
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Read `ANTHROPIC_API_KEY` (required) and optional `FUTURESELF_LLM_*`
    /// overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "ANTHROPIC_API_KEY".to_string(),
            })?;
        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var("FUTURESELF_LLM_MODEL") {
            config.model = model;
        }
        if let Ok(url) = std::env::var("FUTURESELF_LLM_BASE_URL") {
            config.base_url = url;
        }
        if let Some(rpm) = std::env::var("FUTURESELF_LLM_REQUESTS_PER_MINUTE")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.requests_per_minute = rpm;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tokens <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.max_tokens".to_string(),
                value: self.max_tokens.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.requests_per_minute == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.requests_per_minute".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("requests_per_minute", &self.requests_per_minute)
            .finish()
    }
}

pub(crate) fn provider_error(message: impl Into<String>) -> LetterError {
    LetterError::Generation(GenerationFailure::Backend {
        provider: PROVIDER.to_string(),
        message: message.into(),
    })
}

/// Anthropic API client with rate limiting.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: Arc<Semaphore>,
    last_request: Mutex<Option<Instant>>,
    min_request_interval: Duration,
}

impl AnthropicClient {
    pub fn new(config: &AnthropicConfig) -> LetterResult<Self> {
        let requests_per_minute = config.requests_per_minute.max(1);
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| provider_error(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            // Bounds in-flight requests; the interval below spaces them out.
            rate_limiter: Arc::new(Semaphore::new(requests_per_minute.min(16) as usize)),
            last_request: Mutex::new(None),
            min_request_interval: Duration::from_millis(
                (60_000 / requests_per_minute as u64).max(10),
            ),
        })
    }

    /// Wait until the minimum spacing since the previous request has passed.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_request_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Make an API request with automatic rate limiting.
    pub async fn request<Req: Serialize, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> LetterResult<Res> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| provider_error(format!("Rate limiter error: {e}")))?;
        self.pace().await;

        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| provider_error(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| provider_error(format!("Failed to parse response: {e}")));
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let error_msg = match serde_json::from_str::<ApiError>(&error_text) {
            Ok(api_error) => api_error.error.message,
            Err(_) => error_text,
        };

        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => provider_error(format!("Rate limited: {error_msg}")),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                provider_error(format!("Invalid API key: {error_msg}"))
            }
            _ => provider_error(format!("HTTP {}: {}", status.as_u16(), error_msg)),
        })
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_api_key() {
        let config = AnthropicConfig::new("sk-secret");
        assert!(!format!("{config:?}").contains("sk-secret"));
        let client = AnthropicClient::new(&config).unwrap();
        assert!(!format!("{client:?}").contains("sk-secret"));
    }

    #[test]
    fn test_zero_max_tokens_rejected() {
        let config = AnthropicConfig {
            max_tokens: 0,
            ..AnthropicConfig::new("k")
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_backend_failure() {
        let config = AnthropicConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            request_timeout: Duration::from_secs(2),
            ..AnthropicConfig::new("k")
        };
        let client = AnthropicClient::new(&config).unwrap();
        let result: LetterResult<serde_json::Value> =
            client.request("messages", &serde_json::json!({})).await;
        match result {
            Err(LetterError::Generation(GenerationFailure::Backend { provider, .. })) => {
                assert_eq!(provider, "anthropic");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
