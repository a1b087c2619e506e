//! Constructor-time options for the chat-completion client.

use anyhow::{Context, Result, bail};
use std::fmt;
use std::time::Duration;

/// Chat-completion endpoint used when none is configured.
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Per-attempt deadline in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Backoff unit in seconds; retry `n` waits `n` units.
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 2.0;

/// Concurrent connections allowed through one session.
pub const DEFAULT_MAX_CONNECTIONS: usize = 5;

/// Immutable client configuration.
///
/// Built once with [`ClientConfig::new`] and the `with_*` methods, then handed
/// to the provider. Nothing mutates it afterwards.
#[derive(Clone, PartialEq)]
pub struct ClientConfig {
    pub model: String,
    pub api_key: String,
    pub api_url: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_connections: usize,
}

impl ClientConfig {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs_f64(DEFAULT_RETRY_DELAY_SECS),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Rejects configurations that could never produce a successful call.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            bail!("Model identifier must not be empty.");
        }
        if self.api_key.trim().is_empty() {
            bail!("API key must not be empty. Set OPENAI_API_KEY or pass --api-key.");
        }
        if self.api_url.trim().is_empty() {
            bail!("API URL must not be empty.");
        }
        reqwest::Url::parse(&self.api_url)
            .with_context(|| format!("Invalid API URL: {}", self.api_url))?;
        if self.request_timeout.is_zero() {
            bail!("Request timeout must be greater than zero.");
        }
        if self.max_connections == 0 {
            bail!("Connection limit must be at least 1.");
        }
        Ok(())
    }

    /// Key with everything but the edges hidden, safe for log output.
    pub fn masked_api_key(&self) -> String {
        mask_secret(&self.api_key)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("model", &self.model)
            .field("api_key", &self.masked_api_key())
            .field("api_url", &self.api_url)
            .field("request_timeout", &self.request_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*********".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}
