//! OpenAI chat-completion provider with bounded, linearly backed-off retries.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::sync::Arc;

use super::LlmProvider;
use super::request::{ChatCompletionResponse, GenerationRequest};
use crate::config::ClientConfig;
use crate::http::{
    AttemptOutcome, FailureReason, SessionManager, backoff_delay, classify_error, classify_status,
};
use crate::metrics::{AttemptRecorder, MetricsSink};
use crate::runtime::{RealRuntime, Runtime};

/// Returned instead of generated text whenever a call cannot succeed.
pub const ERROR_PLACEHOLDER: &str =
    "Error: Unable to generate a response from the language model. Please try again later.";

const PROVIDER_NAME: &str = "openai";

pub struct OpenAiProvider<R: Runtime = RealRuntime> {
    config: ClientConfig,
    headers: HeaderMap,
    sessions: SessionManager,
    metrics: Arc<dyn MetricsSink>,
    runtime: R,
}

impl OpenAiProvider<RealRuntime> {
    pub fn new(config: ClientConfig, metrics: Arc<dyn MetricsSink>) -> Result<Self> {
        Self::with_runtime(config, metrics, RealRuntime)
    }
}

impl<R: Runtime> OpenAiProvider<R> {
    pub fn with_runtime(
        config: ClientConfig,
        metrics: Arc<dyn MetricsSink>,
        runtime: R,
    ) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .context("API key contains characters not allowed in an HTTP header")?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);

        info!(
            "Initialized OpenAI provider: model={}, timeout={}s, key={}",
            config.model,
            config.request_timeout.as_secs_f64(),
            config.masked_api_key()
        );

        Ok(Self {
            sessions: SessionManager::new(config.request_timeout, config.max_connections),
            config,
            headers,
            metrics,
            runtime,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// One round trip, fully classified. Never fails.
    ///
    /// The deadline covers the wait for a connection slot as well as the
    /// request itself.
    async fn attempt(&self, request: &GenerationRequest) -> AttemptOutcome {
        let deadline = self.config.request_timeout;
        match tokio::time::timeout(deadline, self.send(request)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => classify_error(&e),
            Err(_) => AttemptOutcome::Retryable(FailureReason::Timeout(format!(
                "attempt exceeded {:.3}s deadline",
                deadline.as_secs_f64()
            ))),
        }
    }

    async fn send(&self, request: &GenerationRequest) -> Result<AttemptOutcome> {
        let session = self.sessions.acquire()?;
        let _connection = session.connection().await?;

        let response = session
            .client()
            .post(&self.config.api_url)
            .headers(self.headers.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Ok(classify_response(status, &body))
    }

    /// "attempt/total" for the attempt made after `retries` earlier failures.
    fn attempt_progress(&self, retries: u32) -> String {
        format!("{}/{}", retries + 1, self.config.max_retries + 1)
    }

    fn log_retryable(&self, reason: &FailureReason, retries: u32) {
        let progress = self.attempt_progress(retries);
        match reason {
            FailureReason::EmptyContent => {
                warn!("OpenAI returned empty response with success status (attempt {})", progress)
            }
            FailureReason::Status { status, .. } => {
                warn!("Retryable OpenAI error: {} (attempt {})", status, progress)
            }
            FailureReason::Timeout(_) | FailureReason::Connect(_) => {
                error!("Connection or timeout error with OpenAI (attempt {}): {}", progress, reason)
            }
            FailureReason::MalformedBody(_) | FailureReason::Unexpected(_) => {
                error!("Error calling OpenAI API (attempt {}): {}", progress, reason)
            }
        }
    }
}

/// Classifies a complete HTTP response.
///
/// A success status whose body cannot be read as a completion is retried
/// rather than treated as terminal.
pub fn classify_response(status: StatusCode, body: &str) -> AttemptOutcome {
    if !status.is_success() {
        return classify_status(status, body);
    }

    let parsed = match serde_json::from_str::<ChatCompletionResponse>(body) {
        Ok(parsed) => parsed,
        Err(e) => return AttemptOutcome::Retryable(FailureReason::MalformedBody(e.to_string())),
    };

    match parsed.first_content().map(str::trim) {
        None => AttemptOutcome::Retryable(FailureReason::MalformedBody(
            "missing choices[0].message.content".to_string(),
        )),
        Some("") => AttemptOutcome::Retryable(FailureReason::EmptyContent),
        Some(text) => AttemptOutcome::Success(text.to_string()),
    }
}

#[async_trait]
impl<R: Runtime> LlmProvider for OpenAiProvider<R> {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    #[tracing::instrument(skip(self, prompt, system_prompt))]
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> String {
        if prompt.trim().is_empty() {
            warn!("Refusing to send an empty prompt to OpenAI");
            return ERROR_PLACEHOLDER.to_string();
        }

        let request = GenerationRequest::new(&self.config.model, prompt, system_prompt);
        debug!(
            "OpenAI request: model={}, system={}, prompt_len={}",
            self.config.model,
            system_prompt.is_some(),
            prompt.len()
        );

        let max_retries = self.config.max_retries;
        let mut retries: u32 = 0;
        let last_error = loop {
            if retries > 0 {
                let wait = backoff_delay(self.config.retry_delay, retries);
                info!(
                    "Retrying OpenAI request (retry {}/{}) after {:.1}s",
                    retries,
                    max_retries,
                    wait.as_secs_f64()
                );
                self.runtime.sleep(wait).await;
            }

            let outcome = {
                let mut recorder =
                    AttemptRecorder::start(self.metrics.as_ref(), PROVIDER_NAME, &self.config.model);
                let outcome = self.attempt(&request).await;
                if outcome.is_success() {
                    recorder.succeeded();
                }
                outcome
            };

            match outcome {
                AttemptOutcome::Success(text) => {
                    debug!("OpenAI response received (len={})", text.len());
                    return text;
                }
                AttemptOutcome::Terminal(reason) => {
                    error!("Non-retryable OpenAI API error: {}", reason);
                    return ERROR_PLACEHOLDER.to_string();
                }
                AttemptOutcome::Retryable(reason) => {
                    self.log_retryable(&reason, retries);
                    retries += 1;
                    if retries > max_retries {
                        break reason;
                    }
                }
            }
        };

        error!(
            "All {} retries failed for OpenAI request. Last error: {}",
            max_retries, last_error
        );
        ERROR_PLACEHOLDER.to_string()
    }

    async fn close(&self) {
        self.sessions.close();
    }
}
