//! Attempt classification for the retry loop.
//!
//! Every attempt ends as exactly one [`AttemptOutcome`]. The loop only looks at
//! the variant: success ends it, a terminal failure aborts it, a retryable
//! failure consumes one retry.

use reqwest::StatusCode;
use std::time::Duration;

/// Longest slice of an error body kept in a [`FailureReason::Status`].
pub const ERROR_BODY_LIMIT: usize = 100;

/// Why a single attempt did not produce text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Success status, but the generated text was empty
    EmptyContent,
    /// Success status, but the body was not the expected shape
    MalformedBody(String),
    /// Non-success HTTP status with (truncated) response body
    Status { status: u16, body: String },
    /// The attempt hit its deadline
    Timeout(String),
    /// No connection could be established
    Connect(String),
    /// Anything else that went wrong during the attempt
    Unexpected(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::EmptyContent => write!(f, "Empty response with success status"),
            FailureReason::MalformedBody(detail) => {
                write!(f, "Failed parsing success response: {}", detail)
            }
            FailureReason::Status { status, body } => {
                write!(f, "API Error ({}): {}...", status, body)
            }
            FailureReason::Timeout(detail) => write!(f, "Request timed out: {}", detail),
            FailureReason::Connect(detail) => write!(f, "Connection failed: {}", detail),
            FailureReason::Unexpected(detail) => write!(f, "Unexpected error: {}", detail),
        }
    }
}

impl std::error::Error for FailureReason {}

/// Result of one network round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(String),
    Retryable(FailureReason),
    Terminal(FailureReason),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptOutcome::Terminal(_))
    }
}

/// Rate limiting, request timeouts and server faults are worth another try.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Classifies a response whose status is not a success.
pub fn classify_status(status: StatusCode, body: &str) -> AttemptOutcome {
    let reason = FailureReason::Status {
        status: status.as_u16(),
        body: truncate(body, ERROR_BODY_LIMIT),
    };

    if is_retryable_status(status) {
        AttemptOutcome::Retryable(reason)
    } else {
        AttemptOutcome::Terminal(reason)
    }
}

/// Maps a transport-level reqwest error (no usable response) to a reason.
pub fn classify_transport_error(error: &reqwest::Error) -> FailureReason {
    if error.is_timeout() {
        FailureReason::Timeout(error.to_string())
    } else if error.is_connect() {
        FailureReason::Connect(error.to_string())
    } else {
        FailureReason::Unexpected(error.to_string())
    }
}

/// Classifies any error raised while driving an attempt.
///
/// Nothing raised here carries an HTTP status, so every case is retryable.
pub fn classify_error(error: &anyhow::Error) -> AttemptOutcome {
    let reason = match error.downcast_ref::<reqwest::Error>() {
        Some(e) => classify_transport_error(e),
        None => FailureReason::Unexpected(format!("{:#}", error)),
    };
    AttemptOutcome::Retryable(reason)
}

/// Delay inserted before retry number `retry` (1-indexed). Linear, not exponential.
pub fn backoff_delay(retry_delay: Duration, retry: u32) -> Duration {
    retry_delay.saturating_mul(retry)
}

/// Cuts `text` to at most `max` characters without splitting a code point.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn test_client_errors_are_terminal() {
        for code in [400u16, 401, 403, 404, 422] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(!is_retryable_status(status), "{} should not retry", code);
            assert!(classify_status(status, "nope").is_terminal());
        }
    }

    #[test]
    fn test_classify_status_truncates_body() {
        let body = "x".repeat(500);
        match classify_status(StatusCode::BAD_GATEWAY, &body) {
            AttemptOutcome::Retryable(FailureReason::Status { status, body }) => {
                assert_eq!(status, 502);
                assert_eq!(body.len(), ERROR_BODY_LIMIT);
            }
            other => panic!("Expected retryable status, got {:?}", other),
        }
    }

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::Status {
            status: 429,
            body: "slow down".to_string(),
        };
        assert_eq!(reason.to_string(), "API Error (429): slow down...");
        assert!(FailureReason::EmptyContent.to_string().contains("Empty"));
        assert!(
            FailureReason::Timeout("deadline".into())
                .to_string()
                .contains("timed out")
        );
    }

    #[test]
    fn test_classify_non_reqwest_error_is_retryable() {
        let err = anyhow::anyhow!("semaphore closed");
        match classify_error(&err) {
            AttemptOutcome::Retryable(FailureReason::Unexpected(msg)) => {
                assert!(msg.contains("semaphore closed"))
            }
            other => panic!("Expected retryable unexpected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_classify_connection_refused() {
        // Bind then drop a listener so the port is known to be closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = reqwest::Client::new()
            .get(format!("http://{}/", addr))
            .send()
            .await
            .unwrap_err();

        let outcome = classify_error(&anyhow::Error::from(err));
        assert!(matches!(
            outcome,
            AttemptOutcome::Retryable(FailureReason::Connect(_))
        ));
    }

    #[test]
    fn test_backoff_is_linear() {
        let unit = Duration::from_millis(250);
        assert_eq!(backoff_delay(unit, 1), Duration::from_millis(250));
        assert_eq!(backoff_delay(unit, 2), Duration::from_millis(500));
        assert_eq!(backoff_delay(unit, 3), Duration::from_millis(750));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 100), "short");
    }
}
