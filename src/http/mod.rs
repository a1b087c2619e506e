//! HTTP plumbing: session lifecycle and attempt classification.

mod retry;
mod session;

pub use retry::{
    AttemptOutcome, ERROR_BODY_LIMIT, FailureReason, backoff_delay, classify_error,
    classify_status, classify_transport_error, is_retryable_status, truncate,
};
pub use session::{Session, SessionManager, SessionState};
