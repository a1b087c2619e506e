use async_trait::async_trait;
use std::time::Duration;

/// Time-related side effects of the retry loop, injectable for tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Suspends the current task without blocking the thread.
    async fn sleep(&self, duration: Duration);
}

pub struct RealRuntime;

#[async_trait]
impl Runtime for RealRuntime {
    #[tracing::instrument(skip(self))]
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
