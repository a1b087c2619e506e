pub mod config;
pub mod http;
pub mod metrics;
pub mod provider;
pub mod runtime;

pub use config::ClientConfig;
pub use metrics::{InMemoryMetrics, MetricsSink, NoopMetrics};
pub use provider::{ERROR_PLACEHOLDER, LlmProvider, OpenAiProvider};
