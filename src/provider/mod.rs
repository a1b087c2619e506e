//! Text-generation providers.
//!
//! A provider turns a prompt into text and never fails outward: every failure
//! resolves to a fixed, user-safe placeholder message.

mod openai;
mod request;

use async_trait::async_trait;

pub use openai::{ERROR_PLACEHOLDER, OpenAiProvider, classify_response};
pub use request::{
    ChatCompletionResponse, ChatMessage, GenerationRequest, MAX_TOKENS, Role, TEMPERATURE,
};

/// Contract the provider-abstraction layer expects from each backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider identifier, also used as the telemetry label.
    fn name(&self) -> &str;

    /// Generates text for `prompt`, or returns [`ERROR_PLACEHOLDER`].
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> String;

    /// Releases the shared connection resource. Idempotent.
    async fn close(&self);
}
