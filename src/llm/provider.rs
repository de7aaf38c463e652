use async_trait::async_trait;

use crate::errors::PointClawResult;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};

/// Unified LLM provider trait. All providers implement this trait.
/// New providers only need to implement this trait and register in config.toml.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (matches config.toml key).
    fn name(&self) -> &str;

    /// Model names this provider currently serves.
    async fn list_models(&self) -> PointClawResult<Vec<String>>;

    /// Runs one chat completion and returns the accumulated text.
    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> PointClawResult<LlmResponse>;
}
