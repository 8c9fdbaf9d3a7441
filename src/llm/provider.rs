use async_trait::async_trait;

use super::types::ChatRequest;
use crate::errors::BotError;

/// Capability interface for text generation. The orchestrator only ever
/// talks to this trait; which backend sits behind it is a wiring decision
/// made once at startup.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// provider name (e.g. "openai", "anthropic")
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn generate(&self, request: ChatRequest) -> Result<String, BotError>;
}
