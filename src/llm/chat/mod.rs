pub mod openai;
pub mod anthropic;

use async_trait::async_trait;
use std::sync::Arc;
use super::{ LlmConfig, LlmError, Provider };
use self::openai::OpenAIChatClient;
use self::anthropic::AnthropicChatClient;
use crate::models::chat::Message;

/// Everything a vendor adapter needs for one reply. `user_text` is the new
/// turn and is not part of `history`.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub system_prompt: &'a str,
    pub history: &'a [Message],
    pub user_text: &'a str,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Sends one non-streaming request and returns the raw reply text.
    async fn complete(&self, request: &ChatRequest<'_>) -> Result<String, LlmError>;
}

pub fn new_client(
    provider: Provider,
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client: Arc<dyn ChatClient> = match provider {
        Provider::OpenAI => Arc::new(OpenAIChatClient::from_config(config)?),
        Provider::Anthropic => Arc::new(AnthropicChatClient::from_config(config)?),
    };
    Ok(client)
}
