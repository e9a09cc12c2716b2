use log::info;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::chat::{ new_client, ChatClient, ChatRequest };
use super::{ LlmConfig, LlmError, Provider };
use crate::config::prompt::load_system_prompt;
use crate::models::chat::Message;

/// Turns a history plus a new user message into the assistant's reply.
pub struct ResponseGenerator {
    prompts_path: PathBuf,
    clients: HashMap<Provider, Arc<dyn ChatClient>>,
}

impl ResponseGenerator {
    pub fn new(prompts_path: impl Into<PathBuf>) -> Self {
        Self {
            prompts_path: prompts_path.into(),
            clients: HashMap::new(),
        }
    }

    pub fn with_client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.clients.insert(client.provider(), client);
        self
    }

    pub fn from_configs(
        prompts_path: impl Into<PathBuf>,
        openai: &LlmConfig,
        anthropic: &LlmConfig
    ) -> Result<Self, LlmError> {
        Ok(
            Self::new(prompts_path)
                .with_client(new_client(Provider::OpenAI, openai)?)
                .with_client(new_client(Provider::Anthropic, anthropic)?)
        )
    }

    /// `provider` is checked before the prompt file is read or any request is
    /// made; an unknown name is a configuration error.
    pub async fn generate(
        &self,
        history: &[Message],
        new_user_text: &str,
        provider: &str
    ) -> Result<String, LlmError> {
        let provider: Provider = provider.parse()?;
        let client = self.clients.get(&provider).ok_or(LlmError::MissingClient(provider))?;
        let system_prompt = load_system_prompt(&self.prompts_path)?;

        info!("Generating reply via {} ({} prior message(s))", provider, history.len());
        let reply = client
            .complete(&ChatRequest {
                system_prompt: &system_prompt,
                history,
                user_text: new_user_text,
            })
            .await?;

        Ok(reply.trim().to_string())
    }
}
