use async_trait::async_trait;
use log::debug;
use reqwest::{Client as HttpClient, header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION}};
use serde::{Deserialize, Serialize};

use super::{ChatClient, ChatRequest};
use crate::llm::{LlmConfig, LlmError, Provider, RolePolicy};

pub const OPENAI_MODEL: &str = "gpt-4o";
pub const OPENAI_TEMPERATURE: f32 = 1.0;

pub struct OpenAIChatClient {
    http: HttpClient,
    base_url: String,
    role_policy: RolePolicy,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize, Debug)]
pub struct OpenAIChatRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// System prompt first, then the admitted history in order, then the new turn.
pub fn build_request(request: &ChatRequest<'_>, role_policy: RolePolicy) -> OpenAIChatRequest {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(OpenAIMessage {
        role: "system".to_string(),
        content: request.system_prompt.to_string(),
    });
    messages.extend(
        request.history
            .iter()
            .filter(|m| role_policy.admits(m.role))
            .map(|m| OpenAIMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
    );
    messages.push(OpenAIMessage {
        role: "user".to_string(),
        content: request.user_text.to_string(),
    });

    OpenAIChatRequest {
        model: OPENAI_MODEL.to_string(),
        messages,
        temperature: OPENAI_TEMPERATURE,
        stream: false,
    }
}

impl OpenAIChatClient {
    pub fn new(
        api_key: &str,
        base_url: &str,
        role_policy: RolePolicy,
    ) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| LlmError::Config(format!("Invalid OpenAI API key format: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| LlmError::Http(Provider::OpenAI, e))?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            role_policy,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::Config("OpenAI API key is required".to_string()));
        }
        Self::new(&config.api_key, &config.base_url, config.role_policy)
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    fn provider(&self) -> Provider {
        Provider::OpenAI
    }

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let req = build_request(request, self.role_policy);
        debug!("Messages sent to OpenAI: {:?}", req.messages);

        let resp = self.http.post(&url)
            .json(&req)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LlmError::Http(Provider::OpenAI, e))?
            .json::<OpenAIResponse>()
            .await
            .map_err(|e| LlmError::Http(Provider::OpenAI, e))?;

        let content = resp.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse(Provider::OpenAI))?;
        debug!("OpenAI response: {}", content);

        Ok(content)
    }
}
