use async_trait::async_trait;
use log::debug;
use reqwest::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{ChatClient, ChatRequest};
use crate::llm::{LlmConfig, LlmError, Provider, RolePolicy};

pub const ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const ANTHROPIC_MAX_TOKENS: u32 = 1000;
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicChatClient {
    http: HttpClient,
    base_url: String,
    role_policy: RolePolicy,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize, Debug)]
pub struct AnthropicRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<AnthropicMessage>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// The system prompt travels in the top-level `system` field, never in
/// `messages`.
pub fn build_request(request: &ChatRequest<'_>, role_policy: RolePolicy) -> AnthropicRequest {
    let mut messages: Vec<AnthropicMessage> = request.history
        .iter()
        .filter(|m| role_policy.admits(m.role))
        .map(|m| AnthropicMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        })
        .collect();
    messages.push(AnthropicMessage {
        role: "user".to_string(),
        content: request.user_text.to_string(),
    });

    AnthropicRequest {
        model: ANTHROPIC_MODEL.to_string(),
        max_tokens: ANTHROPIC_MAX_TOKENS,
        system: request.system_prompt.to_string(),
        messages,
    }
}

impl AnthropicChatClient {
    pub fn new(
        api_key: &str,
        base_url: &str,
        role_policy: RolePolicy
    ) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|e| LlmError::Config(format!("Invalid Anthropic API key format: {}", e)))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| LlmError::Http(Provider::Anthropic, e))?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            role_policy,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::Config("Anthropic API key is required".to_string()));
        }
        Self::new(&config.api_key, &config.base_url, config.role_policy)
    }
}

#[async_trait]
impl ChatClient for AnthropicChatClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<String, LlmError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let req = build_request(request, self.role_policy);
        debug!("Messages sent to Anthropic: {:?}", req.messages);

        let resp = self.http.post(&url)
            .json(&req)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LlmError::Http(Provider::Anthropic, e))?
            .json::<AnthropicResponse>()
            .await
            .map_err(|e| LlmError::Http(Provider::Anthropic, e))?;

        let text = resp.content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .ok_or(LlmError::EmptyResponse(Provider::Anthropic))?;
        debug!("Anthropic response: {}", text);

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{Message, Role};

    fn msg(role: &str, content: &str) -> AnthropicMessage {
        AnthropicMessage { role: role.to_string(), content: content.to_string() }
    }

    #[test]
    fn drops_non_conversational_roles_and_lifts_system_prompt() {
        let history = vec![
            Message::user("hi"),
            Message::assistant("hello"),
            Message::new(Role::System, "ignored"),
        ];
        let request = ChatRequest {
            system_prompt: "You are Tuco.",
            history: &history,
            user_text: "how are you",
        };

        let req = build_request(&request, RolePolicy::Conversational);

        assert_eq!(
            req.messages,
            vec![msg("user", "hi"), msg("assistant", "hello"), msg("user", "how are you")]
        );
        assert_eq!(req.system, "You are Tuco.");
        assert_eq!(req.max_tokens, 1000);
        assert_eq!(req.model, "claude-3-5-sonnet-20241022");
    }

    #[test]
    fn request_body_has_top_level_system_field() {
        let request = ChatRequest { system_prompt: "p", history: &[], user_text: "x" };
        let body = serde_json::to_value(build_request(&request, RolePolicy::Conversational)).unwrap();

        assert_eq!(body["system"], "p");
        assert_eq!(body["messages"], serde_json::json!([{ "role": "user", "content": "x" }]));
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let config = LlmConfig {
            api_key: "  ".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            role_policy: RolePolicy::Conversational,
        };
        assert!(matches!(AnthropicChatClient::from_config(&config), Err(LlmError::Config(_))));
    }
}
