pub mod chat;
pub mod generator;

use serde::{ Deserialize, Serialize };
use std::str::FromStr;
use std::fmt;
use thiserror::Error;
use crate::config::prompt::PromptError;
use crate::models::chat::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    Anthropic,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAI => write!(f, "openai"),
            Provider::Anthropic => write!(f, "anthropic"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Error)]
#[error("Unsupported provider: '{0}'")]
pub struct ParseProviderError(pub String);

impl FromStr for Provider {
    type Err = ParseProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "anthropic" => Ok(Provider::Anthropic),
            _ => Err(ParseProviderError(s.to_string())),
        }
    }
}

/// Which stored roles an adapter forwards to its vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolePolicy {
    /// Every history entry is sent with its stored role.
    All,
    /// Only `user` and `assistant` entries are sent.
    Conversational,
}

impl RolePolicy {
    pub fn admits(&self, role: Role) -> bool {
        match self {
            RolePolicy::All => true,
            RolePolicy::Conversational => matches!(role, Role::User | Role::Assistant),
        }
    }
}

impl FromStr for RolePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(RolePolicy::All),
            "conversational" => Ok(RolePolicy::Conversational),
            _ => Err(format!("Invalid role policy: '{}' (expected all or conversational)", s)),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error(transparent)]
    UnsupportedProvider(#[from] ParseProviderError),
    #[error("no client configured for provider {0}")]
    MissingClient(Provider),
    #[error("invalid client configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("{0} request failed: {1}")]
    Http(Provider, reqwest::Error),
    #[error("no response content from {0}")]
    EmptyResponse(Provider),
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub role_policy: RolePolicy,
}
