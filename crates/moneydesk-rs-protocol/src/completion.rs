//! Contract for the paid AI completion service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Speaker role in a completion transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// Single message sent to the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Completion request: ordered transcript plus optional per-call overrides.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model_override: Option<String>,
    pub temperature_override: Option<f32>,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

impl TokenUsage {
    /// Prompt plus completion tokens.
    pub fn total(&self) -> i64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Completion result.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub content: String,
    /// Model id that actually served the request.
    pub model: String,
    pub usage: TokenUsage,
}

/// Errors returned by completion services.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The provider did not answer in time.
    #[error("completion timed out: {0}")]
    Timeout(String),
    /// The provider answered with an error.
    #[error("provider error: {0}")]
    Provider(String),
    /// The request could not be sent.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// Client configuration is unusable (missing key, bad url).
    #[error("completion config error: {0}")]
    Config(String),
}

/// Paid AI completion service.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Run a single completion.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError>;
}
