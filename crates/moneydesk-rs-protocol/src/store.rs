//! Persistence contracts: conversation messages, usage counters, usage log.

use crate::{ClassificationResult, Intent, ReplySource, TokenUsage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by persistence collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend failure (connection, query, constraint).
    #[error("storage backend error: {0}")]
    Backend(String),
    /// A referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Stored data could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Speaker of a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// Origin tag stored on every message row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    /// User-authored rows.
    System,
    Canned,
    KbMatch,
    AiGenerated,
}

impl MessageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSource::System => "system",
            MessageSource::Canned => "canned",
            MessageSource::KbMatch => "kb_match",
            MessageSource::AiGenerated => "ai_generated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(MessageSource::System),
            "canned" => Some(MessageSource::Canned),
            "kb_match" => Some(MessageSource::KbMatch),
            "ai_generated" => Some(MessageSource::AiGenerated),
            _ => None,
        }
    }
}

/// Persisted conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub intent: Option<Intent>,
    pub intent_confidence: Option<f32>,
    pub source: MessageSource,
    pub kb_article_id: Option<String>,
    pub model_used: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub latency_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Message row before the store assigns an id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub intent: Option<Intent>,
    pub intent_confidence: Option<f32>,
    pub source: MessageSource,
    pub kb_article_id: Option<String>,
    pub model_used: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub latency_ms: Option<i64>,
}

impl NewMessage {
    /// User-role row; user rows are always tagged `system`.
    pub fn user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::bare(conversation_id, MessageRole::User, content, MessageSource::System)
    }

    /// Assistant-role row with the given source.
    pub fn assistant(
        conversation_id: impl Into<String>,
        content: impl Into<String>,
        source: MessageSource,
    ) -> Self {
        Self::bare(conversation_id, MessageRole::Assistant, content, source)
    }

    fn bare(
        conversation_id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
        source: MessageSource,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            intent: None,
            intent_confidence: None,
            source,
            kb_article_id: None,
            model_used: None,
            input_tokens: None,
            output_tokens: None,
            latency_ms: None,
        }
    }

    /// Attach classifier output.
    pub fn with_classification(mut self, classification: ClassificationResult) -> Self {
        self.intent = Some(classification.intent);
        self.intent_confidence = Some(classification.confidence);
        self
    }

    /// Attach the KB article that produced the reply.
    pub fn with_kb_article(mut self, article_id: impl Into<String>) -> Self {
        self.kb_article_id = Some(article_id.into());
        self
    }

    /// Attach completion metadata.
    pub fn with_completion(
        mut self,
        model: impl Into<String>,
        usage: TokenUsage,
        latency_ms: i64,
    ) -> Self {
        self.model_used = Some(model.into());
        self.input_tokens = Some(usage.prompt_tokens);
        self.output_tokens = Some(usage.completion_tokens);
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Append-only conversation and message store.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation for the user and return its id.
    async fn create_conversation(&self, user_id: &str) -> Result<String, StoreError>;

    /// Owner of a conversation, or `None` if it does not exist.
    async fn conversation_owner(
        &self,
        conversation_id: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Append a message and return the assigned id.
    async fn append_message(&self, message: NewMessage) -> Result<String, StoreError>;

    /// Most recent messages of a conversation, oldest first.
    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, StoreError>;

    /// Add tokens to the conversation running totals.
    async fn add_conversation_tokens(
        &self,
        conversation_id: &str,
        tokens: i64,
    ) -> Result<(), StoreError>;
}

/// Composite key of a usage counter row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UsageKey {
    pub user_id: String,
    pub feature: String,
    pub period_key: String,
}

impl UsageKey {
    pub fn new(
        user_id: impl Into<String>,
        feature: impl Into<String>,
        period_key: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            feature: feature.into(),
            period_key: period_key.into(),
        }
    }
}

/// Persisted usage counters keyed by `(user, feature, period)`.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Current count; absent rows count as zero.
    async fn usage_count(&self, key: &UsageKey) -> Result<i64, StoreError>;

    /// Add `amount` to the row (creating it) and return the new count.
    async fn increment_usage(&self, key: &UsageKey, amount: i64) -> Result<i64, StoreError>;
}

/// One routed turn, as written to the usage log.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEvent {
    pub user_id: String,
    pub conversation_id: String,
    pub source: ReplySource,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub model: Option<String>,
}

impl UsageEvent {
    /// Event for a branch that did not call the completion service.
    pub fn zero_cost(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        source: ReplySource,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            source,
            input_tokens: 0,
            output_tokens: 0,
            model: None,
        }
    }
}

/// Usage log sink.
#[async_trait]
pub trait UsageRecorder: Send + Sync {
    async fn record(&self, event: UsageEvent) -> Result<(), StoreError>;
}
