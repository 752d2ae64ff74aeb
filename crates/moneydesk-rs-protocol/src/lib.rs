//! Wire types and collaborator contracts for the MoneyDesk support router.

mod clock;
mod completion;
mod context;
mod store;

pub use clock::{Clock, SystemClock};
pub use completion::{
    ChatMessage, ChatRole, CompletionError, CompletionRequest, CompletionResponse,
    CompletionService, TokenUsage,
};
pub use context::FinanceContextProvider;
pub use store::{
    ConversationMessage, ConversationStore, MessageRole, MessageSource, NewMessage, StoreError,
    UsageEvent, UsageKey, UsageRecorder, UsageStore,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of an authenticated end user.
pub type UserId = String;
/// Identifier of a conversation row.
pub type ConversationId = String;

/// Coarse routing label assigned to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Answered from the knowledge base.
    FaqMatch,
    /// Finance question about the user's own situation.
    FinancePersonal,
    /// Finance question without a personal angle.
    FinanceGeneral,
    Greeting,
    Thanks,
    OffTopic,
    /// Prompt injection or other misuse.
    Abuse,
}

impl Intent {
    /// Return the intent as its snake_case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::FaqMatch => "faq_match",
            Intent::FinancePersonal => "finance_personal",
            Intent::FinanceGeneral => "finance_general",
            Intent::Greeting => "greeting",
            Intent::Thanks => "thanks",
            Intent::OffTopic => "off_topic",
            Intent::Abuse => "abuse",
        }
    }

    /// Parse a snake_case label.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "faq_match" => Some(Intent::FaqMatch),
            "finance_personal" => Some(Intent::FinancePersonal),
            "finance_general" => Some(Intent::FinanceGeneral),
            "greeting" => Some(Intent::Greeting),
            "thanks" => Some(Intent::Thanks),
            "off_topic" => Some(Intent::OffTopic),
            "abuse" => Some(Intent::Abuse),
            _ => None,
        }
    }

    /// Intents that are answered with a canned reply when confident enough.
    pub fn is_cannable(&self) -> bool {
        matches!(
            self,
            Intent::Greeting | Intent::Thanks | Intent::OffTopic | Intent::Abuse
        )
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the intent classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: Intent,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

impl ClassificationResult {
    pub fn new(intent: Intent, confidence: f32) -> Self {
        Self { intent, confidence }
    }
}

/// Subscription tier used for quota lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Basic,
    Plus,
    Pro,
}

impl Tier {
    /// All tiers in ascending order.
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Basic, Tier::Plus, Tier::Pro];

    /// Return the tier as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Basic => "basic",
            Tier::Plus => "plus",
            Tier::Pro => "pro",
        }
    }

    /// Parse a tier name, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => Some(Tier::Free),
            "basic" => Some(Tier::Basic),
            "plus" => Some(Tier::Plus),
            "pro" => Some(Tier::Pro),
            _ => None,
        }
    }

    /// Resolve a tier name, falling back to `Free` for unknown values.
    pub fn resolve(value: &str) -> Self {
        Self::parse(value).unwrap_or_default()
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Tier::parse(value).ok_or_else(|| format!("unknown tier: {value}"))
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calendar bucket a usage counter accumulates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl QuotaPeriod {
    /// Return the period as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaPeriod::Daily => "daily",
            QuotaPeriod::Weekly => "weekly",
            QuotaPeriod::Monthly => "monthly",
        }
    }

    /// Wording for the remainder of the current period.
    pub fn remaining_wording(&self) -> &'static str {
        match self {
            QuotaPeriod::Daily => "today",
            QuotaPeriod::Weekly => "this week",
            QuotaPeriod::Monthly => "this month",
        }
    }
}

/// Inbound chat request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
}

/// Caller identity resolved before routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub id: UserId,
    pub tier: Tier,
}

impl UserContext {
    pub fn new(id: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: id.into(),
            tier,
        }
    }
}

/// Which stage produced the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Ai,
    KbMatch,
    Canned,
}

impl ReplySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplySource::Ai => "ai",
            ReplySource::KbMatch => "kb_match",
            ReplySource::Canned => "canned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ai" => Some(ReplySource::Ai),
            "kb_match" => Some(ReplySource::KbMatch),
            "canned" => Some(ReplySource::Canned),
            _ => None,
        }
    }
}

/// Usage figures returned with every reply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    /// Tokens consumed by this turn.
    pub tokens_used: i64,
    /// Tokens left in the current budget period; -1 when unbounded.
    pub remaining: i64,
    /// Share of the token budget consumed, 0..=100.
    pub usage_percent: f64,
    /// AI messages left today; -1 when unbounded.
    pub daily_remaining: i64,
}

/// Lightweight pointer to a KB article offered as a "did you mean" hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSuggestion {
    pub slug: String,
    pub question: String,
}

/// Outbound chat reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub message: String,
    pub source: ReplySource,
    pub conversation_id: ConversationId,
    pub usage: UsageSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<ArticleSuggestion>,
}

#[cfg(test)]
mod tests {
    use super::{ChatReply, Intent, ReplySource, Tier, UsageSummary};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn intent_labels_parse_back() {
        for intent in [
            Intent::FaqMatch,
            Intent::FinancePersonal,
            Intent::FinanceGeneral,
            Intent::Greeting,
            Intent::Thanks,
            Intent::OffTopic,
            Intent::Abuse,
        ] {
            assert_eq!(Intent::parse(intent.as_str()), Some(intent));
        }
        assert_eq!(Intent::parse("unknown"), None);
    }

    #[test]
    fn tier_resolves_unknown_to_free() {
        assert_eq!(Tier::resolve(" PLUS "), Tier::Plus);
        assert_eq!(Tier::resolve("platinum"), Tier::Free);
        assert!("gold".parse::<Tier>().is_err());
    }

    #[test]
    fn chat_reply_serializes_camel_case_without_empty_suggestions() {
        let reply = ChatReply {
            message: "hello".to_string(),
            source: ReplySource::KbMatch,
            conversation_id: "c1".to_string(),
            usage: UsageSummary {
                tokens_used: 0,
                remaining: 100,
                usage_percent: 0.0,
                daily_remaining: 5,
            },
            suggestions: Vec::new(),
        };
        let value = serde_json::to_value(&reply).expect("serialize");
        assert_eq!(
            value,
            json!({
                "message": "hello",
                "source": "kb_match",
                "conversationId": "c1",
                "usage": {
                    "tokensUsed": 0,
                    "remaining": 100,
                    "usagePercent": 0.0,
                    "dailyRemaining": 5
                }
            })
        );
    }
}
