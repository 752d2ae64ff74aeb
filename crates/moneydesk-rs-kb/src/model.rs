//! Article and search result models.

use serde::{Deserialize, Serialize};

/// Pre-written support article.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KbArticle {
    pub id: String,
    /// Unique, URL-safe handle used by shortcut rules.
    pub slug: String,
    #[serde(default)]
    pub category: String,
    /// Canonical phrasing of the question.
    pub question: String,
    #[serde(default)]
    pub alternate_questions: Vec<String>,
    pub answer: String,
    #[serde(default)]
    pub short_answer: String,
    /// Ordered keywords; only the first three are scored.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub related_articles: Vec<String>,
}

/// Strength of a retrieval result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KbMatchType {
    Exact,
    Good,
    Partial,
    NoMatch,
}

impl KbMatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KbMatchType::Exact => "exact",
            KbMatchType::Good => "good",
            KbMatchType::Partial => "partial",
            KbMatchType::NoMatch => "no_match",
        }
    }

    /// Whether the result is strong enough to answer without AI.
    pub fn is_answer(&self) -> bool {
        matches!(self, KbMatchType::Exact | KbMatchType::Good)
    }
}

/// Outcome of a knowledge base search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KbSearchResult {
    #[serde(rename = "type")]
    pub match_type: KbMatchType,
    /// Present only for `exact` and `good`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<KbArticle>,
    /// At most three related articles.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<KbArticle>,
    pub confidence: f32,
}

impl KbSearchResult {
    /// Empty result.
    pub fn no_match() -> Self {
        Self {
            match_type: KbMatchType::NoMatch,
            article: None,
            suggestions: Vec::new(),
            confidence: 0.0,
        }
    }
}
