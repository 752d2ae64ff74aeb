//! Configuration schema for MoneyDesk.

use moneydesk_rs_protocol::{QuotaPeriod, Tier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root config for the support router.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MoneyDeskConfig {
    #[serde(
        default,
        rename = "$schema",
        skip_serializing_if = "Option::is_none"
    )]
    pub schema: Option<String>,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub kb: KbConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Message router tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Longest accepted message, in characters, after trimming.
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    /// Number of prior messages replayed to the completion service.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Each replayed history message is cut to this many characters.
    #[serde(default = "default_history_max_chars")]
    pub history_max_chars: usize,
    /// Minimum classifier confidence for a canned short-circuit.
    #[serde(default = "default_canned_min_confidence")]
    pub canned_min_confidence: f32,
    /// Extra persona text appended to the system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_instructions: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_message_chars: default_max_message_chars(),
            history_window: default_history_window(),
            history_max_chars: default_history_max_chars(),
            canned_min_confidence: default_canned_min_confidence(),
            additional_instructions: None,
        }
    }
}

fn default_max_message_chars() -> usize {
    500
}

fn default_history_window() -> usize {
    4
}

fn default_history_max_chars() -> usize {
    300
}

fn default_canned_min_confidence() -> f32 {
    0.85
}

/// Knowledge base corpus and retrieval thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbConfig {
    /// JSON file holding the article corpus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_path: Option<String>,
    #[serde(default = "default_exact_threshold")]
    pub exact_threshold: f32,
    #[serde(default = "default_good_threshold")]
    pub good_threshold: f32,
    #[serde(default = "default_partial_threshold")]
    pub partial_threshold: f32,
    /// Ordered shortcut rules; replaces the built-in list when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcuts: Option<Vec<ShortcutRule>>,
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            corpus_path: None,
            exact_threshold: default_exact_threshold(),
            good_threshold: default_good_threshold(),
            partial_threshold: default_partial_threshold(),
            shortcuts: None,
        }
    }
}

fn default_exact_threshold() -> f32 {
    0.55
}

fn default_good_threshold() -> f32 {
    0.40
}

fn default_partial_threshold() -> f32 {
    0.28
}

/// Regex pattern that maps straight to an article slug.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShortcutRule {
    pub pattern: String,
    pub slug: String,
}

/// Tiered usage limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Feature gating the number of AI replies.
    #[serde(default = "default_chat_feature")]
    pub chat_feature: String,
    /// Feature gating the number of AI tokens.
    #[serde(default = "default_token_feature")]
    pub token_feature: String,
    #[serde(default = "default_features")]
    pub features: BTreeMap<String, FeatureQuota>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            chat_feature: default_chat_feature(),
            token_feature: default_token_feature(),
            features: default_features(),
        }
    }
}

impl QuotaConfig {
    /// Limit for a tier on a feature, or `None` when the feature is unknown.
    pub fn limit(&self, tier: Tier, feature: &str) -> Option<FeatureLimit> {
        self.features.get(feature).map(|quota| FeatureLimit {
            limit: quota.limit_for(tier),
            period: quota.period,
        })
    }

    /// Period a feature accumulates in, or `None` when the feature is unknown.
    pub fn period(&self, feature: &str) -> Option<QuotaPeriod> {
        self.features.get(feature).map(|quota| quota.period)
    }
}

/// Limits of one feature across tiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureQuota {
    pub period: QuotaPeriod,
    /// Tier name to limit. `0` locks the feature, `-1` leaves it unbounded.
    #[serde(default)]
    pub limits: BTreeMap<String, i64>,
}

impl FeatureQuota {
    fn new(period: QuotaPeriod, limits: [i64; 4]) -> Self {
        let limits = Tier::ALL
            .iter()
            .zip(limits)
            .map(|(tier, limit)| (tier.as_str().to_string(), limit))
            .collect();
        Self { period, limits }
    }

    /// Limit for a tier; tiers missing from the table are locked.
    pub fn limit_for(&self, tier: Tier) -> i64 {
        self.limits.get(tier.as_str()).copied().unwrap_or(0)
    }
}

/// Resolved limit entry for one tier and feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureLimit {
    pub limit: i64,
    pub period: QuotaPeriod,
}

fn default_chat_feature() -> String {
    "chat".to_string()
}

fn default_token_feature() -> String {
    "chat_tokens".to_string()
}

fn default_features() -> BTreeMap<String, FeatureQuota> {
    // free, basic, plus, pro
    BTreeMap::from([
        (
            "chat".to_string(),
            FeatureQuota::new(QuotaPeriod::Daily, [20, 50, 150, -1]),
        ),
        (
            "chat_tokens".to_string(),
            FeatureQuota::new(QuotaPeriod::Monthly, [50_000, 200_000, 1_000_000, -1]),
        ),
        (
            "insights".to_string(),
            FeatureQuota::new(QuotaPeriod::Daily, [0, 3, 5, -1]),
        ),
        (
            "budget_review".to_string(),
            FeatureQuota::new(QuotaPeriod::Weekly, [0, 1, 3, -1]),
        ),
    ])
}

/// OpenAI-compatible completion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.4
}

fn default_max_tokens() -> u32 {
    600
}

fn default_timeout_secs() -> u64 {
    30
}

/// SQLite persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Database file; defaults to `~/.moneydesk/moneydesk.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8088
}
