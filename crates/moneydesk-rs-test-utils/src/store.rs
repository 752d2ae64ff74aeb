use async_trait::async_trait;
use chrono::Utc;
use moneydesk_rs_protocol::{
    ConversationMessage, ConversationStore, NewMessage, StoreError, UsageEvent, UsageKey,
    UsageRecorder, UsageStore,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ConversationTotals {
    pub user_id: String,
    pub total_tokens: i64,
    pub message_count: i64,
}

#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    conversations: Mutex<HashMap<String, ConversationTotals>>,
    messages: Mutex<Vec<ConversationMessage>>,
    fail_appends: AtomicBool,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `append_message` fail.
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn messages(&self, conversation_id: &str) -> Vec<ConversationMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|message| message.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub fn all_messages(&self) -> Vec<ConversationMessage> {
        self.messages.lock().clone()
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.lock().len()
    }

    pub fn totals(&self, conversation_id: &str) -> Option<ConversationTotals> {
        self.conversations.lock().get(conversation_id).cloned()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create_conversation(&self, user_id: &str) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.conversations.lock().insert(
            id.clone(),
            ConversationTotals {
                user_id: user_id.to_string(),
                total_tokens: 0,
                message_count: 0,
            },
        );
        Ok(id)
    }

    async fn conversation_owner(
        &self,
        conversation_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .conversations
            .lock()
            .get(conversation_id)
            .map(|totals| totals.user_id.clone()))
    }

    async fn append_message(&self, message: NewMessage) -> Result<String, StoreError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("append failed".to_string()));
        }
        let mut conversations = self.conversations.lock();
        let totals = conversations
            .get_mut(&message.conversation_id)
            .ok_or_else(|| StoreError::NotFound(message.conversation_id.clone()))?;
        totals.message_count += 1;
        let id = Uuid::new_v4().to_string();
        self.messages.lock().push(ConversationMessage {
            id: id.clone(),
            conversation_id: message.conversation_id,
            role: message.role,
            content: message.content,
            intent: message.intent,
            intent_confidence: message.intent_confidence,
            source: message.source,
            kb_article_id: message.kb_article_id,
            model_used: message.model_used,
            input_tokens: message.input_tokens,
            output_tokens: message.output_tokens,
            latency_ms: message.latency_ms,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        let messages = self.messages(conversation_id);
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }

    async fn add_conversation_tokens(
        &self,
        conversation_id: &str,
        tokens: i64,
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.lock();
        let totals = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))?;
        totals.total_tokens += tokens;
        Ok(())
    }
}

/// Usage counters with a read counter and a failure switch.
#[derive(Debug, Default)]
pub struct MemoryUsageStore {
    counts: Mutex<HashMap<UsageKey, i64>>,
    reads: AtomicUsize,
    fail: AtomicBool,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read and write fail.
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn set_count(&self, key: UsageKey, count: i64) {
        self.counts.lock().insert(key, count);
    }

    pub fn count(&self, key: &UsageKey) -> i64 {
        self.counts.lock().get(key).copied().unwrap_or(0)
    }

    /// Every counter row, in no particular order.
    pub fn rows(&self) -> Vec<(UsageKey, i64)> {
        self.counts
            .lock()
            .iter()
            .map(|(key, count)| (key.clone(), *count))
            .collect()
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(StoreError::Backend("usage store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn usage_count(&self, key: &UsageKey) -> Result<i64, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.count(key))
    }

    async fn increment_usage(&self, key: &UsageKey, amount: i64) -> Result<i64, StoreError> {
        self.check_failure()?;
        let mut counts = self.counts.lock();
        let count = counts.entry(key.clone()).or_insert(0);
        *count += amount;
        Ok(*count)
    }
}

#[derive(Debug, Default)]
pub struct RecordingUsageRecorder {
    events: Mutex<Vec<UsageEvent>>,
    fail: AtomicBool,
}

impl RecordingUsageRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl UsageRecorder for RecordingUsageRecorder {
    async fn record(&self, event: UsageEvent) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("usage log unavailable".to_string()));
        }
        self.events.lock().push(event);
        Ok(())
    }
}
