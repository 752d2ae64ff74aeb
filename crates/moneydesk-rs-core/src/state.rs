//! SQLite persistence for conversations, messages and usage counters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use moneydesk_rs_protocol::{
    ConversationMessage, ConversationStore, Intent, MessageRole, MessageSource, NewMessage,
    ReplySource, StoreError, UsageEvent, UsageKey, UsageRecorder, UsageStore,
};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    total_tokens INTEGER NOT NULL DEFAULT 0,
    message_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id);

CREATE TABLE IF NOT EXISTS messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    conversation_id TEXT NOT NULL REFERENCES conversations(id),
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    intent TEXT,
    intent_confidence REAL,
    source TEXT NOT NULL,
    kb_article_id TEXT,
    model_used TEXT,
    input_tokens INTEGER,
    output_tokens INTEGER,
    latency_ms INTEGER,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, seq);

CREATE TABLE IF NOT EXISTS usage_counters (
    user_id TEXT NOT NULL,
    feature TEXT NOT NULL,
    period_key TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, feature, period_key)
);

CREATE TABLE IF NOT EXISTS usage_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    source TEXT NOT NULL,
    input_tokens INTEGER NOT NULL,
    output_tokens INTEGER NOT NULL,
    model TEXT,
    created_at TEXT NOT NULL
);
"#;

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, intent, intent_confidence, \
source, kb_article_id, model_used, input_tokens, output_tokens, latency_ms, created_at";

/// Conversation totals kept alongside each conversation row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTotals {
    pub user_id: String,
    pub total_tokens: i64,
    pub message_count: i64,
}

/// Single-connection SQLite store implementing every persistence contract.
///
/// Async calls run their statements on tokio's blocking pool.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database file, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| StoreError::Backend(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(backend)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(backend)?;
        info!("opened sqlite store (path={})", path.display());
        Self::with_connection(conn)
    }

    /// In-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(backend)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(backend)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            work(&mut *conn)
        })
        .await
        .map_err(|err| StoreError::Backend(format!("sqlite task failed: {err}")))?
    }

    /// Running totals for a conversation.
    pub fn conversation_totals(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationTotals>, StoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT user_id, total_tokens, message_count FROM conversations WHERE id = ?1",
            params![conversation_id],
            |row| {
                Ok(ConversationTotals {
                    user_id: row.get(0)?,
                    total_tokens: row.get(1)?,
                    message_count: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(backend)
    }

    /// Usage log entries for a user, oldest first.
    pub fn usage_events(&self, user_id: &str) -> Result<Vec<UsageEvent>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT user_id, conversation_id, source, input_tokens, output_tokens, model \
                 FROM usage_events WHERE user_id = ?1 ORDER BY id",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })
            .map_err(backend)?;
        let mut events = Vec::new();
        for row in rows {
            let (user_id, conversation_id, source, input_tokens, output_tokens, model) =
                row.map_err(backend)?;
            let source = ReplySource::parse(&source)
                .ok_or_else(|| StoreError::Corrupt(format!("usage source: {source}")))?;
            events.push(UsageEvent {
                user_id,
                conversation_id,
                source,
                input_tokens,
                output_tokens,
                model,
            });
        }
        Ok(events)
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_conversation(&self, user_id: &str) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let user_id = user_id.to_string();
        self.run({
            let id = id.clone();
            move |conn| {
                conn.execute(
                    "INSERT INTO conversations (id, user_id, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?3)",
                    params![id, user_id, Utc::now()],
                )
                .map_err(backend)?;
                debug!("created conversation (conversation_id={id}, user_id={user_id})");
                Ok(())
            }
        })
        .await?;
        Ok(id)
    }

    async fn conversation_owner(
        &self,
        conversation_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let conversation_id = conversation_id.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT user_id FROM conversations WHERE id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)
        })
        .await
    }

    async fn append_message(&self, message: NewMessage) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.run({
            let id = id.clone();
            move |conn| insert_message(conn, &id, message)
        })
        .await?;
        Ok(id)
    }

    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conversation_id = conversation_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1 \
                     ORDER BY seq DESC LIMIT ?2"
                ))
                .map_err(backend)?;
            let rows = stmt
                .query_map(params![conversation_id, limit], RawMessage::from_row)
                .map_err(backend)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row.map_err(backend)?.decode()?);
            }
            messages.reverse();
            Ok(messages)
        })
        .await
    }

    async fn add_conversation_tokens(
        &self,
        conversation_id: &str,
        tokens: i64,
    ) -> Result<(), StoreError> {
        let conversation_id = conversation_id.to_string();
        self.run(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE conversations SET total_tokens = total_tokens + ?2, updated_at = ?3 \
                     WHERE id = ?1",
                    params![conversation_id, tokens, Utc::now()],
                )
                .map_err(backend)?;
            if updated == 0 {
                return Err(StoreError::NotFound(conversation_id));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl UsageStore for SqliteStore {
    async fn usage_count(&self, key: &UsageKey) -> Result<i64, StoreError> {
        let key = key.clone();
        self.run(move |conn| {
            let count: Option<i64> = conn
                .query_row(
                    "SELECT count FROM usage_counters \
                     WHERE user_id = ?1 AND feature = ?2 AND period_key = ?3",
                    params![key.user_id, key.feature, key.period_key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(backend)?;
            Ok(count.unwrap_or(0))
        })
        .await
    }

    async fn increment_usage(&self, key: &UsageKey, amount: i64) -> Result<i64, StoreError> {
        let key = key.clone();
        self.run(move |conn| {
            let tx = conn.transaction().map_err(backend)?;
            let current: Option<i64> = tx
                .query_row(
                    "SELECT count FROM usage_counters \
                     WHERE user_id = ?1 AND feature = ?2 AND period_key = ?3",
                    params![key.user_id, key.feature, key.period_key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(backend)?;
            let next = current.unwrap_or(0) + amount;
            tx.execute(
                "INSERT INTO usage_counters (user_id, feature, period_key, count, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT (user_id, feature, period_key) \
                 DO UPDATE SET count = excluded.count, updated_at = excluded.updated_at",
                params![key.user_id, key.feature, key.period_key, next, Utc::now()],
            )
            .map_err(backend)?;
            tx.commit().map_err(backend)?;
            Ok(next)
        })
        .await
    }
}

#[async_trait]
impl UsageRecorder for SqliteStore {
    async fn record(&self, event: UsageEvent) -> Result<(), StoreError> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO usage_events \
                 (user_id, conversation_id, source, input_tokens, output_tokens, model, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.user_id,
                    event.conversation_id,
                    event.source.as_str(),
                    event.input_tokens,
                    event.output_tokens,
                    event.model,
                    Utc::now(),
                ],
            )
            .map_err(backend)?;
            Ok(())
        })
        .await
    }
}

/// Insert a message row and bump its conversation's count in one transaction.
fn insert_message(conn: &mut Connection, id: &str, message: NewMessage) -> Result<(), StoreError> {
    let now = Utc::now();
    let tx = conn.transaction().map_err(backend)?;
    let updated = tx
        .execute(
            "UPDATE conversations SET message_count = message_count + 1, updated_at = ?2 \
             WHERE id = ?1",
            params![message.conversation_id, now],
        )
        .map_err(backend)?;
    if updated == 0 {
        return Err(StoreError::NotFound(message.conversation_id));
    }
    tx.execute(
        "INSERT INTO messages (id, conversation_id, role, content, intent, intent_confidence, \
         source, kb_article_id, model_used, input_tokens, output_tokens, latency_ms, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            id,
            message.conversation_id,
            message.role.as_str(),
            message.content,
            message.intent.map(|intent| intent.as_str()),
            message.intent_confidence.map(f64::from),
            message.source.as_str(),
            message.kb_article_id,
            message.model_used,
            message.input_tokens,
            message.output_tokens,
            message.latency_ms,
            now,
        ],
    )
    .map_err(backend)?;
    tx.commit().map_err(backend)
}

/// Column values as stored, before enum decoding.
struct RawMessage {
    id: String,
    conversation_id: String,
    role: String,
    content: String,
    intent: Option<String>,
    intent_confidence: Option<f64>,
    source: String,
    kb_article_id: Option<String>,
    model_used: Option<String>,
    input_tokens: Option<i64>,
    output_tokens: Option<i64>,
    latency_ms: Option<i64>,
    created_at: DateTime<Utc>,
}

impl RawMessage {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            role: row.get(2)?,
            content: row.get(3)?,
            intent: row.get(4)?,
            intent_confidence: row.get(5)?,
            source: row.get(6)?,
            kb_article_id: row.get(7)?,
            model_used: row.get(8)?,
            input_tokens: row.get(9)?,
            output_tokens: row.get(10)?,
            latency_ms: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    fn decode(self) -> Result<ConversationMessage, StoreError> {
        let role = MessageRole::parse(&self.role)
            .ok_or_else(|| StoreError::Corrupt(format!("message role: {}", self.role)))?;
        let source = MessageSource::parse(&self.source)
            .ok_or_else(|| StoreError::Corrupt(format!("message source: {}", self.source)))?;
        let intent = match self.intent {
            Some(intent) => Some(
                Intent::parse(&intent)
                    .ok_or_else(|| StoreError::Corrupt(format!("message intent: {intent}")))?,
            ),
            None => None,
        };
        Ok(ConversationMessage {
            id: self.id,
            conversation_id: self.conversation_id,
            role,
            content: self.content,
            intent,
            intent_confidence: self.intent_confidence.map(|value| value as f32),
            source,
            kb_article_id: self.kb_article_id,
            model_used: self.model_used,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            latency_ms: self.latency_ms,
            created_at: self.created_at,
        })
    }
}

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}
