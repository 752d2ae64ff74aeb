//! Routing core for MoneyDesk support messages.
//!
//! This crate owns the intent classifier, the quota ledger, the message router
//! and the default SQLite and HTTP-completion collaborators used by the server
//! and CLI.

pub mod canned;
pub mod classifier;
pub mod completion;
pub mod error;
pub mod prompt;
pub mod quota;
pub mod router;
pub mod state;

pub use classifier::IntentClassifier;
pub use completion::OpenAiCompletionClient;
pub use error::RouterError;
pub use quota::{QuotaDecision, QuotaLedger, period_key};
/// Router facade and its builder.
pub use router::{KB_REPLY_MARKER, MessageRouter, MessageRouterBuilder};
pub use state::SqliteStore;
