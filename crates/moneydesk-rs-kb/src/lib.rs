//! Knowledge base corpus and lexical retrieval for MoneyDesk.

pub mod error;
pub mod model;
pub mod provider;
pub mod retrieval;
pub mod shortcuts;

/// Knowledge base error type.
pub use error::KbError;
/// Article and search result models.
pub use model::{KbArticle, KbMatchType, KbSearchResult};
/// Corpus provider interface and default file implementation.
pub use provider::{FileKnowledgeBase, KnowledgeBase};
/// Retrieval engine and its thresholds.
pub use retrieval::{KbSearcher, SearchThresholds};
/// Shortcut rules mapping phrasings straight to article slugs.
pub use shortcuts::{ShortcutSpec, builtin_shortcuts};
