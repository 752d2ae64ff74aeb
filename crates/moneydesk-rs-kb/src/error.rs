//! Error types for knowledge base operations.

/// Errors returned by corpus providers and the retrieval engine.
#[derive(Debug, thiserror::Error)]
pub enum KbError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Regex compilation error.
    #[error("regex error: {0}")]
    Regex(String),
    /// Two articles share a slug.
    #[error("duplicate article slug: {0}")]
    DuplicateSlug(String),
    /// Referenced article is not in the corpus.
    #[error("unknown article: {0}")]
    UnknownArticle(String),
}
