//! Corpus providers.

use crate::error::KbError;
use crate::model::KbArticle;
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Corpus shipped with the crate, used when no corpus path is configured.
const BUILTIN_CORPUS: &str = include_str!("../assets/articles.json");

#[async_trait]
/// Read-only article corpus used by the router.
pub trait KnowledgeBase: Send + Sync {
    /// Every article, loaded in bulk for a single search.
    async fn articles(&self) -> Result<Arc<Vec<KbArticle>>, KbError>;

    /// Count a view of an article served as a reply.
    async fn record_view(&self, article_id: &str) -> Result<(), KbError>;
}

/// Corpus loaded once from a JSON array, with view counters held in memory.
#[derive(Debug)]
pub struct FileKnowledgeBase {
    articles: Arc<Vec<KbArticle>>,
    views: Mutex<HashMap<String, u64>>,
}

impl FileKnowledgeBase {
    /// Load a corpus file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KbError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let kb = Self::from_json(&contents)?;
        info!(
            "loaded kb corpus (path={}, articles={})",
            path.display(),
            kb.len()
        );
        Ok(kb)
    }

    /// Built-in corpus.
    pub fn builtin() -> Result<Self, KbError> {
        Self::from_json(BUILTIN_CORPUS)
    }

    /// Parse a JSON array of articles.
    pub fn from_json(contents: &str) -> Result<Self, KbError> {
        let articles: Vec<KbArticle> = serde_json::from_str(contents)?;
        Self::from_articles(articles)
    }

    /// Build from articles, rejecting duplicate slugs.
    pub fn from_articles(articles: Vec<KbArticle>) -> Result<Self, KbError> {
        let mut slugs = HashSet::new();
        for article in &articles {
            if !slugs.insert(article.slug.as_str()) {
                return Err(KbError::DuplicateSlug(article.slug.clone()));
            }
        }
        Ok(Self {
            articles: Arc::new(articles),
            views: Mutex::new(HashMap::new()),
        })
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    /// Views recorded for an article since load.
    pub fn view_count(&self, article_id: &str) -> u64 {
        self.views.lock().get(article_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl KnowledgeBase for FileKnowledgeBase {
    async fn articles(&self) -> Result<Arc<Vec<KbArticle>>, KbError> {
        Ok(self.articles.clone())
    }

    async fn record_view(&self, article_id: &str) -> Result<(), KbError> {
        if !self.articles.iter().any(|article| article.id == article_id) {
            return Err(KbError::UnknownArticle(article_id.to_string()));
        }
        let mut views = self.views.lock();
        let count = views.entry(article_id.to_string()).or_insert(0);
        *count += 1;
        debug!("kb view recorded (article_id={article_id}, views={count})");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{FileKnowledgeBase, KnowledgeBase};
    use crate::error::KbError;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn builtin_corpus_loads() {
        let kb = FileKnowledgeBase::builtin().expect("builtin");
        assert!(kb.len() >= 8);
    }

    #[test]
    fn duplicate_slugs_are_rejected() {
        let json = r#"[
            {"id": "a", "slug": "same", "question": "q1", "answer": "a1"},
            {"id": "b", "slug": "same", "question": "q2", "answer": "a2"}
        ]"#;
        let err = FileKnowledgeBase::from_json(json).unwrap_err();
        assert!(matches!(err, KbError::DuplicateSlug(slug) if slug == "same"));
    }

    #[tokio::test]
    async fn load_reads_file_and_counts_views() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("kb.json");
        std::fs::write(
            &path,
            r#"[{"id": "kb-1", "slug": "one", "question": "Question one?", "answer": "One."}]"#,
        )
        .expect("write");

        let kb = FileKnowledgeBase::load(&path).expect("load");
        let articles = kb.articles().await.expect("articles");
        assert_eq!(articles.len(), 1);
        assert!(articles[0].keywords.is_empty());

        kb.record_view("kb-1").await.expect("view");
        kb.record_view("kb-1").await.expect("view");
        assert_eq!(kb.view_count("kb-1"), 2);
        assert_eq!(kb.view_count("kb-2"), 0);
    }

    #[tokio::test]
    async fn unknown_article_view_is_an_error() {
        let kb = FileKnowledgeBase::builtin().expect("builtin");
        let err = kb.record_view("missing").await.unwrap_err();
        assert!(matches!(err, KbError::UnknownArticle(_)));
    }
}
