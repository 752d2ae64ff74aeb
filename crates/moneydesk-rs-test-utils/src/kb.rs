use async_trait::async_trait;
use moneydesk_rs_kb::{KbArticle, KbError, KnowledgeBase};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub fn sample_article(
    id: &str,
    slug: &str,
    question: &str,
    alternates: &[&str],
    keywords: &[&str],
) -> KbArticle {
    KbArticle {
        id: id.to_string(),
        slug: slug.to_string(),
        category: "general".to_string(),
        question: question.to_string(),
        alternate_questions: alternates.iter().map(|s| s.to_string()).collect(),
        answer: format!("Answer for {slug}."),
        short_answer: String::new(),
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        related_articles: Vec::new(),
    }
}

/// Small corpus with a budget article reachable through the built-in shortcuts.
pub fn sample_articles() -> Vec<KbArticle> {
    vec![
        sample_article(
            "kb-budget",
            "how-to-create-budget",
            "How do I create a budget?",
            &["How can I set up a monthly budget?"],
            &["budget", "create", "spending plan"],
        ),
        sample_article(
            "kb-score",
            "what-is-health-score",
            "What is my financial health score?",
            &["How is the health score calculated?"],
            &["health score", "score", "financial health"],
        ),
        sample_article(
            "kb-export",
            "export-data",
            "How do I export my transactions?",
            &["Can I download my data as CSV?"],
            &["export", "csv", "download"],
        ),
    ]
}

#[derive(Debug, Default)]
pub struct StubKnowledgeBase {
    articles: Arc<Vec<KbArticle>>,
    fail_articles: AtomicBool,
    fail_views: AtomicBool,
    views: Mutex<Vec<String>>,
}

impl StubKnowledgeBase {
    pub fn new(articles: Vec<KbArticle>) -> Self {
        Self {
            articles: Arc::new(articles),
            ..Self::default()
        }
    }

    pub fn fail_articles(&self, fail: bool) {
        self.fail_articles.store(fail, Ordering::SeqCst);
    }

    pub fn fail_views(&self, fail: bool) {
        self.fail_views.store(fail, Ordering::SeqCst);
    }

    pub fn views(&self) -> Vec<String> {
        self.views.lock().clone()
    }
}

#[async_trait]
impl KnowledgeBase for StubKnowledgeBase {
    async fn articles(&self) -> Result<Arc<Vec<KbArticle>>, KbError> {
        if self.fail_articles.load(Ordering::SeqCst) {
            return Err(KbError::Io(std::io::Error::other("corpus unavailable")));
        }
        Ok(self.articles.clone())
    }

    async fn record_view(&self, article_id: &str) -> Result<(), KbError> {
        if self.fail_views.load(Ordering::SeqCst) {
            return Err(KbError::UnknownArticle(article_id.to_string()));
        }
        self.views.lock().push(article_id.to_string());
        Ok(())
    }
}
