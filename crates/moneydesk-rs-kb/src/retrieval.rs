//! Lexical retrieval: shortcut rules first, weighted similarity second.

use crate::error::KbError;
use crate::model::{KbArticle, KbMatchType, KbSearchResult};
use crate::shortcuts::{ShortcutSpec, builtin_shortcuts};
use log::debug;
use regex::Regex;
use std::collections::HashSet;

/// Confidence reported for shortcut hits.
const SHORTCUT_CONFIDENCE: f32 = 0.97;
/// Ceiling for `exact` confidence derived from a score.
const EXACT_CONFIDENCE_CAP: f32 = 0.98;
const KEYWORD_WEIGHT: f32 = 0.40;
const QUESTION_WEIGHT: f32 = 0.35;
const ALTERNATE_WEIGHT: f32 = 0.25;
/// Only the leading keywords of an article are scored.
const SCORED_KEYWORDS: usize = 3;
const GOOD_RUNNER_UPS: usize = 2;
const PARTIAL_SUGGESTIONS: usize = 3;

/// Score cut-offs for each match type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchThresholds {
    pub exact: f32,
    pub good: f32,
    pub partial: f32,
}

impl Default for SearchThresholds {
    fn default() -> Self {
        Self {
            exact: 0.55,
            good: 0.40,
            partial: 0.28,
        }
    }
}

/// Retrieval engine with its shortcut rules compiled once.
#[derive(Debug, Clone)]
pub struct KbSearcher {
    shortcuts: Vec<(Regex, String)>,
    thresholds: SearchThresholds,
}

impl KbSearcher {
    /// Compile the given shortcut rules.
    pub fn new(shortcuts: &[ShortcutSpec], thresholds: SearchThresholds) -> Result<Self, KbError> {
        let mut compiled = Vec::with_capacity(shortcuts.len());
        for shortcut in shortcuts {
            let regex = Regex::new(&shortcut.pattern)
                .map_err(|err| KbError::Regex(format!("{}: {err}", shortcut.pattern)))?;
            compiled.push((regex, shortcut.slug.clone()));
        }
        Ok(Self {
            shortcuts: compiled,
            thresholds,
        })
    }

    /// Searcher with the built-in shortcuts and default thresholds.
    pub fn with_defaults() -> Result<Self, KbError> {
        Self::new(&builtin_shortcuts(), SearchThresholds::default())
    }

    /// Score a message against the corpus.
    pub fn search(&self, message: &str, corpus: &[KbArticle]) -> KbSearchResult {
        let normalized = message.trim().to_lowercase();
        if normalized.is_empty() || corpus.is_empty() {
            return KbSearchResult::no_match();
        }

        if let Some(result) = self.shortcut_match(&normalized, corpus) {
            return result;
        }

        let message_words = word_set(&normalized);
        let mut scored: Vec<(f32, &KbArticle)> = corpus
            .iter()
            .map(|article| (score_article(&normalized, &message_words, article), article))
            .collect();
        // Stable: ties keep corpus order.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let (top_score, top_article) = scored[0];
        let thresholds = self.thresholds;
        debug!(
            "kb scored (articles={}, top_slug={}, top_score={:.3})",
            corpus.len(),
            top_article.slug,
            top_score
        );

        if top_score >= thresholds.exact {
            KbSearchResult {
                match_type: KbMatchType::Exact,
                article: Some(top_article.clone()),
                suggestions: Vec::new(),
                confidence: (top_score * 1.5).min(EXACT_CONFIDENCE_CAP),
            }
        } else if top_score >= thresholds.good {
            KbSearchResult {
                match_type: KbMatchType::Good,
                article: Some(top_article.clone()),
                suggestions: positive(&scored[1..], GOOD_RUNNER_UPS),
                confidence: top_score * 1.2,
            }
        } else if top_score >= thresholds.partial {
            KbSearchResult {
                match_type: KbMatchType::Partial,
                article: None,
                suggestions: positive(&scored, PARTIAL_SUGGESTIONS),
                confidence: top_score,
            }
        } else {
            KbSearchResult::no_match()
        }
    }

    fn shortcut_match(&self, normalized: &str, corpus: &[KbArticle]) -> Option<KbSearchResult> {
        let (_, slug) = self
            .shortcuts
            .iter()
            .find(|(regex, _)| regex.is_match(normalized))?;
        match corpus.iter().find(|article| &article.slug == slug) {
            Some(article) => Some(KbSearchResult {
                match_type: KbMatchType::Exact,
                article: Some(article.clone()),
                suggestions: Vec::new(),
                confidence: SHORTCUT_CONFIDENCE,
            }),
            None => {
                debug!("kb shortcut slug missing from corpus (slug={slug})");
                None
            }
        }
    }
}

/// Leading entries with a positive score.
fn positive(scored: &[(f32, &KbArticle)], limit: usize) -> Vec<KbArticle> {
    scored
        .iter()
        .filter(|(score, _)| *score > 0.0)
        .take(limit)
        .map(|(_, article)| (*article).clone())
        .collect()
}

fn score_article(normalized: &str, message_words: &HashSet<String>, article: &KbArticle) -> f32 {
    let keywords = keyword_overlap(normalized, &article.keywords);
    let question = jaccard(message_words, &word_set(&article.question.to_lowercase()));
    let alternate = article
        .alternate_questions
        .iter()
        .map(|alt| jaccard(message_words, &word_set(&alt.to_lowercase())))
        .fold(0.0_f32, f32::max);
    KEYWORD_WEIGHT * keywords + QUESTION_WEIGHT * question + ALTERNATE_WEIGHT * alternate
}

/// Fraction of the leading keywords that occur in the message.
pub(crate) fn keyword_overlap(normalized: &str, keywords: &[String]) -> f32 {
    let scored: Vec<&String> = keywords.iter().take(SCORED_KEYWORDS).collect();
    if scored.is_empty() {
        return 0.0;
    }
    let hits = scored
        .iter()
        .filter(|keyword| {
            let keyword = keyword.trim().to_lowercase();
            !keyword.is_empty() && normalized.contains(&keyword)
        })
        .count();
    hits as f32 / scored.len() as f32
}

/// Lowercased alphanumeric words of two or more characters.
pub(crate) fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

pub(crate) fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

#[cfg(test)]
mod tests {
    use super::{KbSearcher, SearchThresholds, jaccard, keyword_overlap, word_set};
    use crate::model::{KbArticle, KbMatchType};
    use crate::shortcuts::ShortcutSpec;
    use pretty_assertions::assert_eq;

    fn article(slug: &str, question: &str, alternates: &[&str], keywords: &[&str]) -> KbArticle {
        KbArticle {
            id: format!("id-{slug}"),
            slug: slug.to_string(),
            category: "general".to_string(),
            question: question.to_string(),
            alternate_questions: alternates.iter().map(|s| s.to_string()).collect(),
            answer: format!("answer for {slug}"),
            short_answer: String::new(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            related_articles: Vec::new(),
        }
    }

    fn corpus() -> Vec<KbArticle> {
        vec![
            article(
                "how-to-create-budget",
                "How do I create a budget?",
                &["How can I set up a monthly budget?"],
                &["budget", "create", "monthly"],
            ),
            article(
                "what-is-health-score",
                "What is my financial health score?",
                &["How is the health score calculated?"],
                &["health score", "score", "financial health"],
            ),
            article(
                "export-data",
                "How do I export my transactions?",
                &["Can I download my data as CSV?"],
                &["export", "csv", "download"],
            ),
        ]
    }

    #[test]
    fn word_set_drops_short_words_and_punctuation() {
        let words = word_set("how do i create a budget?");
        let mut words: Vec<_> = words.into_iter().collect();
        words.sort();
        assert_eq!(words, vec!["budget", "create", "do", "how"]);
    }

    #[test]
    fn jaccard_of_empty_sets_is_zero() {
        assert_eq!(jaccard(&word_set(""), &word_set("a")), 0.0);
    }

    #[test]
    fn keyword_overlap_scores_first_three_only() {
        let keywords: Vec<String> = ["budget", "create", "monthly", "savings"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let overlap = keyword_overlap("my savings budget", &keywords);
        assert!((overlap - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(keyword_overlap("anything", &[]), 0.0);
    }

    #[test]
    fn shortcut_hit_returns_exact() {
        let searcher = KbSearcher::with_defaults().expect("searcher");
        let result = searcher.search("How do I create a budget?", &corpus());
        assert_eq!(result.match_type, KbMatchType::Exact);
        assert_eq!(result.confidence, 0.97);
        assert_eq!(
            result.article.map(|a| a.slug),
            Some("how-to-create-budget".to_string())
        );
    }

    #[test]
    fn shortcut_beats_a_higher_scoring_article() {
        let corpus = vec![
            article("budget-basics", "How do I create a budget?", &[], &["budget", "create"]),
            article("how-to-create-budget", "Planning tools overview", &[], &["planning"]),
        ];
        let message = "How do I create a budget?";

        let scoring_only = KbSearcher::new(&[], SearchThresholds::default()).expect("searcher");
        let scored = scoring_only.search(message, &corpus);
        assert_eq!(scored.match_type, KbMatchType::Exact);
        assert_eq!(scored.article.map(|a| a.slug), Some("budget-basics".to_string()));

        let searcher = KbSearcher::with_defaults().expect("searcher");
        let result = searcher.search(message, &corpus);
        assert_eq!(result.match_type, KbMatchType::Exact);
        assert_eq!(result.confidence, 0.97);
        assert_eq!(
            result.article.map(|a| a.slug),
            Some("how-to-create-budget".to_string())
        );
    }

    #[test]
    fn bare_cancel_question_hits_shortcut() {
        let mut corpus = corpus();
        corpus.push(article(
            "cancel-subscription",
            "How do I cancel my subscription?",
            &[],
            &["cancel", "subscription"],
        ));
        let searcher = KbSearcher::with_defaults().expect("searcher");
        for message in ["How do I cancel?", "how can i cancel", "Cancel my membership"] {
            let result = searcher.search(message, &corpus);
            assert_eq!(result.match_type, KbMatchType::Exact, "{message}");
            assert_eq!(result.confidence, 0.97);
            assert_eq!(
                result.article.map(|a| a.slug),
                Some("cancel-subscription".to_string())
            );
        }
    }

    #[test]
    fn repeated_search_returns_the_same_result() {
        let searcher = KbSearcher::with_defaults().expect("searcher");
        let corpus = corpus();
        for message in [
            "How do I create a budget?",
            "how do i export my transactions",
            "download csv please",
            "zzz qqq",
        ] {
            assert_eq!(
                searcher.search(message, &corpus),
                searcher.search(message, &corpus),
                "{message}"
            );
        }
    }

    #[test]
    fn chosen_article_is_never_repeated_in_suggestions() {
        let thresholds = SearchThresholds {
            exact: 0.99,
            good: 0.10,
            partial: 0.05,
        };
        let searcher = KbSearcher::new(&[], thresholds).expect("searcher");
        let corpus = corpus();
        for message in [
            "what is my financial health score",
            "how do i export my data",
            "create a monthly budget",
        ] {
            let result = searcher.search(message, &corpus);
            let chosen = result.article.as_ref().map(|a| a.slug.as_str());
            assert!(chosen.is_some(), "{message}");
            assert!(
                result
                    .suggestions
                    .iter()
                    .all(|s| Some(s.slug.as_str()) != chosen),
                "{message}"
            );
        }
    }

    #[test]
    fn shortcut_with_missing_slug_falls_through_to_scoring() {
        let shortcuts = vec![ShortcutSpec::new(r"export", "not-in-corpus")];
        let searcher = KbSearcher::new(&shortcuts, SearchThresholds::default()).expect("searcher");
        let result = searcher.search("how do i export my transactions", &corpus());
        assert_eq!(result.match_type, KbMatchType::Good);
        assert_eq!(result.article.map(|a| a.slug), Some("export-data".to_string()));
        assert!(result.confidence < 0.97);
    }

    #[test]
    fn scored_exact_confidence_is_capped() {
        let searcher = KbSearcher::new(&[], SearchThresholds::default()).expect("searcher");
        let result = searcher.search("How do I create a budget monthly?", &corpus());
        assert_eq!(result.match_type, KbMatchType::Exact);
        assert!(result.confidence <= 0.98);
        assert!(result.confidence > 0.55);
    }

    #[test]
    fn good_match_carries_runner_ups() {
        let thresholds = SearchThresholds {
            exact: 0.99,
            good: 0.30,
            partial: 0.20,
        };
        let searcher = KbSearcher::new(&[], thresholds).expect("searcher");
        let result = searcher.search("what is my financial health score", &corpus());
        assert_eq!(result.match_type, KbMatchType::Good);
        assert_eq!(
            result.article.as_ref().map(|a| a.slug.as_str()),
            Some("what-is-health-score")
        );
        assert!(result.suggestions.len() <= 2);
        assert!(
            result
                .suggestions
                .iter()
                .all(|s| s.slug != "what-is-health-score")
        );
    }

    #[test]
    fn partial_match_has_no_article() {
        let thresholds = SearchThresholds {
            exact: 0.99,
            good: 0.98,
            partial: 0.10,
        };
        let searcher = KbSearcher::new(&[], thresholds).expect("searcher");
        let result = searcher.search("download csv please", &corpus());
        assert_eq!(result.match_type, KbMatchType::Partial);
        assert!(result.article.is_none());
        assert_eq!(result.suggestions[0].slug, "export-data");
        assert!(result.suggestions.len() <= 3);
    }

    #[test]
    fn unrelated_message_is_no_match() {
        let searcher = KbSearcher::with_defaults().expect("searcher");
        let result = searcher.search("zzz qqq", &corpus());
        assert_eq!(result.match_type, KbMatchType::NoMatch);
        assert_eq!(result.confidence, 0.0);
        assert!(result.article.is_none());
    }

    #[test]
    fn empty_corpus_is_no_match() {
        let searcher = KbSearcher::with_defaults().expect("searcher");
        let result = searcher.search("How do I create a budget?", &[]);
        assert_eq!(result.match_type, KbMatchType::NoMatch);
    }

    #[test]
    fn invalid_shortcut_pattern_is_rejected() {
        let shortcuts = vec![ShortcutSpec::new("(unclosed", "slug")];
        let err = KbSearcher::new(&shortcuts, SearchThresholds::default()).unwrap_err();
        assert!(format!("{err}").contains("(unclosed"));
    }

    #[test]
    fn ties_keep_corpus_order() {
        let twins = vec![
            article("first", "alpha beta", &[], &["gamma"]),
            article("second", "alpha beta", &[], &["gamma"]),
        ];
        let searcher = KbSearcher::new(&[], SearchThresholds::default()).expect("searcher");
        let result = searcher.search("alpha beta gamma", &twins);
        assert_eq!(result.article.map(|a| a.slug), Some("first".to_string()));
    }
}
