//! Two-stage intent classifier: an ordered pattern screen, then lexical heuristics.

use crate::error::RouterError;
use moneydesk_rs_protocol::{ClassificationResult, Intent};
use regex::Regex;

/// Stage A results at or above this confidence skip Stage B.
const PATTERN_SHORT_CIRCUIT: f32 = 0.90;

/// Fixed finance vocabulary, matched as substrings of the normalized message.
/// No term may contain another, so one word counts once.
const FINANCE_TERMS: &[&str] = &[
    "budget",
    "saving",
    "invest",
    "portfolio",
    "stocks",
    "bonds",
    "index fund",
    "mutual fund",
    "dividend",
    "retirement",
    "401k",
    "401(k)",
    "roth ira",
    "pension",
    "annuity",
    "debt",
    "loan",
    "mortgage",
    "refinanc",
    "interest rate",
    "annual percentage",
    "credit card",
    "credit score",
    "credit report",
    "credit limit",
    "balance transfer",
    "paycheck",
    "salary",
    "income",
    "expense",
    "net worth",
    "taxes",
    "tax return",
    "tax refund",
    "deduction",
    "withholding",
    "inflation",
    "overdraft",
    "checking account",
    "bank account",
    "transaction",
    "subscription",
    "bills",
    "billing",
    "rental",
    "landlord",
    "insurance",
    "premium",
    "deductible",
    "collateral",
    "bankruptcy",
    "collections",
    "equity",
    "crypto",
    "bitcoin",
    "brokerage",
    "capital gains",
    "compound interest",
    "financial",
    "finance",
    "money",
    "afford",
    "payment",
    "installment",
    "emergency fund",
    "side hustle",
    "frugal",
    "wealth",
    "allowance",
    "credit union",
    "late fee",
    "bank fees",
    "costs",
    "stock market",
    "etfs",
    "cash",
    "spend",
];

const FIRST_PERSON: &str = r"\b(i|i'm|im|i've|i'd|i'll|me|my|mine|myself|we|our|us|ours)\b";

/// Stage A rules, in evaluation order:
/// (intent, confidence, max words, skipped when finance terms are present, pattern).
const PATTERN_RULES: &[(Intent, f32, Option<usize>, bool, &str)] = &[
    (
        Intent::Greeting,
        0.95,
        Some(5),
        false,
        r"^(hi|hello|hey|hiya|howdy|yo|greetings|good (morning|afternoon|evening)|what'?s up)\b",
    ),
    (
        Intent::Thanks,
        0.95,
        Some(6),
        false,
        r"\b(thanks|thank you|thx|ty|much appreciated|appreciate it|cheers)\b|^(ok|okay|cool|great|perfect|awesome|nice|got it)[\s.!]*$",
    ),
    (
        Intent::Abuse,
        0.95,
        None,
        false,
        concat!(
            r"\b(ignore|disregard|forget) (all |any |your |the )?(previous|prior|above|earlier|your) (instructions|prompts?|rules)",
            r"|\byou are now\b",
            r"|\byou (will|must|should|are going to|are to) (now )?act as\b",
            r"|\bact as (an? )?(unrestricted|unfiltered|uncensored|jailbroken|evil|dan)\b",
            r"|\bpretend (to be|you are|you're)\b",
            r"|\bjailbreak",
            r"|\bdo anything now\b|\bdan mode\b",
            r"|\bdeveloper mode\b",
            r"|\b(reveal|show|print|repeat|leak) (me )?(your (system prompt|hidden prompt|instructions|rules)|the (system|hidden) prompt)",
            r"|<\|im_start\|>|<\|im_end\|>|<\|system\|>|\[/?inst\]|<</?sys>>",
        ),
    ),
    (
        Intent::OffTopic,
        0.90,
        None,
        false,
        concat!(
            r"\b(write|compose|tell) (me )?(a |an )?(poem|story|song|haiku|limerick|joke|rap)",
            r"|\b(poem|haiku|limerick|lyrics)\b",
            r"|\b(recipe|recipes|bake a|cook a)\b",
            r"|\b(trivia|riddle)\b",
            r"|\b(play|let's play) (a )?(game|chess|tic[- ]tac[- ]toe)",
            r"|\bcapital of\b",
        ),
    ),
    (
        Intent::OffTopic,
        0.90,
        None,
        true,
        r"\b(homework|essay|assignment)\b",
    ),
];

struct PatternRule {
    intent: Intent,
    confidence: f32,
    max_words: Option<usize>,
    skip_with_finance_terms: bool,
    regex: Regex,
}

/// Deterministic classifier; construction compiles every pattern once.
pub struct IntentClassifier {
    rules: Vec<PatternRule>,
    first_person: Regex,
}

impl IntentClassifier {
    pub fn new() -> Result<Self, RouterError> {
        let mut rules = Vec::with_capacity(PATTERN_RULES.len());
        for (intent, confidence, max_words, skip_with_finance_terms, pattern) in PATTERN_RULES {
            rules.push(PatternRule {
                intent: *intent,
                confidence: *confidence,
                max_words: *max_words,
                skip_with_finance_terms: *skip_with_finance_terms,
                regex: compile(pattern)?,
            });
        }
        Ok(Self {
            rules,
            first_person: compile(FIRST_PERSON)?,
        })
    }

    /// Label a message. Total: every input yields a result.
    pub fn classify(&self, message: &str) -> ClassificationResult {
        let normalized = message.trim().to_lowercase();
        let words = normalized.split_whitespace().count();

        let score = finance_score(&normalized);
        if let Some(result) = self.pattern_screen(&normalized, words, score) {
            if result.confidence >= PATTERN_SHORT_CIRCUIT {
                return result;
            }
        }

        let personal = self.first_person.is_match(&normalized);
        let (intent, confidence) = match (score, personal) {
            (s, true) if s >= 2 => (Intent::FinancePersonal, 0.88),
            (s, false) if s >= 2 => (Intent::FinanceGeneral, 0.85),
            (1, true) => (Intent::FinancePersonal, 0.75),
            (1, false) => (Intent::FinanceGeneral, 0.70),
            (0, false) if words > 8 => (Intent::OffTopic, 0.70),
            _ => (Intent::FinanceGeneral, 0.50),
        };
        ClassificationResult::new(intent, confidence)
    }

    fn pattern_screen(
        &self,
        normalized: &str,
        words: usize,
        finance_terms: usize,
    ) -> Option<ClassificationResult> {
        self.rules
            .iter()
            .find(|rule| {
                rule.max_words.is_none_or(|max| words <= max)
                    && !(rule.skip_with_finance_terms && finance_terms > 0)
                    && rule.regex.is_match(normalized)
            })
            .map(|rule| ClassificationResult::new(rule.intent, rule.confidence))
    }
}

/// Number of vocabulary terms present in the normalized message.
pub fn finance_score(normalized: &str) -> usize {
    FINANCE_TERMS
        .iter()
        .filter(|term| normalized.contains(*term))
        .count()
}

fn compile(pattern: &str) -> Result<Regex, RouterError> {
    Regex::new(pattern).map_err(|err| RouterError::Setup(format!("classifier pattern: {err}")))
}
