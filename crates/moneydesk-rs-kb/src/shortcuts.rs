//! Built-in shortcut rules: common phrasings that map straight to an article.

/// Uncompiled shortcut rule. Patterns run against the lowercased, trimmed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutSpec {
    pub pattern: String,
    pub slug: String,
}

impl ShortcutSpec {
    pub fn new(pattern: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            slug: slug.into(),
        }
    }
}

/// Ordered (pattern, slug) pairs; first match wins.
const BUILTIN: &[(&str, &str)] = &[
    (
        r"\b(how (do|can|should) i|help me) (create|make|set up|setup|start|build) (a |my |an )?(monthly )?budget\b",
        "how-to-create-budget",
    ),
    (
        r"\b(what is|what's|whats|explain|how is) (my |the )?(financial )?health score\b",
        "what-is-health-score",
    ),
    (
        r"\b(cancel|end|stop) (my )?(subscription|membership|plan)\b|\bhow (do|can) i cancel\b",
        "cancel-subscription",
    ),
    (
        r"\b(connect|link|add|sync) (a |my |another )?(bank|bank account|credit card)\b",
        "connect-bank-account",
    ),
    (
        r"\b(export|download) (all )?(my )?(data|transactions)\b",
        "export-data",
    ),
    (
        r"\b(reset|change|forgot|forgotten) (my )?password\b",
        "reset-password",
    ),
    (r"\b(delete|close|remove) (my )?account\b", "delete-account"),
    (
        r"\b(upgrade|change) (my )?(plan|tier|subscription)\b",
        "upgrade-plan",
    ),
];

/// Built-in shortcut list used when config does not supply one.
pub fn builtin_shortcuts() -> Vec<ShortcutSpec> {
    BUILTIN
        .iter()
        .map(|(pattern, slug)| ShortcutSpec::new(*pattern, *slug))
        .collect()
}
