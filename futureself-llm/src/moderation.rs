//! Phrase-list content moderation.

use crate::ModerationFilter;
use futureself_core::ModerationVerdict;

/// Phrases a financial letter must never contain.
const DEFAULT_BANNED_PHRASES: &[&str] = &[
    "guaranteed return",
    "risk-free",
    "can't lose",
    "cannot lose",
    "get rich quick",
    "financial advice",
];

/// Flags content containing any banned phrase, case-insensitively.
#[derive(Debug, Clone)]
pub struct KeywordModeration {
    banned: Vec<String>,
}

impl KeywordModeration {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            banned: phrases
                .into_iter()
                .map(|p| p.into().to_lowercase())
                .collect(),
        }
    }
}

impl Default for KeywordModeration {
    fn default() -> Self {
        Self::new(DEFAULT_BANNED_PHRASES.iter().copied())
    }
}

impl ModerationFilter for KeywordModeration {
    fn moderate(&self, content: &str) -> ModerationVerdict {
        let lowered = content.to_lowercase();
        let flags: Vec<String> = self
            .banned
            .iter()
            .filter(|phrase| lowered.contains(phrase.as_str()))
            .cloned()
            .collect();
        if flags.is_empty() {
            ModerationVerdict::pass()
        } else {
            ModerationVerdict::flagged(flags)
        }
    }
}
