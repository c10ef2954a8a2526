//! Keyword-based question domains and their fallback base rates.
//!
//! Used when no probability can be recovered from model output, and as the
//! last-resort anchor for calibration when nobody reported a base rate.

use serde::{Deserialize, Serialize};

/// Coarse topic class of a forecast question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionDomain {
    Technology,
    Climate,
    Sports,
    Publishing,
    Politics,
    Entertainment,
    General,
}

/// Classification order. The first domain with a keyword hit wins.
const KEYWORDS: &[(QuestionDomain, &[&str])] = &[
    (
        QuestionDomain::Technology,
        &[
            "artificial intelligence",
            " ai ",
            " ai-",
            "technology",
            "software",
            "algorithm",
            "computer",
            "machine learning",
            "chatgpt",
            "openai",
            "bitcoin",
            "crypto",
        ],
    ),
    (
        QuestionDomain::Climate,
        &["temperature", "climate", "warming", "weather", "emissions", "hurricane"],
    ),
    (
        QuestionDomain::Sports,
        &["olympic", "medal", "sport", "championship", "race", "tournament", "world cup"],
    ),
    (
        QuestionDomain::Publishing,
        &["publish", "book", "novel", "author", "bestseller"],
    ),
    (
        QuestionDomain::Politics,
        &["diplomatic", "political", "government", "policy", "election", "president", "treaty"],
    ),
    (
        QuestionDomain::Entertainment,
        &["movie", "film", "album", "box office", "award", "oscar", "grammy"],
    ),
];

impl QuestionDomain {
    /// Classify by keyword match. Pure function of the text.
    pub fn classify(question: &str) -> Self {
        // Pad so word-boundary keywords like " ai " match at the edges.
        let haystack = format!(
            " {} ",
            question
                .to_lowercase()
                .replace(|c: char| !c.is_alphanumeric() && c != '-', " ")
        );
        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| haystack.contains(w)))
            .map(|(domain, _)| *domain)
            .unwrap_or(Self::General)
    }

    /// Default probability used when extraction fails for this domain.
    pub fn fallback_probability(self) -> f64 {
        match self {
            Self::Technology => 0.65,
            Self::Climate => 0.70,
            Self::Sports => 0.55,
            Self::Publishing => 0.35,
            Self::Politics => 0.25,
            Self::Entertainment => 0.40,
            Self::General => 0.50,
        }
    }
}

impl std::fmt::Display for QuestionDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Technology => write!(f, "technology"),
            Self::Climate => write!(f, "climate"),
            Self::Sports => write!(f, "sports"),
            Self::Publishing => write!(f, "publishing"),
            Self::Politics => write!(f, "politics"),
            Self::Entertainment => write!(f, "entertainment"),
            Self::General => write!(f, "general"),
        }
    }
}

/// Shorthand for `QuestionDomain::classify(q).fallback_probability()`.
pub fn fallback_probability(question: &str) -> f64 {
    QuestionDomain::classify(question).fallback_probability()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_each_domain() {
        let cases = [
            ("Will OpenAI release a new AI model?", QuestionDomain::Technology),
            ("Will global temperature rise by 1.5C?", QuestionDomain::Climate),
            ("Will Kenya win an Olympic medal?", QuestionDomain::Sports),
            ("Will the author publish a sequel?", QuestionDomain::Publishing),
            ("Will the election be postponed?", QuestionDomain::Politics),
            ("Will the film gross $1B at the box office?", QuestionDomain::Entertainment),
            ("Will the river flood?", QuestionDomain::General),
        ];
        for (q, expected) in cases {
            assert_eq!(QuestionDomain::classify(q), expected, "{q}");
        }
    }

    #[test]
    fn test_ai_needs_word_boundary() {
        // "said" and "again" contain "ai" but are not about AI.
        assert_eq!(
            QuestionDomain::classify("The mayor said the bridge will open again"),
            QuestionDomain::General
        );
        assert_eq!(QuestionDomain::classify("AI beats humans?"), QuestionDomain::Technology);
    }

    #[test]
    fn test_fallback_values() {
        assert_eq!(fallback_probability("new software launch"), 0.65);
        assert_eq!(fallback_probability("climate accord"), 0.70);
        assert_eq!(fallback_probability("championship final"), 0.55);
        assert_eq!(fallback_probability("novel prize shortlist"), 0.35);
        assert_eq!(fallback_probability("government shutdown"), 0.25);
        assert_eq!(fallback_probability("album release"), 0.40);
        assert_eq!(fallback_probability("anything else"), 0.50);
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let q = "Will the diplomatic talks resume?";
        let first = fallback_probability(q);
        for _ in 0..10 {
            assert_eq!(fallback_probability(q), first);
        }
    }
}
