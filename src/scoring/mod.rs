//! Productivity scoring collaborators.
//!
//! The engine only needs the [`Scorer`] trait. [`KeywordScorer`] is the
//! built-in implementation: past user corrections for identical details win,
//! otherwise a keyword table decides the class.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::models::{ScoreCorrection, MAX_SCORE, MIN_SCORE};
use crate::error::EngineResult;

pub const PRODUCTIVE_SCORE: i32 = 6;
pub const UNPRODUCTIVE_SCORE: i32 = -6;
pub const NEUTRAL_SCORE: i32 = 0;

const PRODUCTIVE_KEYWORDS: &[&str] = &[
    "localhost",
    "github",
    "stackoverflow",
    "documentation",
    "vscode",
    "terminal",
    "python",
    "code",
    "programming",
    "development",
    "docs",
    "api",
    "database",
    "sql",
];

const UNPRODUCTIVE_KEYWORDS: &[&str] = &[
    "youtube",
    "facebook",
    "instagram",
    "tiktok",
    "netflix",
    "gaming",
    "memes",
    "twitter",
    "x.com",
    "entertainment",
    "sports",
    "news",
    "reddit",
];

const NEUTRAL_KEYWORDS: &[&str] = &[
    "email",
    "calendar",
    "google",
    "search",
    "weather",
    "maps",
    "settings",
    "preferences",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    pub score: i32,
    pub reasoning: String,
}

impl ScoreResult {
    pub fn new(score: i32, reasoning: impl Into<String>) -> Self {
        Self {
            score: score.clamp(MIN_SCORE, MAX_SCORE),
            reasoning: reasoning.into(),
        }
    }
}

#[async_trait]
pub trait Scorer: Send + Sync {
    /// Score free-text activity details on the [-10, 10] scale.
    ///
    /// `corrections` are the user's recent overrides, newest first.
    async fn score(
        &self,
        details: &str,
        corrections: &[ScoreCorrection],
    ) -> EngineResult<ScoreResult>;
}

#[derive(Debug, Clone, Default)]
pub struct KeywordScorer;

impl KeywordScorer {
    pub fn new() -> Self {
        Self
    }

    fn score_details(&self, details: &str, corrections: &[ScoreCorrection]) -> ScoreResult {
        let normalized = details.trim().to_lowercase();

        if let Some(correction) = corrections
            .iter()
            .find(|c| c.details.trim().to_lowercase() == normalized)
        {
            return ScoreResult::new(
                correction.corrected_score,
                "matches a previous user correction",
            );
        }

        if let Some(keyword) = first_match(&normalized, PRODUCTIVE_KEYWORDS) {
            return ScoreResult::new(PRODUCTIVE_SCORE, format!("productive keyword '{keyword}'"));
        }
        if let Some(keyword) = first_match(&normalized, UNPRODUCTIVE_KEYWORDS) {
            return ScoreResult::new(
                UNPRODUCTIVE_SCORE,
                format!("unproductive keyword '{keyword}'"),
            );
        }
        if let Some(keyword) = first_match(&normalized, NEUTRAL_KEYWORDS) {
            return ScoreResult::new(NEUTRAL_SCORE, format!("neutral keyword '{keyword}'"));
        }

        ScoreResult::new(NEUTRAL_SCORE, "no known keywords")
    }
}

fn first_match<'a>(details: &str, keywords: &[&'a str]) -> Option<&'a str> {
    keywords.iter().copied().find(|k| details.contains(k))
}

#[async_trait]
impl Scorer for KeywordScorer {
    async fn score(
        &self,
        details: &str,
        corrections: &[ScoreCorrection],
    ) -> EngineResult<ScoreResult> {
        Ok(self.score_details(details, corrections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keyword_classes() {
        let scorer = KeywordScorer::new();
        let productive = scorer.score("Terminal | cargo test", &[]).await.unwrap();
        assert_eq!(productive.score, PRODUCTIVE_SCORE);

        let unproductive = scorer.score("Safari | YouTube - Trailers", &[]).await.unwrap();
        assert_eq!(unproductive.score, UNPRODUCTIVE_SCORE);

        let neutral = scorer.score("Mail | email from bank", &[]).await.unwrap();
        assert_eq!(neutral.score, NEUTRAL_SCORE);

        let unknown = scorer.score("Finder | Downloads", &[]).await.unwrap();
        assert_eq!(unknown.score, NEUTRAL_SCORE);
        assert_eq!(unknown.reasoning, "no known keywords");
    }

    #[tokio::test]
    async fn test_correction_overrides_keywords() {
        let scorer = KeywordScorer::new();
        let corrections = vec![
            ScoreCorrection {
                details: "safari | youtube - rust conference talk".into(),
                prior_score: Some(-6),
                corrected_score: 9,
            },
            ScoreCorrection {
                details: "Safari | YouTube - Rust conference talk".into(),
                prior_score: Some(-6),
                corrected_score: 3,
            },
        ];
        let result = scorer
            .score("Safari | YouTube - Rust conference talk ", &corrections)
            .await
            .unwrap();
        // Newest correction first.
        assert_eq!(result.score, 9);
    }

    #[test]
    fn test_scores_are_clamped() {
        assert_eq!(ScoreResult::new(42, "x").score, MAX_SCORE);
        assert_eq!(ScoreResult::new(-42, "x").score, MIN_SCORE);
    }
}
