//! Classification results.

use serde::Serialize;

/// A single ranked match: one enrolled template's category and its score.
///
/// Scores are cosine similarities in `[-1, 1]`. Results are query-scoped and
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Category (dish) name of the matching template.
    pub category: String,
    /// Cosine similarity between the query and the template.
    pub score: f32,
}

impl MatchResult {
    /// Creates a new match result.
    #[must_use]
    pub fn new(category: impl Into<String>, score: f32) -> Self {
        Self {
            category: category.into(),
            score,
        }
    }
}

/// Outcome of single-best recognition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Recognition {
    /// The best template scored at or above the threshold.
    Matched(MatchResult),
    /// Nothing passed the threshold.
    Unrecognized {
        /// Highest finite score seen, if the store held any comparable template.
        best_score: Option<f32>,
    },
}

impl Recognition {
    /// Returns the match, if any.
    #[must_use]
    pub const fn matched(&self) -> Option<&MatchResult> {
        match self {
            Self::Matched(result) => Some(result),
            Self::Unrecognized { .. } => None,
        }
    }
}
