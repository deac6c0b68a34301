//! Exact Top-K cosine-similarity classification.
//!
//! Every enrolled template competes individually: the query is compared with
//! each entry of each category, so one category can fill several of the K
//! slots when several of its templates score well.
//!
//! Ranking rules:
//! 1. Score is cosine similarity; a zero-norm vector on either side never
//!    matches (scored `-inf` and dropped)
//! 2. Scores below the threshold are dropped (`score >= threshold` is kept)
//! 3. Higher scores first; equal scores order by category name ascending,
//!    then by enrollment order
//! 4. At most `k` results; `k == 0` yields an empty list

// Allow cast precision loss for candidate counts recorded as metrics.
#![allow(clippy::cast_precision_loss)]

use crate::models::{MatchResult, Recognition};
use crate::storage::TemplateSnapshot;
use crate::{Error, Result};
use std::cmp::Ordering;
use std::time::Instant;

/// Computes cosine similarity between two vectors.
///
/// Returns a value in `[-1, 1]`, or `f32::NEG_INFINITY` when either vector
/// has zero norm or the lengths differ. Accumulates in `f64`, so the result
/// is symmetric and `sim(a, c·a) == 1` for any `c > 0` up to rounding.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::NEG_INFINITY;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return f32::NEG_INFINITY;
    }

    (dot / denominator).clamp(-1.0, 1.0) as f32
}

/// Ranks every template in `snapshot` against `query`, best first.
///
/// Only finite scores are returned.
fn rank<'a>(query: &[f32], snapshot: &'a TemplateSnapshot) -> Result<Vec<(&'a str, f32)>> {
    // An empty store answers every query with no matches, even one whose
    // length no longer fits the dimensionality left by deleted templates.
    let Some(dimensions) = snapshot.dimensions().filter(|_| !snapshot.is_empty()) else {
        return Ok(Vec::new());
    };
    if query.len() != dimensions {
        return Err(Error::DimensionMismatch {
            expected: dimensions,
            actual: query.len(),
        });
    }
    crate::embedding::validate_embedding(query)?;

    let mut scored: Vec<(&str, f32)> = snapshot
        .entries()
        .map(|(category, entry)| (category, cosine_similarity(query, &entry.embedding)))
        .filter(|(_, score)| score.is_finite())
        .collect();

    // Stable sort keeps enrollment order among identical (score, category) pairs.
    scored.sort_by(|a, b| compare_ranked(*a, *b));
    Ok(scored)
}

fn compare_ranked(a: (&str, f32), b: (&str, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0))
}

fn check_threshold(threshold: f32) -> Result<()> {
    if threshold.is_nan() {
        return Err(Error::InvalidInput("threshold must not be NaN".to_string()));
    }
    Ok(())
}

/// Returns up to `k` templates scoring at least `threshold`, best first.
///
/// An empty store yields an empty list for any query.
///
/// # Errors
///
/// - [`Error::DimensionMismatch`] if the query length differs from the store's
/// - [`Error::InvalidEmbedding`] if the query has non-finite components
/// - [`Error::InvalidInput`] if `threshold` is NaN
pub fn classify(
    query: &[f32],
    snapshot: &TemplateSnapshot,
    threshold: f32,
    k: usize,
) -> Result<Vec<MatchResult>> {
    check_threshold(threshold)?;
    let start = Instant::now();
    let ranked = rank(query, snapshot)?;
    let candidates = ranked.len();

    let results: Vec<MatchResult> = ranked
        .into_iter()
        .take_while(|(_, score)| *score >= threshold)
        .take(k)
        .map(|(category, score)| MatchResult::new(category, score))
        .collect();

    metrics::counter!("dishmatch_classify_total").increment(1);
    metrics::histogram!("dishmatch_classify_candidates").record(candidates as f64);
    tracing::debug!(
        candidates,
        matches = results.len(),
        threshold,
        k,
        elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
        "Classified query"
    );
    Ok(results)
}

/// Returns the single best template if it passes `threshold`.
///
/// When nothing passes, the best score seen is still reported so front-ends
/// can show how close the query came.
///
/// # Errors
///
/// Same as [`classify`].
pub fn best_match(query: &[f32], snapshot: &TemplateSnapshot, threshold: f32) -> Result<Recognition> {
    check_threshold(threshold)?;
    let ranked = rank(query, snapshot)?;

    Ok(match ranked.first() {
        Some(&(category, score)) if score >= threshold => {
            Recognition::Matched(MatchResult::new(category, score))
        },
        best => Recognition::Unrecognized {
            best_score: best.map(|&(_, score)| score),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArtifactRef, TemplateEntry};
    use std::collections::BTreeMap;

    fn snapshot(entries: &[(&str, Vec<f32>)]) -> TemplateSnapshot {
        let mut categories: BTreeMap<String, Vec<TemplateEntry>> = BTreeMap::new();
        let mut dimensions = None;
        for (i, (category, embedding)) in entries.iter().enumerate() {
            dimensions.get_or_insert(embedding.len());
            categories
                .entry((*category).to_string())
                .or_default()
                .push(TemplateEntry::new(
                    embedding.clone(),
                    ArtifactRef::new(format!("{category}/{i}.jpg")),
                ));
        }
        TemplateSnapshot::from_parts(dimensions, categories)
    }

    #[test]
    fn test_cosine_similarity() {
        let v1 = [1.0, 0.0, 0.0];
        assert!((cosine_similarity(&v1, &v1) - 1.0).abs() < 1e-6);

        let v2 = [0.0, 1.0, 0.0];
        assert!(cosine_similarity(&v1, &v2).abs() < 1e-6);

        let v3 = [-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&v1, &v3) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_scaled_self_is_one() {
        let v = [0.3, -1.2, 4.5, 0.01];
        let scaled: Vec<f32> = v.iter().map(|x| x * 1000.0).collect();
        assert!((cosine_similarity(&v, &scaled) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_norm_never_matches() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), f32::NEG_INFINITY);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), f32::NEG_INFINITY);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), f32::NEG_INFINITY);
    }

    #[test]
    fn test_classify_apple_banana() {
        let snap = snapshot(&[("apple", vec![1.0, 0.0, 0.0]), ("banana", vec![0.0, 1.0, 0.0])]);

        let results = classify(&[0.9, 0.1, 0.0], &snap, 0.5, 3).expect("classify");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].category, "apple");
        assert!((results[0].score - 0.993_883_7).abs() < 1e-4);
    }

    #[test]
    fn test_classify_empty_store() {
        let snap = TemplateSnapshot::new();
        let results = classify(&[0.1, 0.2], &snap, -1.0, 5).expect("classify");
        assert!(results.is_empty());
    }

    #[test]
    fn test_classify_ties_break_by_category_name() {
        // Both templates are equally far from the query.
        let snap = snapshot(&[("B", vec![0.8, 0.6]), ("A", vec![0.8, -0.6])]);
        let results = classify(&[1.0, 0.0], &snap, 0.0, 2).expect("classify");

        let names: Vec<&str> = results.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(results[0].score, results[1].score);
    }

    #[test]
    fn test_classify_threshold_is_inclusive() {
        let snap = snapshot(&[("apple", vec![1.0, 0.0])]);
        let exact = classify(&[1.0, 0.0], &snap, 1.0, 1).expect("classify");
        assert_eq!(exact.len(), 1);
    }

    #[test]
    fn test_classify_same_category_can_fill_top_k() {
        let snap = snapshot(&[
            ("apple", vec![1.0, 0.0]),
            ("apple", vec![0.95, 0.05]),
            ("banana", vec![0.5, 0.5]),
        ]);
        let results = classify(&[1.0, 0.0], &snap, 0.0, 2).expect("classify");

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.category == "apple"));
    }

    #[test]
    fn test_classify_k_zero_is_empty() {
        let snap = snapshot(&[("apple", vec![1.0, 0.0])]);
        assert!(classify(&[1.0, 0.0], &snap, -1.0, 0).expect("classify").is_empty());
    }

    #[test]
    fn test_classify_zero_norm_entries_never_match() {
        let snap = snapshot(&[("blank", vec![0.0, 0.0]), ("apple", vec![1.0, 0.0])]);
        let results = classify(&[1.0, 0.0], &snap, f32::NEG_INFINITY, 5).expect("classify");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].category, "apple");

        let zero_query = classify(&[0.0, 0.0], &snap, f32::NEG_INFINITY, 5).expect("classify");
        assert!(zero_query.is_empty());
    }

    #[test]
    fn test_classify_rejects_wrong_dimension_and_nan() {
        let snap = snapshot(&[("apple", vec![1.0, 0.0])]);
        assert!(matches!(
            classify(&[1.0, 0.0, 0.0], &snap, 0.5, 3),
            Err(Error::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert!(matches!(
            classify(&[f32::NAN, 0.0], &snap, 0.5, 3),
            Err(Error::InvalidEmbedding(_))
        ));
        assert!(matches!(
            classify(&[1.0, 0.0], &snap, f32::NAN, 3),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_best_match() {
        let snap = snapshot(&[("apple", vec![1.0, 0.0, 0.0]), ("banana", vec![0.0, 1.0, 0.0])]);

        let matched = best_match(&[0.9, 0.1, 0.0], &snap, 0.7).expect("best");
        assert_eq!(matched.matched().map(|m| m.category.as_str()), Some("apple"));

        let unrecognized = best_match(&[0.0, 0.0, 1.0], &snap, 0.7).expect("best");
        assert!(matches!(
            unrecognized,
            Recognition::Unrecognized { best_score: Some(score) } if score.abs() < 1e-6
        ));

        let empty = best_match(&[1.0], &TemplateSnapshot::new(), 0.7).expect("best");
        assert_eq!(empty, Recognition::Unrecognized { best_score: None });
    }
}
