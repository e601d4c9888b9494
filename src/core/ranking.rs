use std::cmp::Ordering;
use std::fmt::Debug;

use crate::models::{Category, CategoryScores, ScoredCandidate};

/// Default cut-off for high-score queries
pub const DEFAULT_HIGH_SCORE_THRESHOLD: f64 = 80.0;

/// Decides which scored candidates count as a "perfect match"
pub trait MatchPolicy: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn is_perfect_match(&self, scores: &CategoryScores, match_score: f64) -> bool;
}

/// Threshold-based perfect-match rule
///
/// Defaults: at least two of {price, property} at 90 or above, at least one
/// category at 80 or above, and a composite of at least 80. The thresholds
/// are a product policy and can be overridden from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    pub primary_threshold: f64,
    pub primary_required: usize,
    pub supporting_threshold: f64,
    pub min_match_score: f64,
}

const PRIMARY_CATEGORIES: [Category; 2] = [Category::Price, Category::Property];

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            primary_threshold: 90.0,
            primary_required: 2,
            supporting_threshold: 80.0,
            min_match_score: 80.0,
        }
    }
}

impl MatchPolicy for ThresholdPolicy {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn is_perfect_match(&self, scores: &CategoryScores, match_score: f64) -> bool {
        let primary_hits = PRIMARY_CATEGORIES
            .iter()
            .filter(|category| scores.get(**category) >= self.primary_threshold)
            .count();

        let supported = scores.iter().any(|(_, score)| score >= self.supporting_threshold);

        primary_hits >= self.primary_required && supported && match_score >= self.min_match_score
    }
}

/// Set the perfect-match flag on every candidate
pub fn classify(candidates: &mut [ScoredCandidate], policy: &dyn MatchPolicy) {
    for candidate in candidates.iter_mut() {
        candidate.is_perfect_match = policy.is_perfect_match(&candidate.scores, candidate.match_score);
    }
}

/// Ranking order: match score, then freshness, then newest, then id
pub fn compare_candidates(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.match_score
        .partial_cmp(&a.match_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.scores
                .freshness
                .partial_cmp(&a.scores.freshness)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| b.property.created_at.cmp(&a.property.created_at))
        .then_with(|| a.property.id.cmp(&b.property.id))
}

pub fn rank(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(compare_candidates);
}

/// Perfect matches from an already ranked set, order preserved
pub fn perfect_matches(ranked: &[ScoredCandidate]) -> Vec<ScoredCandidate> {
    ranked
        .iter()
        .filter(|candidate| candidate.is_perfect_match)
        .cloned()
        .collect()
}

/// Candidates at or above `threshold` from an already ranked set
pub fn above_threshold(ranked: &[ScoredCandidate], threshold: f64) -> Vec<ScoredCandidate> {
    ranked
        .iter()
        .filter(|candidate| candidate.match_score >= threshold)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scoring::neutral_candidate;
    use crate::models::Property;
    use chrono::{Duration, TimeZone, Utc};

    fn candidate(id: &str, match_score: f64, freshness: f64, age_days: i64) -> ScoredCandidate {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap() - Duration::days(age_days);
        let property = Property {
            id: id.to_string(),
            price: 2000,
            bedrooms: 2,
            bathrooms: 1,
            property_type: "flat".to_string(),
            furnishing: None,
            features: Default::default(),
            available_from: None,
            latitude: None,
            longitude: None,
            postcode: None,
            area: None,
            created_at: created,
            operator_id: None,
            media_keys: vec![],
            media_urls: vec![],
        };

        let mut scored = neutral_candidate(property);
        scored.match_score = match_score;
        scored.scores.freshness = freshness;
        scored
    }

    fn ids(candidates: &[ScoredCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.property.id.as_str()).collect()
    }

    #[test]
    fn test_rank_by_score_then_tie_breaks() {
        let mut candidates = vec![
            candidate("low", 40.0, 100.0, 0),
            candidate("tie_stale", 75.0, 20.0, 90),
            candidate("tie_fresh_old", 75.0, 100.0, 3),
            candidate("tie_fresh_new", 75.0, 100.0, 1),
            candidate("top", 90.0, 80.0, 20),
        ];

        rank(&mut candidates);

        assert_eq!(
            ids(&candidates),
            vec!["top", "tie_fresh_new", "tie_fresh_old", "tie_stale", "low"]
        );
    }

    #[test]
    fn test_rank_is_deterministic() {
        let build = || {
            vec![
                candidate("b", 60.0, 80.0, 10),
                candidate("a", 60.0, 80.0, 10),
                candidate("c", 60.0, 80.0, 10),
            ]
        };

        let mut first = build();
        let mut second = build();
        second.reverse();
        rank(&mut first);
        rank(&mut second);

        assert_eq!(ids(&first), vec!["a", "b", "c"]);
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_threshold_policy() {
        let policy = ThresholdPolicy::default();

        let mut strong = CategoryScores::uniform(50.0);
        strong.price = 95.0;
        strong.property = 100.0;
        assert!(policy.is_perfect_match(&strong, 85.0));
        // Composite guard
        assert!(!policy.is_perfect_match(&strong, 70.0));

        let mut one_primary = strong;
        one_primary.property = 85.0;
        assert!(!policy.is_perfect_match(&one_primary, 85.0));

        assert!(!policy.is_perfect_match(&CategoryScores::uniform(40.0), 40.0));
    }

    #[test]
    fn test_custom_policy_override() {
        let lenient = ThresholdPolicy {
            primary_required: 1,
            ..ThresholdPolicy::default()
        };

        let mut scores = CategoryScores::uniform(85.0);
        scores.price = 92.0;
        assert!(lenient.is_perfect_match(&scores, 86.0));
        assert!(!ThresholdPolicy::default().is_perfect_match(&scores, 86.0));
    }

    #[test]
    fn test_threshold_queries_preserve_order() {
        let mut candidates = vec![
            candidate("a", 95.0, 100.0, 0),
            candidate("b", 80.0, 100.0, 0),
            candidate("c", 79.99, 100.0, 0),
        ];
        candidates[0].is_perfect_match = true;

        assert_eq!(ids(&above_threshold(&candidates, 80.0)), vec!["a", "b"]);
        assert_eq!(ids(&perfect_matches(&candidates)), vec!["a"]);
    }
}
