use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::{
    filters::{apply_hard_filter, compare_recency, FilterSpec},
    ranking::{classify, rank, MatchPolicy, ThresholdPolicy},
    scoring::{neutral_candidate, ScoringEngine},
};
use crate::models::{Preferences, Property, ScoredCandidate, ScoringWeights};

/// Main matching orchestrator - implements the multi-stage pipeline
///
/// # Pipeline Stages
/// 1. Hard filter (non-negotiable constraints, recency order, pool cap)
/// 2. Category scoring and weighted composite
/// 3. Perfect-match classification
/// 4. Ranking
///
/// Pure: candidates come in, ranked candidates go out.
#[derive(Debug, Clone)]
pub struct Matcher {
    engine: ScoringEngine,
    policy: Arc<dyn MatchPolicy>,
}

impl Matcher {
    pub fn new(engine: ScoringEngine, policy: Arc<dyn MatchPolicy>) -> Self {
        Self { engine, policy }
    }

    pub fn with_weights(weights: ScoringWeights) -> Self {
        Self::new(ScoringEngine::new(weights), Arc::new(ThresholdPolicy::default()))
    }

    pub fn with_default_weights() -> Self {
        Self::with_weights(ScoringWeights::default())
    }

    pub fn policy(&self) -> &dyn MatchPolicy {
        self.policy.as_ref()
    }

    /// Hard-filter, score, classify and rank a candidate pool
    ///
    /// This is the one scored set that every query (top-N, perfect,
    /// high-score, insights) slices from.
    pub fn rank_candidates(
        &self,
        preferences: &Preferences,
        candidates: Vec<Property>,
        pool_size: usize,
        now: DateTime<Utc>,
    ) -> Vec<ScoredCandidate> {
        let spec = FilterSpec::from_preferences(preferences, pool_size);
        let filtered = apply_hard_filter(&spec, candidates);

        let mut scored = self.engine.score_all(filtered, preferences, now);
        classify(&mut scored, self.policy.as_ref());
        rank(&mut scored);

        scored
    }

    /// Score a single listing, classification included
    pub fn evaluate(&self, property: &Property, preferences: &Preferences, now: DateTime<Utc>) -> ScoredCandidate {
        let mut scored = self.engine.score(property, preferences, now);
        scored.is_perfect_match = self
            .policy
            .is_perfect_match(&scored.scores, scored.match_score);
        scored
    }

    /// Most recent listings with neutral scores, for users without preferences
    pub fn recent_candidates(&self, mut candidates: Vec<Property>, limit: usize) -> Vec<ScoredCandidate> {
        candidates.sort_by(compare_recency);
        candidates.truncate(limit);
        candidates.into_iter().map(neutral_candidate).collect()
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::with_default_weights()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Furnishing, RangePreference};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn create_candidate(id: &str, price: u32, bedrooms: u8, age_days: i64) -> Property {
        Property {
            id: id.to_string(),
            price,
            bedrooms,
            bathrooms: 1,
            property_type: "apartment".to_string(),
            furnishing: Some(Furnishing::Furnished),
            features: Default::default(),
            available_from: None,
            latitude: Some(51.5265),
            longitude: Some(-0.0788),
            postcode: Some("EC2A 3AY".to_string()),
            area: Some("shoreditch".to_string()),
            created_at: now() - Duration::days(age_days),
            operator_id: Some("agent-1".to_string()),
            media_keys: vec![],
            media_urls: vec![],
        }
    }

    fn create_preferences() -> Preferences {
        Preferences {
            price: RangePreference::between(1500, 2500),
            bedrooms: RangePreference::between(1, 2),
            furnishing: Some(Furnishing::Furnished),
            ..Preferences::new("current_user")
        }
    }

    #[test]
    fn test_rank_candidates_applies_hard_filter() {
        let matcher = Matcher::with_default_weights();

        let candidates = vec![
            create_candidate("1", 1800, 2, 1),  // Good match
            create_candidate("2", 4000, 2, 1),  // Too expensive
            create_candidate("3", 1800, 4, 1),  // Too many bedrooms
        ];

        let ranked = matcher.rank_candidates(&create_preferences(), candidates, 100, now());

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].property.id, "1");
    }

    #[test]
    fn test_matches_sorted_by_score() {
        let matcher = Matcher::with_default_weights();

        let candidates = vec![
            create_candidate("far_from_ideal", 2500, 2, 1),
            create_candidate("ideal", 1800, 2, 1),
        ];

        let ranked = matcher.rank_candidates(&create_preferences(), candidates, 100, now());

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].property.id, "ideal");
        assert!(ranked[0].match_score >= ranked[1].match_score);
    }

    #[test]
    fn test_pool_size_caps_newest_candidates() {
        let matcher = Matcher::with_default_weights();

        let candidates: Vec<Property> = (0..20)
            .map(|i| create_candidate(&i.to_string(), 1500 + i * 50, 2, i as i64))
            .collect();

        let ranked = matcher.rank_candidates(&create_preferences(), candidates, 5, now());

        assert_eq!(ranked.len(), 5);
        // The pool keeps the five most recent listings
        assert!(ranked.iter().all(|c| c.property.id.parse::<u32>().unwrap() < 5));
    }

    #[test]
    fn test_evaluate_flags_perfect_match() {
        let matcher = Matcher::with_default_weights();
        let scored = matcher.evaluate(&create_candidate("1", 1800, 2, 0), &create_preferences(), now());

        assert!(scored.scores.price >= 90.0);
        assert_eq!(scored.scores.property, 100.0);
        assert!(scored.is_perfect_match);
        assert!(scored.match_score >= 80.0);
    }

    #[test]
    fn test_recent_candidates_are_neutral() {
        let matcher = Matcher::with_default_weights();
        let candidates = vec![
            create_candidate("old", 1800, 2, 40),
            create_candidate("new", 9000, 6, 1),
        ];

        let recent = matcher.recent_candidates(candidates, 10);

        assert_eq!(recent[0].property.id, "new");
        assert!(recent.iter().all(|c| c.match_score == 50.0 && !c.is_perfect_match));
    }
}
