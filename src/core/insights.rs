use serde::{Deserialize, Serialize};

use crate::core::ranking::DEFAULT_HIGH_SCORE_THRESHOLD;
use crate::models::{Category, ScoredCandidate};

/// Mean score at or above which no location advice is given
const HEALTHY_AVERAGE_SCORE: f64 = 60.0;

/// Candidate count below which lifestyle requirements look too narrow
const THIN_POOL_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryStrength {
    pub category: Category,
    #[serde(rename = "averageScore")]
    pub average_score: f64,
}

/// Aggregate diagnostics over a user's scored candidate pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchInsights {
    #[serde(rename = "totalCandidates")]
    pub total_candidates: usize,
    #[serde(rename = "perfectMatches")]
    pub perfect_matches: usize,
    #[serde(rename = "highScoreMatches")]
    pub high_score_matches: usize,
    #[serde(rename = "averageScore")]
    pub average_score: f64,
    #[serde(rename = "categoryAverages")]
    pub category_averages: Vec<CategoryStrength>,
    #[serde(rename = "topCategories")]
    pub top_categories: Vec<CategoryStrength>,
    pub recommendations: Vec<String>,
}

/// Reduce a scored pool to insights. Read-only.
pub fn compute_insights(candidates: &[ScoredCandidate]) -> MatchInsights {
    let total_candidates = candidates.len();
    let perfect_matches = candidates.iter().filter(|c| c.is_perfect_match).count();
    let high_score_matches = candidates
        .iter()
        .filter(|c| c.match_score >= DEFAULT_HIGH_SCORE_THRESHOLD)
        .count();

    let average_score = mean(candidates.iter().map(|c| c.match_score));

    let category_averages: Vec<CategoryStrength> = Category::ALL
        .iter()
        .map(|category| CategoryStrength {
            category: *category,
            average_score: mean(candidates.iter().map(|c| c.scores.get(*category))),
        })
        .collect();

    let mut top_categories = category_averages.clone();
    top_categories.sort_by(|a, b| {
        b.average_score
            .partial_cmp(&a.average_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.category.cmp(&b.category))
    });
    top_categories.truncate(3);

    let recommendations = recommend(total_candidates, perfect_matches, average_score);

    MatchInsights {
        total_candidates,
        perfect_matches,
        high_score_matches,
        average_score,
        category_averages,
        top_categories,
        recommendations,
    }
}

fn recommend(total: usize, perfect: usize, average: f64) -> Vec<String> {
    if total == 0 {
        return vec![
            "No listings match your requirements yet. Try broadening your search.".to_string(),
        ];
    }

    let mut recommendations = Vec::new();

    if perfect == 0 {
        recommendations
            .push("No perfect matches found. Consider widening your price or bedroom range.".to_string());
    }

    if average < HEALTHY_AVERAGE_SCORE {
        recommendations
            .push("Match scores are low. Consider relaxing your location constraints.".to_string());
    }

    if total < THIN_POOL_SIZE {
        recommendations.push(
            "Few listings match your filters. Consider relaxing your lifestyle feature requirements."
                .to_string(),
        );
    }

    recommendations
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        ((sum / count as f64) * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scoring::neutral_candidate;
    use crate::models::Property;
    use chrono::Utc;

    fn candidate(id: &str, match_score: f64, price: f64, perfect: bool) -> ScoredCandidate {
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
            created_at: Utc::now(),
            operator_id: None,
            media_keys: vec![],
            media_urls: vec![],
        };

        let mut scored = neutral_candidate(property);
        scored.match_score = match_score;
        scored.scores.price = price;
        scored.is_perfect_match = perfect;
        scored
    }

    #[test]
    fn test_empty_pool() {
        let insights = compute_insights(&[]);

        assert_eq!(insights.total_candidates, 0);
        assert_eq!(insights.average_score, 0.0);
        assert_eq!(insights.recommendations.len(), 1);
        assert!(insights.recommendations[0].contains("broadening"));
    }

    #[test]
    fn test_counts_and_average() {
        let candidates = vec![
            candidate("a", 92.0, 100.0, true),
            candidate("b", 80.0, 90.0, false),
            candidate("c", 50.0, 20.0, false),
        ];

        let insights = compute_insights(&candidates);

        assert_eq!(insights.total_candidates, 3);
        assert_eq!(insights.perfect_matches, 1);
        assert_eq!(insights.high_score_matches, 2);
        assert_eq!(insights.average_score, 74.0);
        assert_eq!(insights.category_averages.len(), 6);
        assert_eq!(insights.top_categories.len(), 3);
        assert_eq!(insights.top_categories[0].category, Category::Price);
        assert_eq!(insights.top_categories[0].average_score, 70.0);
    }

    #[test]
    fn test_recommendations() {
        let weak: Vec<ScoredCandidate> = (0..3)
            .map(|i| candidate(&i.to_string(), 40.0, 40.0, false))
            .collect();
        let insights = compute_insights(&weak);

        assert_eq!(insights.recommendations.len(), 3);
        assert!(insights.recommendations[0].contains("price or bedroom"));
        assert!(insights.recommendations[1].contains("location"));
        assert!(insights.recommendations[2].contains("lifestyle"));

        let strong: Vec<ScoredCandidate> = (0..12)
            .map(|i| candidate(&i.to_string(), 90.0, 95.0, true))
            .collect();
        assert!(compute_insights(&strong).recommendations.is_empty());
    }
}
