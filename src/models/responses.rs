use serde::{Deserialize, Serialize};

use crate::core::insights::MatchInsights;
use crate::models::domain::{Property, ScoredCandidate};

/// Ranked listings without score details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchListResponse {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub properties: Vec<Property>,
    #[serde(rename = "totalResults")]
    pub total_results: usize,
    /// False when the user has no preferences and got recent listings instead
    pub personalised: bool,
}

/// Ranked listings with category scores and reasons
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMatchesResponse {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub matches: Vec<ScoredCandidate>,
    #[serde(rename = "totalResults")]
    pub total_results: usize,
    pub personalised: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedMatchesResponse {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub matches: Vec<ScoredCandidate>,
    #[serde(rename = "totalCandidates")]
    pub total_candidates: usize,
    pub personalised: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub insights: Option<MatchInsights>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsResponse {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub personalised: bool,
    pub insights: MatchInsights,
}

/// Outcome of re-evaluating one listing against every stored profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegenerationResponse {
    #[serde(rename = "propertyId")]
    pub property_id: String,
    #[serde(rename = "usersEvaluated")]
    pub users_evaluated: usize,
    #[serde(rename = "perfectMatches")]
    pub perfect_matches: usize,
    #[serde(rename = "highScoreMatches")]
    pub high_score_matches: usize,
    #[serde(rename = "notificationsSent")]
    pub notifications_sent: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
