use serde::{Deserialize, Serialize};
use validator::Validate;

/// Query parameters for plain and perfect match listings
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct MatchesQuery {
    #[validate(range(min = 1))]
    #[serde(default)]
    pub limit: Option<u16>,
}

/// Query parameters for detailed matches
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DetailedMatchesQuery {
    #[validate(range(min = 1))]
    #[serde(default)]
    pub limit: Option<u16>,
    #[serde(rename = "includeInsights", alias = "include_insights", default)]
    pub include_insights: bool,
}

/// Query parameters for high-score matches
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct HighScoreQuery {
    #[validate(range(min = 0.0, max = 100.0))]
    #[serde(default)]
    pub threshold: Option<f64>,
    #[validate(range(min = 1))]
    #[serde(default)]
    pub limit: Option<u16>,
}
