// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    Category, CategoryScores, CommuteLimits, Furnishing, LocationPreferences, Notification,
    NotificationKind, Preferences, PreferencesRecord, Property, RangePreference, ScoredCandidate,
    ScoringWeights,
};
pub use requests::{DetailedMatchesQuery, HighScoreQuery, MatchesQuery};
pub use responses::{
    DetailedMatchesResponse, ErrorResponse, HealthResponse, InsightsResponse, MatchListResponse,
    RegenerationResponse, ScoredMatchesResponse,
};
