// Core algorithm exports
pub mod clock;
pub mod features;
pub mod filters;
pub mod geo;
pub mod insights;
pub mod matcher;
pub mod ranking;
pub mod scoring;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::features::{FeatureCategory, FeatureSet};
pub use self::filters::{apply_hard_filter, FilterSpec};
pub use self::geo::haversine_distance;
pub use self::insights::{compute_insights, MatchInsights};
pub use self::matcher::Matcher;
pub use self::ranking::{MatchPolicy, ThresholdPolicy};
pub use self::scoring::{ScoringEngine, ScoringStage, StageOutcome};
