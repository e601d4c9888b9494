//! Rent Match - rental property matching and ranking service
//!
//! This library scores rental listings against a user's structured
//! preference profile and returns an explainable, ordered candidate list.
//! Matching runs as a pipeline: hard filter, six-category weighted scoring,
//! perfect-match classification and ranking, with a TTL result cache and an
//! insights aggregator on top.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{geo::haversine_distance, Matcher, ScoringEngine};
pub use crate::models::{Preferences, Property, ScoredCandidate, ScoringWeights};
pub use crate::services::{MatchingError, MatchingService};
