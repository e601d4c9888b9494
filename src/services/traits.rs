use async_trait::async_trait;
use thiserror::Error;

use crate::core::filters::FilterSpec;
use crate::models::{Notification, Preferences, Property};

/// Failure reported by an external collaborator
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("invalid upstream data: {0}")]
    InvalidData(String),

    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}

/// Listing store
#[async_trait]
pub trait PropertySource: Send + Sync {
    /// Listings passing `spec`, most recent first, at most `spec.limit` of them
    async fn list_candidates(&self, spec: &FilterSpec) -> Result<Vec<Property>, SourceError>;

    async fn get_property(&self, property_id: &str) -> Result<Option<Property>, SourceError>;
}

/// Store of user search profiles
#[async_trait]
pub trait PreferenceSource: Send + Sync {
    /// `Ok(None)` means the user has no stored profile
    async fn get_preferences(&self, user_id: &str) -> Result<Option<Preferences>, SourceError>;

    /// One page of stored profiles; a short page means the end was reached
    async fn list_preferences(&self, offset: usize, limit: usize) -> Result<Vec<Preferences>, SourceError>;
}

/// Turns stored media keys into URLs a client can load
///
/// Infallible: implementations fall back to a deterministic URL rather than
/// failing the request.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve_url(&self, key: &str) -> String;
}

/// Delivery channel for match alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns how many notifications were accepted
    async fn notify_batch(&self, notifications: &[Notification]) -> Result<usize, SourceError>;
}
