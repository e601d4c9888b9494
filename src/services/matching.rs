use std::sync::Arc;
use thiserror::Error;

use crate::core::{
    clock::Clock,
    filters::{FilterSpec, DEFAULT_CANDIDATE_POOL, INSIGHTS_CANDIDATE_POOL},
    insights::compute_insights,
    matcher::Matcher,
    ranking::{above_threshold, perfect_matches, DEFAULT_HIGH_SCORE_THRESHOLD},
};
use crate::models::{
    DetailedMatchesResponse, InsightsResponse, MatchListResponse, Notification, NotificationKind,
    Preferences, Property, RegenerationResponse, ScoredCandidate, ScoredMatchesResponse,
};
use crate::services::cache::{CacheKey, ResultCache};
use crate::services::traits::{MediaResolver, Notifier, PreferenceSource, PropertySource, SourceError};

/// Errors surfaced by the matching service
#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// Request bounds and regeneration paging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchingLimits {
    pub default_limit: usize,
    pub max_limit: usize,
    pub candidate_pool: usize,
    pub insights_pool: usize,
    pub default_threshold: f64,
    pub regeneration_chunk_size: usize,
    pub notification_batch_size: usize,
}

impl Default for MatchingLimits {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 200,
            candidate_pool: DEFAULT_CANDIDATE_POOL,
            insights_pool: INSIGHTS_CANDIDATE_POOL,
            default_threshold: DEFAULT_HIGH_SCORE_THRESHOLD,
            regeneration_chunk_size: 100,
            notification_batch_size: 50,
        }
    }
}

impl MatchingLimits {
    /// Clamp a requested result count into [1, max_limit]
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }

    /// Clamp a requested score threshold into [0, 100]
    pub fn clamp_threshold(&self, requested: Option<f64>) -> f64 {
        match requested {
            Some(threshold) if threshold.is_finite() => threshold.clamp(0.0, 100.0),
            _ => self.default_threshold,
        }
    }
}

/// External collaborators the service talks to
#[derive(Clone)]
pub struct Collaborators {
    pub properties: Arc<dyn PropertySource>,
    pub preferences: Arc<dyn PreferenceSource>,
    pub media: Arc<dyn MediaResolver>,
    pub notifier: Arc<dyn Notifier>,
}

/// A ranked candidate pool for one user
struct ScoredPool {
    candidates: Vec<ScoredCandidate>,
    /// False when the user had no stored preferences
    personalised: bool,
}

/// Request-level matching operations
///
/// Loads preferences and candidates from the collaborators, runs the
/// matcher, resolves media URLs and memoizes the finished payload in the
/// result cache.
#[derive(Clone)]
pub struct MatchingService {
    collaborators: Collaborators,
    matcher: Arc<Matcher>,
    cache: ResultCache,
    clock: Arc<dyn Clock>,
    limits: MatchingLimits,
}

impl MatchingService {
    pub fn new(
        collaborators: Collaborators,
        matcher: Matcher,
        cache: ResultCache,
        clock: Arc<dyn Clock>,
        limits: MatchingLimits,
    ) -> Self {
        Self {
            collaborators,
            matcher: Arc::new(matcher),
            cache,
            clock,
            limits,
        }
    }

    pub fn limits(&self) -> &MatchingLimits {
        &self.limits
    }

    /// Top-N listings for a user
    pub async fn find_matches(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<MatchListResponse, MatchingError> {
        let user_id = require_user(user_id)?;
        let limit = self.limits.clamp_limit(limit);
        let key = CacheKey::matches(user_id, limit);

        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let pool = self.scored_pool(user_id, self.limits.candidate_pool).await?;
        let mut matches = pool.candidates;
        matches.truncate(limit);
        self.resolve_media(&mut matches).await;

        let response = MatchListResponse {
            user_id: user_id.to_string(),
            total_results: matches.len(),
            properties: matches.into_iter().map(|c| c.property).collect(),
            personalised: pool.personalised,
        };

        tracing::info!(
            "Found {} matches for user {} (personalised: {})",
            response.total_results,
            user_id,
            response.personalised
        );

        self.cache.set(&key, &response).await;
        Ok(response)
    }

    /// Top-N with category scores and reasons, optionally with insights
    pub async fn detailed_matches(
        &self,
        user_id: &str,
        limit: Option<usize>,
        include_insights: bool,
    ) -> Result<DetailedMatchesResponse, MatchingError> {
        let user_id = require_user(user_id)?;
        let limit = self.limits.clamp_limit(limit);
        let key = CacheKey::detailed(user_id, limit, include_insights);

        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let pool = self.scored_pool(user_id, self.limits.candidate_pool).await?;
        let total_candidates = pool.candidates.len();
        let insights = include_insights.then(|| compute_insights(&pool.candidates));

        let mut matches = pool.candidates;
        matches.truncate(limit);
        self.resolve_media(&mut matches).await;

        let response = DetailedMatchesResponse {
            user_id: user_id.to_string(),
            matches,
            total_candidates,
            personalised: pool.personalised,
            insights,
        };

        tracing::info!(
            "Returned {} of {} detailed matches for user {}",
            response.matches.len(),
            total_candidates,
            user_id
        );

        self.cache.set(&key, &response).await;
        Ok(response)
    }

    /// Candidates the match policy classifies as perfect
    pub async fn perfect_matches(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<ScoredMatchesResponse, MatchingError> {
        let user_id = require_user(user_id)?;
        let limit = self.limits.clamp_limit(limit);
        let key = CacheKey::perfect(user_id, limit);

        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let pool = self.scored_pool(user_id, self.limits.candidate_pool).await?;
        let mut matches = perfect_matches(&pool.candidates);
        matches.truncate(limit);
        self.resolve_media(&mut matches).await;

        let response = ScoredMatchesResponse {
            user_id: user_id.to_string(),
            total_results: matches.len(),
            matches,
            personalised: pool.personalised,
        };

        tracing::info!("Found {} perfect matches for user {}", response.total_results, user_id);

        self.cache.set(&key, &response).await;
        Ok(response)
    }

    /// Candidates scoring at or above `threshold`
    pub async fn high_score_matches(
        &self,
        user_id: &str,
        threshold: Option<f64>,
        limit: Option<usize>,
    ) -> Result<ScoredMatchesResponse, MatchingError> {
        let user_id = require_user(user_id)?;
        let threshold = self.limits.clamp_threshold(threshold);
        let limit = self.limits.clamp_limit(limit);
        let key = CacheKey::high_score(user_id, threshold, limit);

        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let pool = self.scored_pool(user_id, self.limits.candidate_pool).await?;
        let mut matches = above_threshold(&pool.candidates, threshold);
        matches.truncate(limit);
        self.resolve_media(&mut matches).await;

        let response = ScoredMatchesResponse {
            user_id: user_id.to_string(),
            total_results: matches.len(),
            matches,
            personalised: pool.personalised,
        };

        tracing::info!(
            "Found {} matches scoring >= {:.1} for user {}",
            response.total_results,
            threshold,
            user_id
        );

        self.cache.set(&key, &response).await;
        Ok(response)
    }

    /// Aggregate diagnostics over the user's wider candidate pool
    pub async fn insights(&self, user_id: &str) -> Result<InsightsResponse, MatchingError> {
        let user_id = require_user(user_id)?;
        let key = CacheKey::insights(user_id);

        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let pool = self.scored_pool(user_id, self.limits.insights_pool).await?;
        let response = InsightsResponse {
            user_id: user_id.to_string(),
            personalised: pool.personalised,
            insights: compute_insights(&pool.candidates),
        };

        tracing::info!(
            "Computed insights for user {} over {} candidates",
            user_id,
            response.insights.total_candidates
        );

        self.cache.set(&key, &response).await;
        Ok(response)
    }

    /// Re-evaluate one listing against every stored profile
    ///
    /// Profiles are paged in chunks. Perfect and high-score hits produce
    /// notifications, sent in batches; a failed batch is logged and dropped.
    /// The whole result cache is evicted, since any user may hold the
    /// previous version of the listing.
    pub async fn regenerate_for_property(
        &self,
        property_id: &str,
    ) -> Result<RegenerationResponse, MatchingError> {
        let property_id = property_id.trim();
        if property_id.is_empty() {
            return Err(MatchingError::InvalidRequest("property id is required".into()));
        }

        let property = self.collaborators.properties.get_property(property_id).await?;

        // Cached results may hold the previous version of the listing, or
        // the listing itself if it was withdrawn
        self.cache.invalidate_all().await;

        let property =
            property.ok_or_else(|| MatchingError::NotFound(format!("Property {} not found", property_id)))?;

        let now = self.clock.now();
        let chunk_size = self.limits.regeneration_chunk_size.max(1);
        let batch_size = self.limits.notification_batch_size.max(1);

        let mut summary = RegenerationResponse {
            property_id: property.id.clone(),
            ..Default::default()
        };
        let mut pending: Vec<Notification> = Vec::with_capacity(batch_size);
        let mut offset = 0;

        loop {
            let page = self
                .collaborators
                .preferences
                .list_preferences(offset, chunk_size)
                .await?;
            let page_len = page.len();

            for preferences in page {
                if preferences.user_id.trim().is_empty() {
                    continue;
                }
                summary.users_evaluated += 1;

                if let Some(notification) = self.evaluate_for_user(&property, &preferences, now) {
                    match notification.kind {
                        NotificationKind::PerfectMatch => summary.perfect_matches += 1,
                        NotificationKind::HighScore => summary.high_score_matches += 1,
                    }
                    pending.push(notification);
                }

                if pending.len() >= batch_size {
                    summary.notifications_sent += self.flush_notifications(&mut pending).await;
                }
            }

            if page_len < chunk_size {
                break;
            }
            offset += page_len;
        }

        summary.notifications_sent += self.flush_notifications(&mut pending).await;

        tracing::info!(
            "Regenerated property {}: {} users, {} perfect, {} high-score, {} notified",
            summary.property_id,
            summary.users_evaluated,
            summary.perfect_matches,
            summary.high_score_matches,
            summary.notifications_sent
        );

        Ok(summary)
    }

    /// Regenerate several listings; one failure does not stop the rest
    pub async fn regenerate_for_properties(&self, property_ids: &[String]) -> Vec<RegenerationResponse> {
        let mut results = Vec::with_capacity(property_ids.len());

        for property_id in property_ids {
            match self.regenerate_for_property(property_id).await {
                Ok(summary) => results.push(summary),
                Err(e) => tracing::warn!("Skipping regeneration for property {}: {}", property_id, e),
            }
        }

        results
    }

    /// Evict cached results after a user's preferences changed
    pub async fn preferences_changed(&self, user_id: &str) -> Result<(), MatchingError> {
        let user_id = require_user(user_id)?;
        self.cache.invalidate_user(user_id).await;
        Ok(())
    }

    /// Evict all cached results after a listing changed
    pub async fn property_changed(&self) {
        self.cache.invalidate_all().await;
    }

    /// Load, filter, score and rank the candidate pool for one user
    async fn scored_pool(&self, user_id: &str, pool_size: usize) -> Result<ScoredPool, MatchingError> {
        let now = self.clock.now();

        let Some(preferences) = self.collaborators.preferences.get_preferences(user_id).await? else {
            tracing::debug!("No preferences for user {}, falling back to recent listings", user_id);

            let recent = self
                .collaborators
                .properties
                .list_candidates(&FilterSpec::recent(pool_size))
                .await?;

            return Ok(ScoredPool {
                candidates: self.matcher.recent_candidates(recent, pool_size),
                personalised: false,
            });
        };

        let spec = FilterSpec::from_preferences(&preferences, pool_size);
        let candidates = self.collaborators.properties.list_candidates(&spec).await?;
        let fetched = candidates.len();

        let ranked = self.matcher.rank_candidates(&preferences, candidates, pool_size, now);

        tracing::debug!(
            "Scored {} of {} fetched candidates for user {}",
            ranked.len(),
            fetched,
            user_id
        );

        Ok(ScoredPool {
            candidates: ranked,
            personalised: true,
        })
    }

    /// Score one listing for one profile and decide whether to notify
    fn evaluate_for_user(
        &self,
        property: &Property,
        preferences: &Preferences,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<Notification> {
        if !FilterSpec::from_preferences(preferences, 1).matches(property) {
            return None;
        }

        let scored = self.matcher.evaluate(property, preferences, now);

        let kind = if scored.is_perfect_match {
            NotificationKind::PerfectMatch
        } else if scored.match_score >= self.limits.default_threshold {
            NotificationKind::HighScore
        } else {
            return None;
        };

        Some(Notification {
            user_id: preferences.user_id.clone(),
            property_id: property.id.clone(),
            score: scored.match_score,
            reasons: scored.reasons,
            kind,
        })
    }

    /// Send pending notifications, returning how many were accepted
    async fn flush_notifications(&self, pending: &mut Vec<Notification>) -> usize {
        if pending.is_empty() {
            return 0;
        }

        let batch = std::mem::take(pending);
        match self.collaborators.notifier.notify_batch(&batch).await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("Dropped {} notifications: {}", batch.len(), e);
                0
            }
        }
    }

    /// Replace media keys with client-loadable URLs
    async fn resolve_media(&self, candidates: &mut [ScoredCandidate]) {
        for candidate in candidates.iter_mut() {
            let mut urls = Vec::with_capacity(candidate.property.media_keys.len());
            for key in &candidate.property.media_keys {
                urls.push(self.collaborators.media.resolve_url(key).await);
            }
            candidate.property.media_urls = urls;
        }
    }
}

fn require_user(user_id: &str) -> Result<&str, MatchingError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(MatchingError::InvalidRequest("user id is required".into()));
    }
    Ok(user_id)
}
