use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::Arc;

use crate::core::features::is_premium;
use crate::core::geo::{distance_to_area, district_match_score, haversine_distance, lookup_area, proximity_score};
use crate::models::{
    Category, CategoryScores, CommuteLimits, Furnishing, Preferences, Property, RangePreference,
    ScoredCandidate, ScoringWeights,
};

/// Score given to a category the user expressed no preference for
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Share of its base weight an unset category keeps
pub const ABSENT_WEIGHT_FACTOR: f64 = 0.1;

/// Categories at or above this score contribute a reason string
pub const REASON_THRESHOLD: f64 = 80.0;

/// Ideal price sits this far into the requested range
const IDEAL_PRICE_POSITION: f64 = 0.3;

/// Points lost per unit of distance outside the range, relative to its span
const OUT_OF_RANGE_PENALTY: f64 = 200.0;

const DISTRICT_WEIGHT: f64 = 0.40;
const SECONDARY_AREA_WEIGHT: f64 = 0.30;
const COMMUTE_WEIGHT: f64 = 0.30;

const ROOMS_WEIGHT: f64 = 0.40;
const TYPE_WEIGHT: f64 = 0.35;
const FURNISHING_WEIGHT: f64 = 0.25;

/// Groups of property types that count as a partial match for each other
const PROPERTY_TYPE_GROUPS: &[&[&str]] = &[
    &["apartment", "flat", "studio", "penthouse", "maisonette"],
    &["house", "townhouse", "cottage", "bungalow", "detached", "semi_detached", "terraced"],
    &["room", "shared", "house_share", "flat_share"],
];

/// Average speeds (km/h) used to estimate commute time per mode
const WALKING_KMH: f64 = 5.0;
const CYCLING_KMH: f64 = 15.0;
const PUBLIC_TRANSPORT_KMH: f64 = 25.0;
const DRIVING_KMH: f64 = 30.0;

/// Result of evaluating one category
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageOutcome {
    /// The user set this preference; full base weight applies
    Scored(f64),
    /// No preference was given; neutral score at reduced weight
    Unset,
    /// Preference is malformed (e.g. min > max); category skipped
    Invalid,
}

/// One category of the scoring pipeline
///
/// Stages are pure: no I/O, deterministic for identical inputs.
pub trait ScoringStage: Send + Sync + Debug {
    fn category(&self) -> Category;

    fn evaluate(&self, property: &Property, preferences: &Preferences, now: DateTime<Utc>) -> StageOutcome;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PriceStage;

impl ScoringStage for PriceStage {
    fn category(&self) -> Category {
        Category::Price
    }

    fn evaluate(&self, property: &Property, preferences: &Preferences, _now: DateTime<Utc>) -> StageOutcome {
        price_score(property.price, &preferences.price)
    }
}

/// Location scoring; proximity and commute components can be switched off
#[derive(Debug, Clone, Copy)]
pub struct LocationStage {
    pub proximity: bool,
    pub commute: bool,
}

impl Default for LocationStage {
    fn default() -> Self {
        Self {
            proximity: true,
            commute: true,
        }
    }
}

impl ScoringStage for LocationStage {
    fn category(&self) -> Category {
        Category::Location
    }

    fn evaluate(&self, property: &Property, preferences: &Preferences, _now: DateTime<Utc>) -> StageOutcome {
        let location = &preferences.location;
        let mut parts = Vec::with_capacity(3);

        if let Some(postcode) = &location.primary_postcode {
            parts.push((DISTRICT_WEIGHT, district_match_score(postcode, property.postcode.as_deref())));
        }

        if self.proximity {
            if let Some(area) = &location.secondary_area {
                parts.push((SECONDARY_AREA_WEIGHT, area_proximity(property, area)));
            }
        }

        if self.commute {
            if let Some(area) = &location.commute_area {
                parts.push((COMMUTE_WEIGHT, commute_score(property, area, &location.commute_limits)));
            }
        }

        weighted_mean(&parts).map_or(StageOutcome::Unset, |score| StageOutcome::Scored(clamp_score(score)))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyStage;

impl ScoringStage for PropertyStage {
    fn category(&self) -> Category {
        Category::Property
    }

    fn evaluate(&self, property: &Property, preferences: &Preferences, _now: DateTime<Utc>) -> StageOutcome {
        if preferences.bedrooms.is_malformed() || preferences.bathrooms.is_malformed() {
            return StageOutcome::Invalid;
        }

        let bedrooms = range_fit(property.bedrooms, &preferences.bedrooms);
        let bathrooms = range_fit(property.bathrooms, &preferences.bathrooms);
        let rooms = match (bedrooms, bathrooms) {
            (Some(bed), Some(bath)) => Some(bed * 0.75 + bath * 0.25),
            (bed, bath) => bed.or(bath),
        };

        let property_type = type_match(&property.property_type, preferences);
        let furnishing = preferences
            .furnishing
            .map(|wanted| furnishing_match(wanted, property.furnishing));

        let parts: Vec<(f64, f64)> = [
            (ROOMS_WEIGHT, rooms),
            (TYPE_WEIGHT, property_type),
            (FURNISHING_WEIGHT, furnishing),
        ]
        .into_iter()
        .filter_map(|(weight, score)| score.map(|s| (weight, s)))
        .collect();

        weighted_mean(&parts).map_or(StageOutcome::Unset, |score| StageOutcome::Scored(clamp_score(score)))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LifestyleStage;

impl ScoringStage for LifestyleStage {
    fn category(&self) -> Category {
        Category::Lifestyle
    }

    fn evaluate(&self, property: &Property, preferences: &Preferences, _now: DateTime<Utc>) -> StageOutcome {
        let requested = preferences.requested_features();
        if requested.is_empty() {
            return StageOutcome::Unset;
        }

        let matched = requested
            .iter()
            .filter(|feature| property.features.contains(**feature))
            .count();
        let coverage = matched as f64 / requested.len() as f64 * 100.0;

        let premium_extras = property
            .features
            .iter()
            .filter(|feature| is_premium(feature) && !requested.contains(feature.as_str()))
            .count();
        let bonus = (premium_extras as f64 * 5.0).min(20.0);

        StageOutcome::Scored((coverage + bonus).min(100.0))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AvailabilityStage;

impl ScoringStage for AvailabilityStage {
    fn category(&self) -> Category {
        Category::Availability
    }

    fn evaluate(&self, property: &Property, preferences: &Preferences, now: DateTime<Utc>) -> StageOutcome {
        let Some(move_in) = preferences.move_in else {
            return StageOutcome::Unset;
        };

        if preferences.move_out.is_some_and(|out| out < move_in) {
            return StageOutcome::Invalid;
        }

        let available = property.available_from.unwrap_or_else(|| now.date_naive());

        if preferences.move_out.is_some_and(|out| available > out) {
            return StageOutcome::Scored(0.0);
        }

        let offset = (available - move_in).num_days().unsigned_abs() as f64;
        let score = if offset <= 30.0 {
            100.0 - offset
        } else {
            70.0 - 2.0 * (offset - 30.0)
        };

        StageOutcome::Scored(clamp_score(score))
    }
}

/// Listing age decay; always applies
#[derive(Debug, Clone, Copy, Default)]
pub struct FreshnessStage;

impl ScoringStage for FreshnessStage {
    fn category(&self) -> Category {
        Category::Freshness
    }

    fn evaluate(&self, property: &Property, _preferences: &Preferences, now: DateTime<Utc>) -> StageOutcome {
        StageOutcome::Scored(freshness_score(property.created_at, now))
    }
}

/// Configurable multi-category scoring pipeline
///
/// Categories without a stage score neutral with zero weight, so dropping a
/// stage (say, freshness) removes it from the composite entirely.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    stages: Vec<Arc<dyn ScoringStage>>,
    weights: ScoringWeights,
}

impl ScoringEngine {
    /// Engine with every standard stage
    pub fn new(weights: ScoringWeights) -> Self {
        Self::with_stages(weights, default_stages())
    }

    pub fn with_stages(weights: ScoringWeights, stages: Vec<Arc<dyn ScoringStage>>) -> Self {
        Self { stages, weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score a single property against a preference profile
    ///
    /// The perfect-match flag is left unset; classification happens in ranking.
    pub fn score(&self, property: &Property, preferences: &Preferences, now: DateTime<Utc>) -> ScoredCandidate {
        let mut scores = CategoryScores::uniform(NEUTRAL_SCORE);
        let mut weights = [0.0; 6];

        for stage in &self.stages {
            let category = stage.category();
            let base = self.weights.get(category).max(0.0);
            let slot = category_index(category);

            match stage.evaluate(property, preferences, now) {
                StageOutcome::Scored(score) => {
                    scores.set(category, clamp_score(score));
                    weights[slot] = base;
                }
                StageOutcome::Unset => {
                    weights[slot] = base * ABSENT_WEIGHT_FACTOR;
                }
                StageOutcome::Invalid => {
                    tracing::debug!(
                        user_id = %preferences.user_id,
                        category = category.as_str(),
                        "Skipping category with malformed preferences"
                    );
                    weights[slot] = 0.0;
                }
            }
        }

        let match_score = composite_score(&scores, &weights);
        let reasons = build_reasons(&scores, property, preferences);

        ScoredCandidate {
            property: property.clone(),
            scores,
            match_score,
            reasons,
            is_perfect_match: false,
        }
    }

    pub fn score_all(
        &self,
        candidates: Vec<Property>,
        preferences: &Preferences,
        now: DateTime<Utc>,
    ) -> Vec<ScoredCandidate> {
        candidates
            .iter()
            .map(|property| self.score(property, preferences, now))
            .collect()
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(ScoringWeights::default())
    }
}

pub fn default_stages() -> Vec<Arc<dyn ScoringStage>> {
    vec![
        Arc::new(PriceStage),
        Arc::new(LocationStage::default()),
        Arc::new(PropertyStage),
        Arc::new(LifestyleStage),
        Arc::new(AvailabilityStage),
        Arc::new(FreshnessStage),
    ]
}

/// Candidate carrying neutral scores, used when a user has no preferences
pub fn neutral_candidate(property: Property) -> ScoredCandidate {
    ScoredCandidate {
        property,
        scores: CategoryScores::uniform(NEUTRAL_SCORE),
        match_score: NEUTRAL_SCORE,
        reasons: vec![],
        is_perfect_match: false,
    }
}

/// Weighted composite over the six categories
///
/// Weights are normalized to sum to 1; with no active weight at all the
/// composite is neutral. The result is clamped to [0, 100].
pub fn composite_score(scores: &CategoryScores, weights: &[f64; 6]) -> f64 {
    let total: f64 = weights.iter().filter(|w| w.is_finite() && **w > 0.0).sum();
    if total <= 0.0 {
        return NEUTRAL_SCORE;
    }

    let combined: f64 = Category::ALL
        .iter()
        .map(|category| {
            let weight = weights[category_index(*category)];
            if weight.is_finite() && weight > 0.0 {
                scores.get(*category) * (weight / total)
            } else {
                0.0
            }
        })
        .sum();

    clamp_score(combined)
}

/// Price fit (0-100) against the requested budget
///
/// With both bounds set the ideal sits 30% into the range and the score falls
/// linearly with distance from it; prices outside the range take an extra
/// penalty. A single bound scores 80 when satisfied.
pub fn price_score(price: u32, range: &RangePreference<u32>) -> StageOutcome {
    if range.is_malformed() {
        return StageOutcome::Invalid;
    }

    let price = price as f64;
    let score = match (range.min, range.max) {
        (Some(min), Some(max)) => {
            let (min, max) = (min as f64, max as f64);
            let span = max - min;

            if span <= 0.0 {
                // Exact budget: penalize relative to the budget itself
                let deviation = (price - min).abs() / min.max(1.0);
                100.0 - OUT_OF_RANGE_PENALTY * deviation
            } else {
                let ideal = min + IDEAL_PRICE_POSITION * span;
                let mut score = 100.0 - 100.0 * (price - ideal).abs() / span;

                if price > max {
                    score -= OUT_OF_RANGE_PENALTY * (price - max) / span;
                } else if price < min {
                    score -= OUT_OF_RANGE_PENALTY * (min - price) / span;
                }

                score
            }
        }
        (Some(min), None) => {
            let min = min as f64;
            if price >= min {
                80.0
            } else {
                80.0 - OUT_OF_RANGE_PENALTY * (min - price) / min.max(1.0)
            }
        }
        (None, Some(max)) => {
            let max = max as f64;
            if price <= max {
                80.0 + 20.0 * (max - price) / max.max(1.0)
            } else {
                80.0 - OUT_OF_RANGE_PENALTY * (price - max) / max.max(1.0)
            }
        }
        (None, None) => return StageOutcome::Unset,
    };

    StageOutcome::Scored(clamp_score(score))
}

/// Listing age decay: 100 within a week, 80 within a month, then down to 20
pub fn freshness_score(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - created_at).num_days().max(0) as f64;

    if age_days <= 7.0 {
        100.0
    } else if age_days <= 30.0 {
        80.0
    } else {
        (80.0 - (age_days - 30.0)).max(20.0)
    }
}

fn area_proximity(property: &Property, area: &str) -> f64 {
    match property.coordinates() {
        Some((lat, lon)) => distance_to_area(lat, lon, area).map_or(NEUTRAL_SCORE, proximity_score),
        None => NEUTRAL_SCORE,
    }
}

fn commute_score(property: &Property, area: &str, limits: &CommuteLimits) -> f64 {
    let (Some((lat, lon)), Some(target)) = (property.coordinates(), lookup_area(area)) else {
        return NEUTRAL_SCORE;
    };

    let distance_km = haversine_distance(lat, lon, target.latitude, target.longitude);
    let score = proximity_score(distance_km);

    if !limits.is_set() {
        return score;
    }

    let modes = [
        (limits.walking, WALKING_KMH),
        (limits.cycling, CYCLING_KMH),
        (limits.public_transport, PUBLIC_TRANSPORT_KMH),
        (limits.driving, DRIVING_KMH),
    ];

    let reachable = modes.iter().any(|(limit, speed)| {
        limit.is_some_and(|minutes| distance_km / speed * 60.0 <= minutes as f64)
    });

    if reachable {
        score
    } else {
        score * 0.5
    }
}

/// Fit of a count against a range: 100 inside, -30 per unit outside
fn range_fit(value: u8, range: &RangePreference<u8>) -> Option<f64> {
    if !range.is_set() {
        return None;
    }

    let below = range.min.map_or(0, |min| min.saturating_sub(value));
    let above = range.max.map_or(0, |max| value.saturating_sub(max));
    let miss = below.max(above) as f64;

    Some((100.0 - 30.0 * miss).max(0.0))
}

fn type_match(property_type: &str, preferences: &Preferences) -> Option<f64> {
    if preferences.property_types.is_empty() {
        return None;
    }

    if preferences.property_types.contains(property_type) {
        return Some(100.0);
    }

    let same_group = PROPERTY_TYPE_GROUPS.iter().any(|group| {
        group.contains(&property_type)
            && preferences
                .property_types
                .iter()
                .any(|wanted| group.contains(&wanted.as_str()))
    });

    Some(if same_group { 60.0 } else { 0.0 })
}

fn furnishing_match(wanted: Furnishing, actual: Option<Furnishing>) -> f64 {
    match (wanted, actual) {
        (w, Some(a)) if w == a => 100.0,
        (Furnishing::Furnished, Some(Furnishing::PartFurnished))
        | (Furnishing::PartFurnished, Some(Furnishing::Furnished)) => 50.0,
        _ => 0.0,
    }
}

fn build_reasons(scores: &CategoryScores, property: &Property, preferences: &Preferences) -> Vec<String> {
    scores
        .iter()
        .filter(|(_, score)| *score >= REASON_THRESHOLD)
        .map(|(category, _)| match category {
            Category::Price => format!("Rent of {} per month fits your budget", property.price),
            Category::Location => "Close to the areas you care about".to_string(),
            Category::Property => format!(
                "{}-bedroom {} matches your requirements",
                property.bedrooms,
                property.property_type.replace('_', " ")
            ),
            Category::Lifestyle => {
                let requested = preferences.requested_features();
                let matched = requested
                    .iter()
                    .filter(|f| property.features.contains(**f))
                    .count();
                if requested.is_empty() {
                    "Comes with premium features".to_string()
                } else {
                    format!("Has {} of your {} requested features", matched, requested.len())
                }
            }
            Category::Availability => "Available around your move-in date".to_string(),
            Category::Freshness => "Recently listed".to_string(),
        })
        .collect()
}

fn weighted_mean(parts: &[(f64, f64)]) -> Option<f64> {
    let total: f64 = parts.iter().map(|(weight, _)| weight).sum();
    if parts.is_empty() || total <= 0.0 {
        return None;
    }

    Some(parts.iter().map(|(weight, score)| weight * score).sum::<f64>() / total)
}

#[inline]
fn category_index(category: Category) -> usize {
    match category {
        Category::Price => 0,
        Category::Location => 1,
        Category::Property => 2,
        Category::Lifestyle => 3,
        Category::Availability => 4,
        Category::Freshness => 5,
    }
}

/// Clamp to [0, 100] and round to two decimals
#[inline]
fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    (score.clamp(0.0, 100.0) * 100.0).round() / 100.0
}
