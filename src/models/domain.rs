use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::features::{
    deserialize_features, deserialize_label, normalize_feature, normalize_features,
    FeatureCategory, FeatureSet,
};

/// Furnishing state of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Furnishing {
    Furnished,
    #[serde(alias = "part-furnished", alias = "partially_furnished")]
    PartFurnished,
    Unfurnished,
}

impl Furnishing {
    /// Parse a user-supplied furnishing label; "any" and unknown labels are `None`
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_feature(raw)?.as_str() {
            "furnished" => Some(Furnishing::Furnished),
            "part_furnished" | "partially_furnished" | "part" => Some(Furnishing::PartFurnished),
            "unfurnished" => Some(Furnishing::Unfurnished),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Furnishing::Furnished => "furnished",
            Furnishing::PartFurnished => "part_furnished",
            Furnishing::Unfurnished => "unfurnished",
        }
    }
}

/// Rental listing, read-only for the duration of a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    /// Monthly rent in whole currency units
    pub price: u32,
    pub bedrooms: u8,
    #[serde(default)]
    pub bathrooms: u8,
    #[serde(rename = "propertyType", alias = "property_type", deserialize_with = "deserialize_label")]
    pub property_type: String,
    #[serde(default)]
    pub furnishing: Option<Furnishing>,
    #[serde(rename = "lifestyleFeatures", alias = "lifestyle_features", default, deserialize_with = "deserialize_features")]
    pub features: BTreeSet<String>,
    /// `None` means available immediately
    #[serde(rename = "availableFrom", alias = "available_from", default)]
    pub available_from: Option<NaiveDate>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(rename = "createdAt", alias = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "operatorId", alias = "operator_id", default)]
    pub operator_id: Option<String>,
    #[serde(rename = "mediaKeys", alias = "media_keys", default)]
    pub media_keys: Vec<String>,
    /// Filled in by media resolution on the way out
    #[serde(rename = "mediaUrls", alias = "media_urls", default)]
    pub media_urls: Vec<String>,
}

impl Property {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn has_coordinates(&self) -> bool {
        self.coordinates().is_some()
    }
}

/// Inclusive numeric range where either bound may be unset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangePreference<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T: PartialOrd + Copy> RangePreference<T> {
    pub fn between(min: T, max: T) -> Self {
        Self { min: Some(min), max: Some(max) }
    }

    pub fn at_least(min: T) -> Self {
        Self { min: Some(min), max: None }
    }

    pub fn at_most(max: T) -> Self {
        Self { min: None, max: Some(max) }
    }

    pub fn is_set(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }

    /// Both bounds set with min above max
    pub fn is_malformed(&self) -> bool {
        matches!((self.min, self.max), (Some(min), Some(max)) if min > max)
    }

    /// Whether `value` satisfies every bound that is set
    pub fn contains(&self, value: T) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// Per-mode commute limits in minutes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommuteLimits {
    #[serde(default)]
    pub walking: Option<u16>,
    #[serde(default)]
    pub cycling: Option<u16>,
    #[serde(rename = "publicTransport", alias = "public_transport", default)]
    pub public_transport: Option<u16>,
    #[serde(default)]
    pub driving: Option<u16>,
}

impl CommuteLimits {
    pub fn is_set(&self) -> bool {
        self.walking.is_some()
            || self.cycling.is_some()
            || self.public_transport.is_some()
            || self.driving.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationPreferences {
    pub primary_postcode: Option<String>,
    pub secondary_area: Option<String>,
    pub commute_area: Option<String>,
    pub commute_limits: CommuteLimits,
}

impl LocationPreferences {
    pub fn is_set(&self) -> bool {
        self.primary_postcode.is_some() || self.secondary_area.is_some() || self.commute_area.is_some()
    }
}

/// A user's structured search profile
///
/// Built from [`PreferencesRecord`] at the ingestion boundary: blank strings
/// and "any" wildcards become unset fields and feature labels are normalized.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "PreferencesRecord")]
pub struct Preferences {
    pub user_id: String,
    pub price: RangePreference<u32>,
    pub bedrooms: RangePreference<u8>,
    pub bathrooms: RangePreference<u8>,
    pub property_types: BTreeSet<String>,
    pub furnishing: Option<Furnishing>,
    pub features: Vec<FeatureSet>,
    pub location: LocationPreferences,
    pub move_in: Option<NaiveDate>,
    pub move_out: Option<NaiveDate>,
}

impl Preferences {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Replace the feature set for `category`
    pub fn with_features<I, S>(mut self, category: FeatureCategory, raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.features.retain(|set| set.category() != category);
        let set = FeatureSet::new(category, raw);
        if !set.is_empty() {
            self.features.push(set);
        }
        self
    }

    pub fn has_feature_preferences(&self) -> bool {
        self.features.iter().any(|set| !set.is_empty())
    }

    /// Union of every requested feature across categories
    pub fn requested_features(&self) -> BTreeSet<&str> {
        self.features
            .iter()
            .flat_map(|set| set.items().iter().map(String::as_str))
            .collect()
    }

    pub fn has_property_preferences(&self) -> bool {
        self.bedrooms.is_set()
            || self.bathrooms.is_set()
            || !self.property_types.is_empty()
            || self.furnishing.is_some()
    }
}

/// Wire format of a stored preference document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencesRecord {
    #[serde(rename = "userId", alias = "user_id", default)]
    pub user_id: String,
    #[serde(rename = "minPrice", alias = "min_price", default)]
    pub min_price: Option<u32>,
    #[serde(rename = "maxPrice", alias = "max_price", default)]
    pub max_price: Option<u32>,
    #[serde(rename = "minBedrooms", alias = "min_bedrooms", default)]
    pub min_bedrooms: Option<u8>,
    #[serde(rename = "maxBedrooms", alias = "max_bedrooms", default)]
    pub max_bedrooms: Option<u8>,
    #[serde(rename = "minBathrooms", alias = "min_bathrooms", default)]
    pub min_bathrooms: Option<u8>,
    #[serde(rename = "maxBathrooms", alias = "max_bathrooms", default)]
    pub max_bathrooms: Option<u8>,
    #[serde(rename = "propertyType", alias = "property_type", default)]
    pub property_type: Option<Vec<String>>,
    #[serde(default)]
    pub furnishing: Option<String>,
    #[serde(rename = "lifestyleFeatures", alias = "lifestyle_features", default)]
    pub lifestyle_features: Option<Vec<String>>,
    #[serde(rename = "socialFeatures", alias = "social_features", default)]
    pub social_features: Option<Vec<String>>,
    #[serde(rename = "workFeatures", alias = "work_features", default)]
    pub work_features: Option<Vec<String>>,
    #[serde(rename = "convenienceFeatures", alias = "convenience_features", default)]
    pub convenience_features: Option<Vec<String>>,
    #[serde(rename = "petFriendlyFeatures", alias = "pet_friendly_features", default)]
    pub pet_friendly_features: Option<Vec<String>>,
    #[serde(rename = "luxuryFeatures", alias = "luxury_features", default)]
    pub luxury_features: Option<Vec<String>>,
    #[serde(rename = "primaryPostcode", alias = "primary_postcode", default)]
    pub primary_postcode: Option<String>,
    #[serde(rename = "secondaryLocation", alias = "secondary_location", default)]
    pub secondary_location: Option<String>,
    #[serde(rename = "commuteLocation", alias = "commute_location", default)]
    pub commute_location: Option<String>,
    #[serde(rename = "commuteTimes", alias = "commute_times", default)]
    pub commute_times: Option<CommuteLimits>,
    #[serde(rename = "moveInDate", alias = "move_in_date", default)]
    pub move_in_date: Option<NaiveDate>,
    #[serde(rename = "moveOutDate", alias = "move_out_date", default)]
    pub move_out_date: Option<NaiveDate>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("any"))
}

impl From<PreferencesRecord> for Preferences {
    fn from(record: PreferencesRecord) -> Self {
        let feature_lists = [
            (FeatureCategory::Lifestyle, record.lifestyle_features),
            (FeatureCategory::Social, record.social_features),
            (FeatureCategory::Work, record.work_features),
            (FeatureCategory::Convenience, record.convenience_features),
            (FeatureCategory::PetFriendly, record.pet_friendly_features),
            (FeatureCategory::Luxury, record.luxury_features),
        ];

        let features = feature_lists
            .into_iter()
            .map(|(category, raw)| FeatureSet::new(category, raw.unwrap_or_default()))
            .filter(|set| !set.is_empty())
            .collect();

        Self {
            user_id: record.user_id,
            price: RangePreference {
                min: record.min_price,
                max: record.max_price,
            },
            bedrooms: RangePreference {
                min: record.min_bedrooms,
                max: record.max_bedrooms,
            },
            bathrooms: RangePreference {
                min: record.min_bathrooms,
                max: record.max_bathrooms,
            },
            property_types: normalize_features(record.property_type.unwrap_or_default()),
            furnishing: record.furnishing.as_deref().and_then(Furnishing::parse),
            features,
            location: LocationPreferences {
                primary_postcode: non_blank(record.primary_postcode),
                secondary_area: non_blank(record.secondary_location),
                commute_area: non_blank(record.commute_location),
                commute_limits: record.commute_times.unwrap_or_default(),
            },
            move_in: record.move_in_date,
            move_out: record.move_out_date,
        }
    }
}

/// The six scoring categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Price,
    Location,
    Property,
    Lifestyle,
    Availability,
    Freshness,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Price,
        Category::Location,
        Category::Property,
        Category::Lifestyle,
        Category::Availability,
        Category::Freshness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Price => "price",
            Category::Location => "location",
            Category::Property => "property",
            Category::Lifestyle => "lifestyle",
            Category::Availability => "availability",
            Category::Freshness => "freshness",
        }
    }
}

/// Per-category scores, each in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub price: f64,
    pub location: f64,
    pub property: f64,
    pub lifestyle: f64,
    pub availability: f64,
    pub freshness: f64,
}

impl CategoryScores {
    pub fn uniform(score: f64) -> Self {
        Self {
            price: score,
            location: score,
            property: score,
            lifestyle: score,
            availability: score,
            freshness: score,
        }
    }

    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Price => self.price,
            Category::Location => self.location,
            Category::Property => self.property,
            Category::Lifestyle => self.lifestyle,
            Category::Availability => self.availability,
            Category::Freshness => self.freshness,
        }
    }

    pub fn set(&mut self, category: Category, score: f64) {
        let slot = match category {
            Category::Price => &mut self.price,
            Category::Location => &mut self.location,
            Category::Property => &mut self.property,
            Category::Lifestyle => &mut self.lifestyle,
            Category::Availability => &mut self.availability,
            Category::Freshness => &mut self.freshness,
        };
        *slot = score;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        Category::ALL.iter().map(move |c| (*c, self.get(*c)))
    }
}

/// A property scored against one user's preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub property: Property,
    pub scores: CategoryScores,
    #[serde(rename = "matchScore")]
    pub match_score: f64,
    pub reasons: Vec<String>,
    #[serde(rename = "isPerfectMatch")]
    pub is_perfect_match: bool,
}

/// Base category weights before preference-driven reduction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub price: f64,
    pub location: f64,
    pub property: f64,
    pub lifestyle: f64,
    pub availability: f64,
    pub freshness: f64,
}

impl ScoringWeights {
    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Price => self.price,
            Category::Location => self.location,
            Category::Property => self.property,
            Category::Lifestyle => self.lifestyle,
            Category::Availability => self.availability,
            Category::Freshness => self.freshness,
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            price: 30.0,
            location: 25.0,
            property: 20.0,
            lifestyle: 15.0,
            availability: 5.0,
            freshness: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PerfectMatch,
    HighScore,
}

/// A match alert for one user about one property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "propertyId")]
    pub property_id: String,
    pub score: f64,
    pub reasons: Vec<String>,
    pub kind: NotificationKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_preference() {
        let range = RangePreference::between(2u8, 3u8);
        assert!(range.is_set());
        assert!(range.contains(2));
        assert!(range.contains(3));
        assert!(!range.contains(4));

        let open: RangePreference<u8> = RangePreference::default();
        assert!(!open.is_set());
        assert!(open.contains(200));

        assert!(RangePreference::between(5u32, 1u32).is_malformed());
        assert!(!RangePreference::at_least(5u32).is_malformed());
    }

    #[test]
    fn test_furnishing_parse() {
        assert_eq!(Furnishing::parse("Furnished"), Some(Furnishing::Furnished));
        assert_eq!(Furnishing::parse("part-furnished"), Some(Furnishing::PartFurnished));
        assert_eq!(Furnishing::parse("any"), None);
        assert_eq!(Furnishing::parse(""), None);
    }

    #[test]
    fn test_preferences_from_record_json() {
        let json = serde_json::json!({
            "userId": "u1",
            "min_price": 1500,
            "max_price": 3000,
            "minBedrooms": 2,
            "maxBedrooms": 3,
            "property_type": ["Apartment", "any"],
            "furnishing": "any",
            "lifestyleFeatures": ["Gym", " roof terrace"],
            "petFriendlyFeatures": [],
            "secondaryLocation": "  ",
            "commuteLocation": "Canary Wharf",
            "commuteTimes": { "publicTransport": 40 },
            "moveInDate": "2025-04-01"
        });

        let prefs: Preferences = serde_json::from_value(json).unwrap();

        assert_eq!(prefs.user_id, "u1");
        assert_eq!(prefs.price, RangePreference::between(1500, 3000));
        assert_eq!(prefs.bedrooms, RangePreference::between(2, 3));
        assert_eq!(prefs.property_types.len(), 1);
        assert!(prefs.property_types.contains("apartment"));
        assert_eq!(prefs.furnishing, None);
        assert_eq!(prefs.features.len(), 1);
        assert!(prefs.requested_features().contains("roof_terrace"));
        assert_eq!(prefs.location.secondary_area, None);
        assert_eq!(prefs.location.commute_area.as_deref(), Some("Canary Wharf"));
        assert_eq!(prefs.location.commute_limits.public_transport, Some(40));
        assert!(prefs.location.is_set());
        assert_eq!(prefs.move_in, NaiveDate::from_ymd_opt(2025, 4, 1));
    }

    #[test]
    fn test_property_deserializes_normalized_features() {
        let json = serde_json::json!({
            "id": "p1",
            "price": 2000,
            "bedrooms": 2,
            "propertyType": "Apartment",
            "furnishing": "part-furnished",
            "lifestyleFeatures": ["Gym", "gym", "Roof Terrace"],
            "createdAt": "2025-03-01T09:00:00Z"
        });

        let property: Property = serde_json::from_value(json).unwrap();

        assert_eq!(property.property_type, "apartment");
        assert_eq!(property.furnishing, Some(Furnishing::PartFurnished));
        assert_eq!(property.features.len(), 2);
        assert!(!property.has_coordinates());
        assert!(property.media_urls.is_empty());
    }

    #[test]
    fn test_category_scores_accessors() {
        let mut scores = CategoryScores::uniform(50.0);
        scores.set(Category::Lifestyle, 10.0);
        assert_eq!(scores.get(Category::Lifestyle), 10.0);
        assert_eq!(scores.iter().count(), 6);
    }

    #[test]
    fn test_default_weights() {
        let weights = ScoringWeights::default();
        let total: f64 = Category::ALL.iter().map(|c| weights.get(*c)).sum();
        assert_eq!(total, 100.0);
        assert_eq!(weights.price, 30.0);
    }
}
