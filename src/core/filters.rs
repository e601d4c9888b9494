use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::models::{Furnishing, Preferences, Property};

/// Default candidate cap for match queries
pub const DEFAULT_CANDIDATE_POOL: usize = 100;

/// Candidate cap for insights, which look at a wider pool
pub const INSIGHTS_CANDIDATE_POOL: usize = 200;

/// Non-negotiable constraints derived from a preference profile
///
/// Only fields the user actually set produce a constraint. The same value is
/// handed to the property source as its query and then re-applied in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterSpec {
    pub min_price: Option<u32>,
    pub max_price: Option<u32>,
    pub min_bedrooms: Option<u8>,
    pub max_bedrooms: Option<u8>,
    pub property_types: BTreeSet<String>,
    pub furnishing: Option<Furnishing>,
    /// Latest acceptable `available_from`
    pub available_by: Option<NaiveDate>,
    /// Listing must carry at least one of these
    pub any_features: BTreeSet<String>,
    pub require_coordinates: bool,
    pub limit: usize,
}

impl FilterSpec {
    /// Build the hard filter for a profile
    ///
    /// Malformed ranges (min > max) are left out of the filter; scoring skips
    /// the affected category instead of excluding everything.
    pub fn from_preferences(preferences: &Preferences, limit: usize) -> Self {
        let (min_price, max_price) = if preferences.price.is_malformed() {
            tracing::debug!(user_id = %preferences.user_id, "Ignoring malformed price range in hard filter");
            (None, None)
        } else {
            (preferences.price.min, preferences.price.max)
        };

        let (min_bedrooms, max_bedrooms) = if preferences.bedrooms.is_malformed() {
            tracing::debug!(user_id = %preferences.user_id, "Ignoring malformed bedroom range in hard filter");
            (None, None)
        } else {
            (preferences.bedrooms.min, preferences.bedrooms.max)
        };

        Self {
            min_price,
            max_price,
            min_bedrooms,
            max_bedrooms,
            property_types: preferences.property_types.clone(),
            furnishing: preferences.furnishing,
            available_by: preferences.move_in,
            any_features: preferences
                .requested_features()
                .into_iter()
                .map(str::to_string)
                .collect(),
            require_coordinates: preferences.location.is_set(),
            limit,
        }
    }

    /// Unconstrained query returning the most recent listings
    pub fn recent(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// Check if a property satisfies every constraint in the filter
    #[inline]
    pub fn matches(&self, property: &Property) -> bool {
        if self.min_price.is_some_and(|min| property.price < min) {
            return false;
        }

        if self.max_price.is_some_and(|max| property.price > max) {
            return false;
        }

        if self.min_bedrooms.is_some_and(|min| property.bedrooms < min) {
            return false;
        }

        if self.max_bedrooms.is_some_and(|max| property.bedrooms > max) {
            return false;
        }

        if !self.property_types.is_empty() && !self.property_types.contains(&property.property_type) {
            return false;
        }

        if let Some(wanted) = self.furnishing {
            if property.furnishing != Some(wanted) {
                return false;
            }
        }

        // A listing without a date is available immediately
        if let (Some(by), Some(from)) = (self.available_by, property.available_from) {
            if from > by {
                return false;
            }
        }

        if !self.any_features.is_empty()
            && !property.features.iter().any(|f| self.any_features.contains(f))
        {
            return false;
        }

        if self.require_coordinates && !property.has_coordinates() {
            return false;
        }

        true
    }
}

/// Newest first; id breaks ties so the order is total
pub fn compare_recency(a: &Property, b: &Property) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Apply the hard filter to a candidate pool
///
/// Returns at most `spec.limit` properties, newest first. An empty result is
/// a valid outcome.
pub fn apply_hard_filter(spec: &FilterSpec, candidates: Vec<Property>) -> Vec<Property> {
    let total = candidates.len();

    let mut kept: Vec<Property> = candidates
        .into_iter()
        .filter(|property| spec.matches(property))
        .collect();

    kept.sort_by(compare_recency);
    kept.truncate(spec.limit);

    tracing::debug!("Hard filter kept {} of {} candidates", kept.len(), total);

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::FeatureCategory;
    use crate::models::RangePreference;
    use chrono::{Duration, TimeZone, Utc};

    fn create_test_property(id: &str, price: u32, bedrooms: u8) -> Property {
        Property {
            id: id.to_string(),
            price,
            bedrooms,
            bathrooms: 1,
            property_type: "apartment".to_string(),
            furnishing: Some(Furnishing::Furnished),
            features: ["gym".to_string()].into_iter().collect(),
            available_from: NaiveDate::from_ymd_opt(2025, 3, 1),
            latitude: Some(51.5136),
            longitude: Some(-0.1365),
            postcode: Some("W1D 3QF".to_string()),
            area: Some("soho".to_string()),
            created_at: Utc.with_ymd_and_hms(2025, 2, 20, 12, 0, 0).unwrap(),
            operator_id: None,
            media_keys: vec![],
            media_urls: vec![],
        }
    }

    fn create_test_preferences() -> Preferences {
        Preferences {
            price: RangePreference::between(2000, 2500),
            bedrooms: RangePreference::between(1, 2),
            ..Preferences::new("pref_user")
        }
    }

    #[test]
    fn test_price_outside_range_excluded() {
        let spec = FilterSpec::from_preferences(&create_test_preferences(), 100);

        assert!(spec.matches(&create_test_property("in", 2200, 2)));
        assert!(!spec.matches(&create_test_property("expensive", 5000, 2)));
        assert!(!spec.matches(&create_test_property("cheap", 1500, 2)));
    }

    #[test]
    fn test_bedrooms_outside_range_excluded() {
        let spec = FilterSpec::from_preferences(&create_test_preferences(), 100);
        assert!(!spec.matches(&create_test_property("big", 2200, 4)));
    }

    #[test]
    fn test_unset_fields_apply_no_filter() {
        let spec = FilterSpec::from_preferences(&Preferences::new("open"), 100);
        let mut property = create_test_property("p", 99_999, 9);
        property.latitude = None;
        property.furnishing = None;

        assert!(spec.matches(&property));
    }

    #[test]
    fn test_malformed_range_ignored() {
        let prefs = Preferences {
            price: RangePreference::between(3000, 1000),
            ..Preferences::new("bad")
        };
        let spec = FilterSpec::from_preferences(&prefs, 100);

        assert_eq!(spec.min_price, None);
        assert!(spec.matches(&create_test_property("p", 2000, 2)));
    }

    #[test]
    fn test_type_furnishing_and_availability() {
        let mut prefs = create_test_preferences();
        prefs.property_types.insert("house".to_string());
        let spec = FilterSpec::from_preferences(&prefs, 100);
        assert!(!spec.matches(&create_test_property("flat", 2200, 2)));

        let prefs = Preferences {
            furnishing: Some(Furnishing::Unfurnished),
            ..Preferences::new("u")
        };
        let spec = FilterSpec::from_preferences(&prefs, 100);
        assert!(!spec.matches(&create_test_property("furnished", 2200, 2)));

        let prefs = Preferences {
            move_in: NaiveDate::from_ymd_opt(2025, 2, 1),
            ..Preferences::new("u")
        };
        let spec = FilterSpec::from_preferences(&prefs, 100);
        assert!(!spec.matches(&create_test_property("later", 2200, 2)));
    }

    #[test]
    fn test_feature_and_location_requirements() {
        let prefs = Preferences::new("u").with_features(FeatureCategory::PetFriendly, ["garden"]);
        let spec = FilterSpec::from_preferences(&prefs, 100);
        assert!(!spec.matches(&create_test_property("no_garden", 2200, 2)));

        let mut prefs = Preferences::new("u");
        prefs.location.secondary_area = Some("soho".to_string());
        let spec = FilterSpec::from_preferences(&prefs, 100);
        let mut property = create_test_property("no_coords", 2200, 2);
        assert!(spec.matches(&property));
        property.longitude = None;
        assert!(!spec.matches(&property));
    }

    #[test]
    fn test_apply_hard_filter_sorts_and_caps() {
        let base = create_test_property("a", 2200, 2);
        let candidates: Vec<Property> = (0..5)
            .map(|i| Property {
                id: format!("p{}", i),
                created_at: base.created_at + Duration::days(i),
                ..base.clone()
            })
            .chain(std::iter::once(create_test_property("expensive", 9000, 2)))
            .collect();

        let spec = FilterSpec::from_preferences(&create_test_preferences(), 3);
        let kept = apply_hard_filter(&spec, candidates);

        let ids: Vec<&str> = kept.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p4", "p3", "p2"]);
    }

    #[test]
    fn test_empty_pool_is_not_an_error() {
        let spec = FilterSpec::from_preferences(&create_test_preferences(), 100);
        assert!(apply_hard_filter(&spec, vec![]).is_empty());
    }
}
