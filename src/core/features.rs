use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// Features that earn a bonus when a listing has them without being asked
pub const PREMIUM_FEATURES: &[&str] = &[
    "air_conditioning",
    "balcony",
    "concierge",
    "dishwasher",
    "ensuite",
    "garden",
    "gym",
    "parking",
    "roof_terrace",
    "swimming_pool",
];

/// Which preference group a feature set was requested under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    Lifestyle,
    Social,
    Work,
    Convenience,
    PetFriendly,
    Luxury,
}

impl FeatureCategory {
    pub const ALL: [FeatureCategory; 6] = [
        FeatureCategory::Lifestyle,
        FeatureCategory::Social,
        FeatureCategory::Work,
        FeatureCategory::Convenience,
        FeatureCategory::PetFriendly,
        FeatureCategory::Luxury,
    ];
}

/// A normalized, category-tagged set of feature labels
///
/// Labels are normalized once on construction (see [`normalize_label`]), so
/// every comparison downstream is a plain string equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureSet {
    category: FeatureCategory,
    items: BTreeSet<String>,
}

impl FeatureSet {
    pub fn new<I, S>(category: FeatureCategory, raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            category,
            items: normalize_features(raw),
        }
    }

    pub fn category(&self) -> FeatureCategory {
        self.category
    }

    pub fn items(&self) -> &BTreeSet<String> {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.items.contains(feature)
    }
}

/// Normalize a free-form label: trimmed, lowercase, words joined by `_`
pub fn normalize_label(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Normalize a feature label, dropping blanks and the "any" wildcard
pub fn normalize_feature(raw: &str) -> Option<String> {
    let label = normalize_label(raw);
    if label.is_empty() || label == "any" {
        None
    } else {
        Some(label)
    }
}

pub fn normalize_features<I, S>(raw: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|f| normalize_feature(f.as_ref()))
        .collect()
}

#[inline]
pub fn is_premium(feature: &str) -> bool {
    PREMIUM_FEATURES.contains(&feature)
}

/// Serde helper for listing feature arrays; `null` reads as empty
pub fn deserialize_features<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<String>> = Option::deserialize(deserializer)?;
    Ok(normalize_features(raw.unwrap_or_default()))
}

/// Serde helper for single labels such as a property type
pub fn deserialize_label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(normalize_label(&raw))
}
