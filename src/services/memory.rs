use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};

use crate::core::filters::{apply_hard_filter, FilterSpec};
use crate::models::{Notification, Preferences, Property};
use crate::services::traits::{
    MediaResolver, Notifier, PreferenceSource, PropertySource, SourceError,
};

/// Listings held in memory
#[derive(Debug, Default)]
pub struct InMemoryProperties {
    properties: RwLock<HashMap<String, Property>>,
}

impl InMemoryProperties {
    pub fn new(properties: impl IntoIterator<Item = Property>) -> Self {
        Self {
            properties: RwLock::new(properties.into_iter().map(|p| (p.id.clone(), p)).collect()),
        }
    }

    pub async fn upsert(&self, property: Property) {
        self.properties.write().await.insert(property.id.clone(), property);
    }

    pub async fn remove(&self, property_id: &str) -> Option<Property> {
        self.properties.write().await.remove(property_id)
    }
}

#[async_trait]
impl PropertySource for InMemoryProperties {
    async fn list_candidates(&self, spec: &FilterSpec) -> Result<Vec<Property>, SourceError> {
        let all: Vec<Property> = self.properties.read().await.values().cloned().collect();
        Ok(apply_hard_filter(spec, all))
    }

    async fn get_property(&self, property_id: &str) -> Result<Option<Property>, SourceError> {
        Ok(self.properties.read().await.get(property_id).cloned())
    }
}

/// Preference profiles held in memory, listed in user id order
#[derive(Debug, Default)]
pub struct InMemoryPreferences {
    profiles: RwLock<Vec<Preferences>>,
}

impl InMemoryPreferences {
    pub fn new(profiles: impl IntoIterator<Item = Preferences>) -> Self {
        let mut profiles: Vec<Preferences> = profiles.into_iter().collect();
        profiles.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Self {
            profiles: RwLock::new(profiles),
        }
    }

    /// Insert or replace the profile for `preferences.user_id`
    pub async fn upsert(&self, preferences: Preferences) {
        let mut profiles = self.profiles.write().await;
        match profiles.binary_search_by(|p| p.user_id.cmp(&preferences.user_id)) {
            Ok(index) => profiles[index] = preferences,
            Err(index) => profiles.insert(index, preferences),
        }
    }
}

#[async_trait]
impl PreferenceSource for InMemoryPreferences {
    async fn get_preferences(&self, user_id: &str) -> Result<Option<Preferences>, SourceError> {
        Ok(self
            .profiles
            .read()
            .await
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn list_preferences(&self, offset: usize, limit: usize) -> Result<Vec<Preferences>, SourceError> {
        Ok(self
            .profiles
            .read()
            .await
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Resolves every key to `{base}/{key}`
#[derive(Debug, Clone)]
pub struct StaticMediaResolver {
    base_url: String,
}

impl StaticMediaResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MediaResolver for StaticMediaResolver {
    async fn resolve_url(&self, key: &str) -> String {
        if key.starts_with("http://") || key.starts_with("https://") {
            return key.to_string();
        }
        format!("{}/{}", self.base_url.trim_end_matches('/'), urlencoding::encode(key))
    }
}

/// Keeps every batch it is handed, in order
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    batches: Mutex<Vec<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn batches(&self) -> Vec<Vec<Notification>> {
        self.batches.lock().await.clone()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.batches.lock().await.iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_batch(&self, notifications: &[Notification]) -> Result<usize, SourceError> {
        self.batches.lock().await.push(notifications.to_vec());
        Ok(notifications.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_preferences_paging() {
        let source = InMemoryPreferences::new(
            ["c", "a", "b"].into_iter().map(Preferences::new),
        );

        let first = source.list_preferences(0, 2).await.unwrap();
        let second = source.list_preferences(2, 2).await.unwrap();

        assert_eq!(first.iter().map(|p| p.user_id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(second.len(), 1);
        assert!(source.list_preferences(3, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticMediaResolver::new("https://cdn.test/media/");

        assert_eq!(resolver.resolve_url("abc 1.jpg").await, "https://cdn.test/media/abc%201.jpg");
        assert_eq!(resolver.resolve_url("https://x.test/a.jpg").await, "https://x.test/a.jpg");
    }
}
