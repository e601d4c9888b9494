use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::models::{Notification, Preferences};
use crate::services::traits::{MediaResolver, Notifier, PreferenceSource, SourceError};

/// Errors that can occur when interacting with Appwrite
#[derive(Debug, Error)]
pub enum AppwriteError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: invalid API key or token")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

impl From<AppwriteError> for SourceError {
    fn from(value: AppwriteError) -> Self {
        match value {
            AppwriteError::RequestError(e) if e.is_timeout() || e.is_connect() => {
                SourceError::Unavailable(e.to_string())
            }
            AppwriteError::InvalidResponse(msg) => SourceError::InvalidData(msg),
            other => SourceError::Upstream(other.to_string()),
        }
    }
}

/// Collection IDs in Appwrite
#[derive(Debug, Clone)]
pub struct AppwriteCollections {
    pub preferences: String,
    pub notifications: String,
}

/// Storage bucket holding listing media
#[derive(Debug, Clone)]
pub struct AppwriteStorage {
    pub bucket_id: String,
    /// Base for URLs handed out when the bucket cannot be reached
    pub fallback_base_url: String,
}

/// Appwrite API client
///
/// Serves as three collaborators at once:
/// - preference source (documents in the preferences collection)
/// - notifier (documents written to the notifications collection)
/// - media resolver (file view URLs in the storage bucket)
pub struct AppwriteClient {
    base_url: String,
    api_key: String,
    project_id: String,
    database_id: String,
    client: Client,
    collections: AppwriteCollections,
    storage: AppwriteStorage,
}

impl AppwriteClient {
    /// Create a new Appwrite client
    pub fn new(
        base_url: String,
        api_key: String,
        project_id: String,
        database_id: String,
        collections: AppwriteCollections,
        storage: AppwriteStorage,
    ) -> Result<Self, AppwriteError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            project_id,
            database_id,
            client,
            collections,
            storage,
        })
    }

    fn documents_url(&self, collection: &str) -> String {
        format!(
            "{}/databases/{}/collections/{}/documents",
            self.base_url, self.database_id, collection
        )
    }

    fn file_url(&self, file_id: &str) -> String {
        format!(
            "{}/storage/buckets/{}/files/{}",
            self.base_url,
            self.storage.bucket_id,
            urlencoding::encode(file_id)
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("X-Appwrite-Key", &self.api_key)
            .header("X-Appwrite-Project", &self.project_id)
    }

    /// List documents matching the given Appwrite query strings
    async fn list_documents(&self, collection: &str, queries: &[String]) -> Result<Vec<Value>, AppwriteError> {
        let query_string = queries
            .iter()
            .map(|q| format!("queries[]={}", urlencoding::encode(q)))
            .collect::<Vec<_>>()
            .join("&");

        let url = if query_string.is_empty() {
            self.documents_url(collection)
        } else {
            format!("{}?{}", self.documents_url(collection), query_string)
        };

        tracing::debug!("Listing documents from: {}", url);

        let response = self.authorized(self.client.get(&url)).send().await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(AppwriteError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_else(|_| "Unable to read body".to_string());
                tracing::error!("Failed to list {}: {} - {}", collection, status, body);
                return Err(AppwriteError::ApiError(format!("Failed to list documents: {}", status)));
            }
        }

        let mut json: Value = response.json().await?;

        match json.get_mut("documents").map(Value::take) {
            Some(Value::Array(documents)) => Ok(documents),
            _ => Err(AppwriteError::InvalidResponse("Missing documents array".into())),
        }
    }

    /// Fetch the preference document for a user
    pub async fn fetch_preferences(&self, user_id: &str) -> Result<Option<Preferences>, AppwriteError> {
        let queries = [
            format!("equal(\"userId\", [\"{}\"])", user_id.replace('"', "\\\"")),
            "limit(1)".to_string(),
        ];

        let documents = self.list_documents(&self.collections.preferences, &queries).await?;

        let Some(doc) = documents.into_iter().next() else {
            tracing::debug!("No preferences stored for user {}", user_id);
            return Ok(None);
        };

        parse_preferences(doc)
            .map(Some)
            .map_err(|e| AppwriteError::InvalidResponse(format!("Failed to parse preferences: {}", e)))
    }

    /// Fetch one page of preference documents
    ///
    /// Documents that fail to parse are skipped with a warning so one bad
    /// profile cannot stall a regeneration pass.
    pub async fn fetch_preferences_page(&self, offset: usize, limit: usize) -> Result<Vec<Preferences>, AppwriteError> {
        let queries = [
            "orderAsc(\"userId\")".to_string(),
            format!("limit({})", limit),
            format!("offset({})", offset),
        ];

        let documents = self.list_documents(&self.collections.preferences, &queries).await?;
        let fetched = documents.len();

        let profiles: Vec<Preferences> = documents
            .into_iter()
            .filter_map(|doc| match parse_preferences(doc) {
                Ok(preferences) => Some(preferences),
                Err(e) => {
                    tracing::warn!("Skipping unparsable preference document: {}", e);
                    None
                }
            })
            .collect();

        tracing::debug!("Fetched {} of {} preference documents at offset {}", profiles.len(), fetched, offset);

        Ok(profiles)
    }

    /// Write one notification document
    pub async fn create_notification(&self, notification: &Notification) -> Result<(), AppwriteError> {
        let url = self.documents_url(&self.collections.notifications);

        let payload = json!({
            "documentId": uuid::Uuid::new_v4().to_string(),
            "data": notification,
        });

        let response = self.authorized(self.client.post(&url)).json(&payload).send().await?;

        if !response.status().is_success() {
            return Err(AppwriteError::ApiError(format!(
                "Failed to create notification: {}",
                response.status()
            )));
        }

        tracing::debug!(
            "Notified user {} about property {}",
            notification.user_id,
            notification.property_id
        );

        Ok(())
    }

    /// View URL for a stored file, after checking the file exists
    pub async fn file_view_url(&self, file_id: &str) -> Result<String, AppwriteError> {
        let response = self
            .authorized(self.client.get(self.file_url(file_id)))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(format!(
                "{}/view?project={}",
                self.file_url(file_id),
                urlencoding::encode(&self.project_id)
            )),
            StatusCode::NOT_FOUND => Err(AppwriteError::NotFound(format!("File {} not found", file_id))),
            status => Err(AppwriteError::ApiError(format!("Failed to probe file: {}", status))),
        }
    }

    fn fallback_url(&self, key: &str) -> String {
        format!(
            "{}/{}",
            self.storage.fallback_base_url.trim_end_matches('/'),
            urlencoding::encode(key)
        )
    }
}

fn parse_preferences(doc: Value) -> Result<Preferences, serde_json::Error> {
    // Extract preferences data from Appwrite document format
    let data = match doc {
        Value::Object(mut map) => match map.remove("data") {
            Some(data) => data,
            None => Value::Object(map),
        },
        other => other,
    };

    serde_json::from_value(data)
}

#[async_trait]
impl PreferenceSource for AppwriteClient {
    async fn get_preferences(&self, user_id: &str) -> Result<Option<Preferences>, SourceError> {
        Ok(self.fetch_preferences(user_id).await?)
    }

    async fn list_preferences(&self, offset: usize, limit: usize) -> Result<Vec<Preferences>, SourceError> {
        Ok(self.fetch_preferences_page(offset, limit).await?)
    }
}

#[async_trait]
impl MediaResolver for AppwriteClient {
    async fn resolve_url(&self, key: &str) -> String {
        if key.starts_with("http://") || key.starts_with("https://") {
            return key.to_string();
        }

        match self.file_view_url(key).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Media resolution failed for {}, using fallback: {}", key, e);
                self.fallback_url(key)
            }
        }
    }
}

#[async_trait]
impl Notifier for AppwriteClient {
    async fn notify_batch(&self, notifications: &[Notification]) -> Result<usize, SourceError> {
        let mut accepted = 0;

        for notification in notifications {
            match self.create_notification(notification).await {
                Ok(()) => accepted += 1,
                Err(e) => tracing::warn!(
                    "Failed to notify user {} about property {}: {}",
                    notification.user_id,
                    notification.property_id,
                    e
                ),
            }
        }

        Ok(accepted)
    }
}
