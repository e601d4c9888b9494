use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::time::Duration;
use thiserror::Error;

use crate::core::features::{normalize_features, normalize_label};
use crate::core::filters::FilterSpec;
use crate::models::{Furnishing, Property};
use crate::services::traits::{PropertySource, SourceError};

/// Errors that can occur when interacting with PostgreSQL
#[derive(Debug, Error)]
pub enum PostgresError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

impl From<PostgresError> for SourceError {
    fn from(value: PostgresError) -> Self {
        match value {
            PostgresError::SqlxError(sqlx::Error::PoolTimedOut) => SourceError::Unavailable(value.to_string()),
            PostgresError::InvalidRow(msg) => SourceError::InvalidData(msg),
            other => SourceError::Upstream(other.to_string()),
        }
    }
}

const PROPERTY_COLUMNS: &str = "id, price, bedrooms, bathrooms, property_type, furnishing, features, \
     available_from, latitude, longitude, postcode, area, operator_id, media_keys, created_at";

/// PostgreSQL-backed listing store
///
/// Candidate queries push every hard-filter constraint down into SQL so the
/// database returns at most `limit` rows, newest first.
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, PostgresError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, PostgresError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// Fetch listings passing the hard filter
    pub async fn query_candidates(&self, spec: &FilterSpec) -> Result<Vec<Property>, PostgresError> {
        let mut query = candidate_query(spec);
        let rows = query.build().fetch_all(&self.pool).await?;

        let mut properties = Vec::with_capacity(rows.len());
        for row in &rows {
            match property_from_row(row) {
                Ok(property) => properties.push(property),
                Err(e) => tracing::warn!("Skipping unreadable property row: {}", e),
            }
        }

        tracing::debug!("Queried {} candidates (limit {})", properties.len(), spec.limit);

        Ok(properties)
    }

    pub async fn fetch_property(&self, property_id: &str) -> Result<Option<Property>, PostgresError> {
        let query = format!("SELECT {} FROM properties WHERE id = $1", PROPERTY_COLUMNS);

        let row = sqlx::query(&query)
            .bind(property_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(property_from_row).transpose()
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, PostgresError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

#[async_trait]
impl PropertySource for PostgresClient {
    async fn list_candidates(&self, spec: &FilterSpec) -> Result<Vec<Property>, SourceError> {
        Ok(self.query_candidates(spec).await?)
    }

    async fn get_property(&self, property_id: &str) -> Result<Option<Property>, SourceError> {
        Ok(self.fetch_property(property_id).await?)
    }
}

/// Translate a filter into a parameterized SELECT
fn candidate_query(spec: &FilterSpec) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!("SELECT {} FROM properties WHERE TRUE", PROPERTY_COLUMNS));

    if let Some(min) = spec.min_price {
        query.push(" AND price >= ").push_bind(i64::from(min));
    }
    if let Some(max) = spec.max_price {
        query.push(" AND price <= ").push_bind(i64::from(max));
    }
    if let Some(min) = spec.min_bedrooms {
        query.push(" AND bedrooms >= ").push_bind(i16::from(min));
    }
    if let Some(max) = spec.max_bedrooms {
        query.push(" AND bedrooms <= ").push_bind(i16::from(max));
    }
    if !spec.property_types.is_empty() {
        let types: Vec<String> = spec.property_types.iter().cloned().collect();
        query.push(" AND property_type = ANY(").push_bind(types).push(")");
    }
    if let Some(furnishing) = spec.furnishing {
        query.push(" AND furnishing = ").push_bind(furnishing.as_str());
    }
    if let Some(by) = spec.available_by {
        query
            .push(" AND (available_from IS NULL OR available_from <= ")
            .push_bind(by)
            .push(")");
    }
    if !spec.any_features.is_empty() {
        let features: Vec<String> = spec.any_features.iter().cloned().collect();
        query.push(" AND features && ").push_bind(features).push("::text[]");
    }
    if spec.require_coordinates {
        query.push(" AND latitude IS NOT NULL AND longitude IS NOT NULL");
    }

    query
        .push(" ORDER BY created_at DESC, id ASC LIMIT ")
        .push_bind(spec.limit as i64);

    query
}

fn property_from_row(row: &PgRow) -> Result<Property, PostgresError> {
    let id: String = row.try_get("id")?;

    let price: i64 = row.try_get("price")?;
    let bedrooms: i16 = row.try_get("bedrooms")?;
    let bathrooms: i16 = row.try_get("bathrooms")?;

    let invalid = |field: &str| PostgresError::InvalidRow(format!("property {} has invalid {}", id, field));

    let furnishing: Option<String> = row.try_get("furnishing")?;
    let property_type: String = row.try_get("property_type")?;
    let features: Vec<String> = row.try_get("features")?;

    Ok(Property {
        price: u32::try_from(price).map_err(|_| invalid("price"))?,
        bedrooms: u8::try_from(bedrooms).map_err(|_| invalid("bedrooms"))?,
        bathrooms: u8::try_from(bathrooms).map_err(|_| invalid("bathrooms"))?,
        property_type: normalize_label(&property_type),
        furnishing: furnishing.as_deref().and_then(Furnishing::parse),
        features: normalize_features(features),
        available_from: row.try_get("available_from")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        postcode: row.try_get("postcode")?,
        area: row.try_get("area")?,
        operator_id: row.try_get("operator_id")?,
        media_keys: row.try_get("media_keys")?,
        media_urls: Vec::new(),
        created_at: row.try_get("created_at")?,
        id,
    })
}
