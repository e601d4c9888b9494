use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::core::ranking::ThresholdPolicy;
use crate::models::ScoringWeights;
use crate::services::MatchingLimits;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub appwrite: AppwriteSettings,
    pub collection: CollectionSettings,
    pub storage: StorageSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppwriteSettings {
    pub endpoint: String,
    pub api_key: String,
    pub project_id: String,
    pub database_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionSettings {
    pub preferences: String,
    pub notifications: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub bucket_id: String,
    pub fallback_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

/// Which key-value store backs the result cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_backend")]
    pub backend: CacheBackend,
    pub redis_url: Option<String>,
    #[serde(default = "default_cache_namespace")]
    pub namespace: String,
    pub ttl_secs: Option<u64>,
    pub l1_cache_size: Option<u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            redis_url: None,
            namespace: default_cache_namespace(),
            ttl_secs: None,
            l1_cache_size: None,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.unwrap_or(300))
    }
}

fn default_cache_backend() -> CacheBackend { CacheBackend::Memory }
fn default_cache_namespace() -> String { "rent-match:".to_string() }

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchingSettings {
    pub default_limit: Option<usize>,
    pub max_limit: Option<usize>,
    pub candidate_pool: Option<usize>,
    pub insights_pool: Option<usize>,
    pub high_score_threshold: Option<f64>,
    pub regeneration_chunk_size: Option<usize>,
    pub notification_batch_size: Option<usize>,
}

impl MatchingSettings {
    pub fn limits(&self) -> MatchingLimits {
        let defaults = MatchingLimits::default();

        MatchingLimits {
            default_limit: self.default_limit.unwrap_or(defaults.default_limit),
            max_limit: self.max_limit.unwrap_or(defaults.max_limit),
            candidate_pool: self.candidate_pool.unwrap_or(defaults.candidate_pool),
            insights_pool: self.insights_pool.unwrap_or(defaults.insights_pool),
            default_threshold: self.high_score_threshold.unwrap_or(defaults.default_threshold),
            regeneration_chunk_size: self
                .regeneration_chunk_size
                .unwrap_or(defaults.regeneration_chunk_size),
            notification_batch_size: self
                .notification_batch_size
                .unwrap_or(defaults.notification_batch_size),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoringSettings {
    #[serde(default)]
    pub weights: WeightsConfig,
    #[serde(default)]
    pub perfect_match: PerfectMatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_price_weight")]
    pub price: f64,
    #[serde(default = "default_location_weight")]
    pub location: f64,
    #[serde(default = "default_property_weight")]
    pub property: f64,
    #[serde(default = "default_lifestyle_weight")]
    pub lifestyle: f64,
    #[serde(default = "default_availability_weight")]
    pub availability: f64,
    #[serde(default = "default_freshness_weight")]
    pub freshness: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            price: default_price_weight(),
            location: default_location_weight(),
            property: default_property_weight(),
            lifestyle: default_lifestyle_weight(),
            availability: default_availability_weight(),
            freshness: default_freshness_weight(),
        }
    }
}

impl From<&WeightsConfig> for ScoringWeights {
    fn from(config: &WeightsConfig) -> Self {
        Self {
            price: config.price,
            location: config.location,
            property: config.property,
            lifestyle: config.lifestyle,
            availability: config.availability,
            freshness: config.freshness,
        }
    }
}

fn default_price_weight() -> f64 { 30.0 }
fn default_location_weight() -> f64 { 25.0 }
fn default_property_weight() -> f64 { 20.0 }
fn default_lifestyle_weight() -> f64 { 15.0 }
fn default_availability_weight() -> f64 { 5.0 }
fn default_freshness_weight() -> f64 { 5.0 }

/// Perfect-match thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct PerfectMatchConfig {
    #[serde(default = "default_primary_threshold")]
    pub primary_threshold: f64,
    #[serde(default = "default_primary_required")]
    pub primary_required: usize,
    #[serde(default = "default_supporting_threshold")]
    pub supporting_threshold: f64,
    #[serde(default = "default_min_match_score")]
    pub min_match_score: f64,
}

impl Default for PerfectMatchConfig {
    fn default() -> Self {
        Self {
            primary_threshold: default_primary_threshold(),
            primary_required: default_primary_required(),
            supporting_threshold: default_supporting_threshold(),
            min_match_score: default_min_match_score(),
        }
    }
}

impl From<&PerfectMatchConfig> for ThresholdPolicy {
    fn from(config: &PerfectMatchConfig) -> Self {
        Self {
            primary_threshold: config.primary_threshold,
            primary_required: config.primary_required,
            supporting_threshold: config.supporting_threshold,
            min_match_score: config.min_match_score,
        }
    }
}

fn default_primary_threshold() -> f64 { 90.0 }
fn default_primary_required() -> usize { 2 }
fn default_supporting_threshold() -> f64 { 80.0 }
fn default_min_match_score() -> f64 { 80.0 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

const ENV_PREFIX: &str = "RENTMATCH";

fn environment() -> Environment {
    // e.g., RENTMATCH__SERVER__PORT -> server.port
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with RENTMATCH__)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(environment())
            .build()?;

        let settings = apply_database_url(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        settings.try_deserialize()
    }
}

/// Honor the conventional `DATABASE_URL` when no database URL is configured
fn apply_database_url(settings: Config) -> Result<Config, ConfigError> {
    if settings.get_string("database.url").is_ok() {
        return Ok(settings);
    }

    match std::env::var("DATABASE_URL") {
        Ok(url) => Config::builder()
            .add_source(settings)
            .set_override("database.url", url)?
            .build(),
        Err(_) => Ok(settings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const MINIMAL: &str = r#"
        [server]
        host = "0.0.0.0"
        port = 8080

        [appwrite]
        endpoint = "https://appwrite.test/v1"
        api_key = "key"
        project_id = "project"
        database_id = "db"

        [collection]
        preferences = "preferences"
        notifications = "notifications"

        [storage]
        bucket_id = "media"
        fallback_base_url = "https://cdn.test/media"

        [database]
        url = "postgres://localhost/rent_match"
    "#;

    fn parse(extra: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(&format!("{}\n{}", MINIMAL, extra), FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_weights() {
        let weights = ScoringWeights::from(&WeightsConfig::default());
        assert_eq!(weights, ScoringWeights::default());
    }

    #[test]
    fn test_default_logging() {
        let level = default_log_level();
        let format = default_log_format();
        assert_eq!(level, "info");
        assert_eq!(format, "json");
    }

    #[test]
    fn test_minimal_settings_fill_defaults() {
        let settings = parse("");

        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.cache.backend, CacheBackend::Memory);
        assert_eq!(settings.cache.ttl(), Duration::from_secs(300));
        assert_eq!(settings.matching.limits(), MatchingLimits::default());
        assert_eq!(
            ThresholdPolicy::from(&settings.scoring.perfect_match),
            ThresholdPolicy::default()
        );
    }

    #[test]
    fn test_overrides() {
        let settings = parse(
            r#"
            [cache]
            backend = "redis"
            redis_url = "redis://127.0.0.1:6379"
            ttl_secs = 60

            [matching]
            max_limit = 50

            [scoring.weights]
            price = 40.0

            [scoring.perfect_match]
            primary_required = 1
            "#,
        );

        assert_eq!(settings.cache.backend, CacheBackend::Redis);
        assert_eq!(settings.cache.ttl(), Duration::from_secs(60));
        assert_eq!(settings.matching.limits().max_limit, 50);
        assert_eq!(settings.matching.limits().default_limit, 20);
        assert_eq!(settings.scoring.weights.price, 40.0);
        assert_eq!(settings.scoring.weights.location, 25.0);
        assert_eq!(settings.scoring.perfect_match.primary_required, 1);
    }
}
