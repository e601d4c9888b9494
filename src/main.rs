use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use rent_match::config::{CacheBackend, Settings};
use rent_match::core::{Clock, Matcher, ScoringEngine, SystemClock, ThresholdPolicy};
use rent_match::models::ScoringWeights;
use rent_match::routes::{self, matches::AppState};
use rent_match::services::cache::DEFAULT_MEMORY_CAPACITY;
use rent_match::services::{
    AppwriteClient, AppwriteCollections, AppwriteStorage, Collaborators, KeyValueStore,
    MatchingService, MemoryStore, PostgresClient, RedisStore, ResultCache,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("Query payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_logging(level: &str, format: &str) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}

async fn build_store(settings: &Settings, clock: Arc<dyn Clock>) -> Arc<dyn KeyValueStore> {
    let cache = &settings.cache;

    if cache.backend == CacheBackend::Redis {
        match &cache.redis_url {
            Some(url) => {
                let l1_cache_size = cache.l1_cache_size.unwrap_or(1000);
                match RedisStore::new(url, &cache.namespace, l1_cache_size, cache.ttl()).await {
                    Ok(store) => {
                        info!("Redis cache initialized (L1: {} entries)", l1_cache_size);
                        return Arc::new(store);
                    }
                    Err(e) => warn!("Failed to connect to Redis ({}), using in-process cache", e),
                }
            }
            None => warn!("Redis cache selected without cache.redis_url, using in-process cache"),
        }
    }

    let capacity = cache
        .l1_cache_size
        .map_or(DEFAULT_MEMORY_CAPACITY, |size| size as usize);
    info!("In-process cache initialized ({} entries)", capacity);
    Arc::new(MemoryStore::with_capacity(clock, capacity))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
        }
    };

    init_logging(&settings.logging.level, &settings.logging.format);

    info!("Starting Rent Match service...");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Appwrite backs preferences, notifications and media
    let appwrite = Arc::new(
        AppwriteClient::new(
            settings.appwrite.endpoint.clone(),
            settings.appwrite.api_key.clone(),
            settings.appwrite.project_id.clone(),
            settings.appwrite.database_id.clone(),
            AppwriteCollections {
                preferences: settings.collection.preferences.clone(),
                notifications: settings.collection.notifications.clone(),
            },
            AppwriteStorage {
                bucket_id: settings.storage.bucket_id.clone(),
                fallback_base_url: settings.storage.fallback_base_url.clone(),
            },
        )
        .map_err(|e| startup_error("Failed to create Appwrite client", e))?,
    );

    info!("Appwrite client initialized");

    let postgres = Arc::new(
        PostgresClient::from_settings(
            &settings.database.url,
            settings.database.max_connections,
            settings.database.min_connections,
            settings.database.acquire_timeout_secs,
            settings.database.idle_timeout_secs,
        )
        .await
        .map_err(|e| startup_error("Failed to connect to PostgreSQL", e))?,
    );

    info!("PostgreSQL client initialized");

    let store = build_store(&settings, clock.clone()).await;
    let cache = ResultCache::new(store, settings.cache.ttl());

    // Initialize matcher with configured weights and perfect-match policy
    let weights = ScoringWeights::from(&settings.scoring.weights);
    let policy = ThresholdPolicy::from(&settings.scoring.perfect_match);
    let matcher = Matcher::new(ScoringEngine::new(weights), Arc::new(policy));

    info!("Matcher initialized with weights: {:?}, policy: {:?}", weights, policy);

    let collaborators = Collaborators {
        properties: postgres.clone(),
        preferences: appwrite.clone(),
        media: appwrite.clone(),
        notifier: appwrite,
    };

    let app_state = AppState {
        service: MatchingService::new(collaborators, matcher, cache, clock, settings.matching.limits()),
        postgres: Some(postgres),
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
