use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use validator::Validate;

use crate::models::{DetailedMatchesQuery, ErrorResponse, HealthResponse, HighScoreQuery, MatchesQuery};
use crate::services::{MatchingError, MatchingService, PostgresClient};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: MatchingService,
    /// Probed by the health check when configured
    pub postgres: Option<Arc<PostgresClient>>,
}

/// Configure all match-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/users/{user_id}/matches", web::get().to(find_matches))
        .route("/users/{user_id}/matches/detailed", web::get().to(detailed_matches))
        .route("/users/{user_id}/matches/perfect", web::get().to(perfect_matches))
        .route("/users/{user_id}/matches/high-score", web::get().to(high_score_matches))
        .route("/users/{user_id}/insights", web::get().to(insights))
        .route("/users/{user_id}/preferences/changed", web::post().to(preferences_changed))
        .route("/properties/changed", web::post().to(property_changed))
        .route("/properties/{property_id}/regenerate", web::post().to(regenerate));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let healthy = match &state.postgres {
        Some(postgres) => postgres.health_check().await.unwrap_or(false),
        None => true,
    };

    let status = if healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

fn error_response(err: &MatchingError) -> HttpResponse {
    let (mut builder, error, status_code) = match err {
        MatchingError::InvalidRequest(_) => (HttpResponse::BadRequest(), "Invalid request", 400),
        MatchingError::NotFound(_) => (HttpResponse::NotFound(), "Not found", 404),
        MatchingError::Source(_) => (HttpResponse::BadGateway(), "Upstream failure", 502),
    };

    if status_code >= 500 {
        tracing::error!("Request failed: {}", err);
    } else {
        tracing::info!("Request rejected: {}", err);
    }

    builder.json(ErrorResponse {
        error: error.to_string(),
        message: err.to_string(),
        status_code,
    })
}

fn validation_failed(errors: validator::ValidationErrors) -> HttpResponse {
    tracing::info!("Validation failed: field_errors={:?}", errors);
    HttpResponse::BadRequest().json(ErrorResponse {
        error: "Validation failed".to_string(),
        message: errors.to_string(),
        status_code: 400,
    })
}

fn respond<T: serde::Serialize>(result: Result<T, MatchingError>) -> HttpResponse {
    match result {
        Ok(body) => HttpResponse::Ok().json(body),
        Err(e) => error_response(&e),
    }
}

/// GET /api/v1/users/{user_id}/matches?limit=20
async fn find_matches(
    state: web::Data<AppState>,
    user_id: web::Path<String>,
    query: web::Query<MatchesQuery>,
) -> impl Responder {
    if let Err(errors) = query.validate() {
        return validation_failed(errors);
    }

    let limit = query.limit.map(usize::from);
    respond(state.service.find_matches(&user_id, limit).await)
}

/// GET /api/v1/users/{user_id}/matches/detailed?limit=20&includeInsights=true
async fn detailed_matches(
    state: web::Data<AppState>,
    user_id: web::Path<String>,
    query: web::Query<DetailedMatchesQuery>,
) -> impl Responder {
    if let Err(errors) = query.validate() {
        return validation_failed(errors);
    }

    let limit = query.limit.map(usize::from);
    respond(
        state
            .service
            .detailed_matches(&user_id, limit, query.include_insights)
            .await,
    )
}

/// GET /api/v1/users/{user_id}/matches/perfect
async fn perfect_matches(
    state: web::Data<AppState>,
    user_id: web::Path<String>,
    query: web::Query<MatchesQuery>,
) -> impl Responder {
    if let Err(errors) = query.validate() {
        return validation_failed(errors);
    }

    let limit = query.limit.map(usize::from);
    respond(state.service.perfect_matches(&user_id, limit).await)
}

/// GET /api/v1/users/{user_id}/matches/high-score?threshold=85&limit=20
async fn high_score_matches(
    state: web::Data<AppState>,
    user_id: web::Path<String>,
    query: web::Query<HighScoreQuery>,
) -> impl Responder {
    if let Err(errors) = query.validate() {
        return validation_failed(errors);
    }

    let limit = query.limit.map(usize::from);
    respond(
        state
            .service
            .high_score_matches(&user_id, query.threshold, limit)
            .await,
    )
}

/// GET /api/v1/users/{user_id}/insights
async fn insights(state: web::Data<AppState>, user_id: web::Path<String>) -> impl Responder {
    respond(state.service.insights(&user_id).await)
}

/// POST /api/v1/properties/{property_id}/regenerate
async fn regenerate(state: web::Data<AppState>, property_id: web::Path<String>) -> impl Responder {
    respond(state.service.regenerate_for_property(&property_id).await)
}

/// POST /api/v1/users/{user_id}/preferences/changed
async fn preferences_changed(state: web::Data<AppState>, user_id: web::Path<String>) -> impl Responder {
    match state.service.preferences_changed(&user_id).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/properties/changed
async fn property_changed(state: web::Data<AppState>) -> impl Responder {
    state.service.property_changed().await;
    HttpResponse::NoContent().finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Matcher, SystemClock};
    use crate::models::{Property, RangePreference, Preferences};
    use crate::services::{
        cache::DEFAULT_TTL, Collaborators, InMemoryPreferences, InMemoryProperties, MatchingLimits,
        MemoryStore, RecordingNotifier, ResultCache, StaticMediaResolver,
    };
    use actix_web::{http::StatusCode, test, App};

    fn property(id: &str, price: u32) -> Property {
        Property {
            id: id.to_string(),
            price,
            bedrooms: 2,
            bathrooms: 1,
            property_type: "flat".to_string(),
            furnishing: None,
            features: Default::default(),
            available_from: None,
            latitude: None,
            longitude: None,
            postcode: None,
            area: None,
            created_at: chrono::Utc::now(),
            operator_id: None,
            media_keys: vec!["front.jpg".to_string()],
            media_urls: vec![],
        }
    }

    fn state() -> AppState {
        let clock = Arc::new(SystemClock);
        let collaborators = Collaborators {
            properties: Arc::new(InMemoryProperties::new([property("p1", 1800), property("p2", 5000)])),
            preferences: Arc::new(InMemoryPreferences::new([Preferences {
                price: RangePreference::between(1500, 2500),
                ..Preferences::new("u1")
            }])),
            media: Arc::new(StaticMediaResolver::new("https://cdn.test")),
            notifier: Arc::new(RecordingNotifier::new()),
        };
        let cache = ResultCache::new(Arc::new(MemoryStore::new(clock.clone())), DEFAULT_TTL);

        AppState {
            service: MatchingService::new(collaborators, Matcher::default(), cache, clock, MatchingLimits::default()),
            postgres: None,
        }
    }

    #[actix_web::test]
    async fn test_health_check_response() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let body: HealthResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.status, "healthy");
    }

    #[actix_web::test]
    async fn test_matches_endpoint() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/users/u1/matches?limit=5").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["totalResults"], 1);
        assert_eq!(body["properties"][0]["id"], "p1");
        assert_eq!(body["properties"][0]["mediaUrls"][0], "https://cdn.test/front.jpg");
    }

    #[actix_web::test]
    async fn test_error_mapping() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/v1/properties/missing/regenerate").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri("/api/v1/users/u1/matches/high-score?threshold=150")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/api/v1/users/%20/matches").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
