//! Accounts API - REST server for user accounts
//!
//! Login with a password to obtain a bearer token, then manage users under
//! `/v1/api/users`. Expired tokens are replaced transparently and the new
//! value is returned in the `X-Api-Token` response header.

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod users;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::API_TOKEN_HEADER;
use crate::state::AppState;

/// OpenAPI document for the public surface
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Accounts API",
        description = "User accounts with bearer-token authentication and role-based access"
    ),
    paths(
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::auth::login_handler,
        handlers::users::create_user,
        handlers::users::update_user,
        handlers::users::get_user,
        handlers::users::delete_user,
    ),
    components(schemas(
        error::ErrorBody,
        auth::LoginRequest,
        auth::LoginResponse,
        users::CreateUserRequest,
        users::UpdateUserRequest,
        users::UserResponse,
        users::UpdateUserResponse,
        users::DeleteResponse,
        handlers::health::HealthResponse,
        handlers::health::ReadinessResponse,
        handlers::health::ReadinessChecks,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness and readiness probes"),
        (name = "auth", description = "Login and token issue"),
        (name = "users", description = "User administration"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::health::metrics))
        .nest("/v1/api", routes::api_routes(state.clone()))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    layer
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([HeaderName::from_static(API_TOKEN_HEADER)])
}

/// Configuration with cheap Argon2 parameters for tests
#[cfg(any(test, feature = "test-utils"))]
pub fn test_config() -> accounts_core::AppConfig {
    let mut config = accounts_core::AppConfig::default();
    config.hashing.memory_cost = 1024;
    config.hashing.time_cost = 1;
    config.hashing.parallelism = 1;
    config
}

/// Application state over an empty in-memory store
#[cfg(any(test, feature = "test-utils"))]
pub fn test_state() -> Arc<AppState> {
    let store = Arc::new(accounts_core::InMemoryUserStore::new());
    let state = AppState::new(test_config(), store).expect("test hashing parameters are valid");
    Arc::new(state)
}

/// Router over a fresh in-memory state
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_for_testing() -> Router {
    create_router(test_state())
}
