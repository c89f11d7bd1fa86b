//! API route definitions

use crate::auth::middleware::auth_middleware;
use crate::handlers::{auth, users};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create `/v1/api` routes
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no authentication required)
    let public_routes = Router::new().route("/login", post(auth::login_handler));

    // Protected routes (bearer token required)
    let protected_routes = Router::new()
        .route("/users", post(users::create_user).put(users::update_user))
        .route("/users/:id", get(users::get_user).delete(users::delete_user))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new().merge(public_routes).merge(protected_routes)
}
