//! Authentication API handlers

use crate::audit::ClientInfo;
use crate::auth::{AuthError, LoginRequest, LoginResponse};
use crate::error::ApiJson;
use crate::state::AppState;
use axum::{extract::State, http::HeaderMap, Json};
use std::sync::Arc;

/// Login with login name and password
///
/// Returns the user's current bearer token, issuing a new 24-hour token
/// when none is stored or the stored one has expired.
///
/// # Responses
///
/// * `200 OK` - Authentication successful
/// * `401 Unauthorized` - Unknown login or wrong password
#[utoipa::path(
    post,
    path = "/v1/api/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Malformed request body", body = crate::error::ErrorBody),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorBody),
        (status = 500, description = "Internal server error", body = crate::error::ErrorBody),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let client = ClientInfo::from_headers(&headers);
    let response = state.auth_service().login(request, &client).await?;

    Ok(Json(response))
}
