//! User administration handlers
//!
//! All routes here sit behind the bearer middleware.

use crate::error::{ApiJson, AppError};
use crate::state::AppState;
use crate::users::{
    CreateUserRequest, DeleteResponse, UpdateUserRequest, UpdateUserResponse, UserResponse,
};
use accounts_core::Principal;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;

/// Create a user (root only)
#[utoipa::path(
    post,
    path = "/v1/api/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Validation failed", body = crate::error::ErrorBody),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 403, description = "Requires ROLE_ROOT", body = crate::error::ErrorBody),
        (status = 409, description = "User already exists", body = crate::error::ErrorBody),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiJson(request): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let user = state.user_service().create(&principal, request).await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Update a user
///
/// Non-root users may only update themselves. Omit `password` (or send an
/// empty string) to keep the current one.
#[utoipa::path(
    put,
    path = "/v1/api/users",
    tag = "users",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UpdateUserResponse),
        (status = 400, description = "Validation failed", body = crate::error::ErrorBody),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 403, description = "Access denied", body = crate::error::ErrorBody),
        (status = 404, description = "User not found", body = crate::error::ErrorBody),
        (status = 409, description = "User already exists", body = crate::error::ErrorBody),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiJson(request): ApiJson<UpdateUserRequest>,
) -> Result<Json<UpdateUserResponse>, AppError> {
    let response = state.user_service().update(&principal, request).await?;

    Ok(Json(response))
}

/// Get a user by ID
#[utoipa::path(
    get,
    path = "/v1/api/users/{id}",
    tag = "users",
    params(
        ("id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 403, description = "Access denied", body = crate::error::ErrorBody),
        (status = 404, description = "User not found", body = crate::error::ErrorBody),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.user_service().get(&principal, &id).await?;

    Ok(Json(user))
}

/// Delete a user (root only, never oneself)
#[utoipa::path(
    delete,
    path = "/v1/api/users/{id}",
    tag = "users",
    params(
        ("id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User deleted", body = DeleteResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 403, description = "Access denied", body = crate::error::ErrorBody),
        (status = 404, description = "User not found", body = crate::error::ErrorBody),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let response = state.user_service().delete(&principal, &id).await?;

    Ok(Json(response))
}
