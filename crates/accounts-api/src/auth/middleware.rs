//! Authentication middleware for protecting routes
//!
//! Resolves the bearer token against stored tokens and adds the
//! `Principal` to request extensions. When the presented token had expired,
//! the replacement is relayed to the client in the `X-Api-Token` header.

use accounts_core::AccountsError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use thiserror::Error;

use super::jwt::TokenError;
use super::password::PasswordError;
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::error::{error_response, AppError};
use crate::state::AppState;

/// Response header carrying a rotated token
pub const API_TOKEN_HEADER: &str = "x-api-token";

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Internal(#[from] AppError),
}

impl From<AccountsError> for AuthError {
    fn from(err: AccountsError) -> Self {
        AuthError::Internal(err.into())
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        AuthError::Internal(err.into())
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::Internal(err.into())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Internal(err) => err.into_response(),
            other => error_response(StatusCode::UNAUTHORIZED, other.to_string()),
        }
    }
}

/// Authentication middleware that requires a stored, validly signed token
///
/// ```ignore
/// let protected = Router::new()
///     .route("/users/:id", get(get_user))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
///
/// Handlers then take `Extension<Principal>`.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let client = ClientInfo::from_headers(request.headers());

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().map(str::to_owned))
        .transpose()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let authentication = match state
        .auth_service()
        .authenticate(auth_header.as_deref())
        .await
    {
        Ok(authentication) => authentication,
        Err(AuthError::Internal(err)) => return Err(AuthError::Internal(err)),
        Err(err) => {
            audit_log(&AuditEvent::InvalidToken {
                ip_address: client.ip_address,
                user_agent: client.user_agent,
                reason: err.to_string(),
            });
            return Err(err);
        }
    };

    request.extensions_mut().insert(authentication.principal);

    let mut response = next.run(request).await;

    if let Some(token) = authentication.rotated_token {
        match HeaderValue::from_str(&token) {
            Ok(value) => {
                response.headers_mut().insert(API_TOKEN_HEADER, value);
            }
            Err(e) => tracing::error!(error = %e, "Rotated token is not a valid header value"),
        }
    }

    Ok(response)
}
