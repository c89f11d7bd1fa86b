//! Security audit logging for account events
//!
//! All audit events are logged at INFO level with the "audit" target,
//! making them easy to filter and route separately from application logs.
//!
//! ```ignore
//! use accounts_api::audit::{audit_log, AuditEvent};
//!
//! audit_log(&AuditEvent::TokenRotated { user_id: 7 });
//! ```

use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Successful password login
    LoginSuccess {
        user_id: i64,
        login: String,
        token_reused: bool,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Failed login attempt
    LoginFailure {
        login: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Expired bearer token replaced during authentication
    TokenRotated { user_id: i64 },

    /// Missing, unknown or malformed bearer token
    InvalidToken {
        ip_address: Option<String>,
        user_agent: Option<String>,
        reason: String,
    },

    /// Authorization policy refused an operation
    AccessDenied {
        user_id: i64,
        target_id: Option<i64>,
        operation: String,
        reason: String,
    },

    UserCreated {
        user_id: i64,
        login: String,
        created_by: i64,
    },

    UserUpdated {
        user_id: i64,
        updated_by: i64,
        password_changed: bool,
    },

    UserDeleted { user_id: i64, deleted_by: i64 },

    /// Root account created through the bootstrap path
    RootProvisioned { user_id: i64, phone: String },
}

impl AuditEvent {
    fn message(&self) -> &'static str {
        match self {
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::TokenRotated { .. } => "Token rotated",
            AuditEvent::InvalidToken { .. } => "Invalid token",
            AuditEvent::AccessDenied { .. } => "Access denied",
            AuditEvent::UserCreated { .. } => "User created",
            AuditEvent::UserUpdated { .. } => "User updated",
            AuditEvent::UserDeleted { .. } => "User deleted",
            AuditEvent::RootProvisioned { .. } => "Root user provisioned",
        }
    }
}

/// Log a security audit event with structured fields
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();

    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    match event {
        AuditEvent::LoginSuccess {
            user_id,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                ip_address = ?ip_address,
                "{}", event.message()
            );
        }
        AuditEvent::LoginFailure {
            login,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                login = %login,
                reason = %reason,
                ip_address = ?ip_address,
                "{}", event.message()
            );
        }
        AuditEvent::InvalidToken {
            ip_address, reason, ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                ip_address = ?ip_address,
                reason = %reason,
                "{}", event.message()
            );
        }
        AuditEvent::AccessDenied {
            user_id,
            target_id,
            operation,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                user_id = %user_id,
                target_id = ?target_id,
                operation = %operation,
                "{}", event.message()
            );
        }
        _ => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                "{}", event.message()
            );
        }
    }
}

/// Client details recorded alongside audit events
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Extract IP address from request headers
///
/// Checks X-Forwarded-For, then X-Real-IP.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    // Check X-Forwarded-For (proxy/load balancer)
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            // Take the first IP in the chain (client IP)
            if let Some(first_ip) = xff_str.split(',').next() {
                return Some(first_ip.trim().to_string());
            }
        }
    }

    // Check X-Real-IP (nginx proxy)
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.to_string());
        }
    }

    None
}

/// Extract user agent from request headers
pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
