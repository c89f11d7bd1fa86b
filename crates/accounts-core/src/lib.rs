//! Accounts Core - Domain models, access policy and storage port
//!
//! This crate defines the core abstractions used by the accounts service:
//! - User identity model and validated value objects (login, mobile phone)
//! - Role sets and the authenticated principal
//! - The authorization policy deciding who may touch which user record
//! - The `UserRepository` storage port (PostgreSQL and in-memory backends)
//! - Configuration management

pub mod access;
pub mod config;
pub mod store;
pub mod user;

pub use access::{AccessDenied, AuthorizationPolicy, Operation};
pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, HashingConfig, LoggingConfig,
    ServerConfig,
};
pub use store::{InMemoryUserStore, PgUserStore, UserRepository};
pub use user::{
    validate_password, Login, MobilePhone, NewUser, Principal, Role, RoleSet, User, UserId,
    UserPublic,
};

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for account operations
#[derive(Error, Debug)]
pub enum AccountsError {
    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Access denied: {reason}")]
    AccessDenied { reason: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists")]
    DuplicateUser,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<AccessDenied> for AccountsError {
    fn from(denied: AccessDenied) -> Self {
        AccountsError::AccessDenied {
            reason: denied.reason,
        }
    }
}

impl From<ConfigError> for AccountsError {
    fn from(err: ConfigError) -> Self {
        AccountsError::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AccountsError>;
