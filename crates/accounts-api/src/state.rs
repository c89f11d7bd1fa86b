//! Application state management

use accounts_core::config::AppConfig;
use accounts_core::{AuthorizationPolicy, UserRepository};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::auth::jwt::TokenService;
use crate::auth::password::{PasswordError, PasswordHasher};
use crate::auth::service::AuthService;
use crate::users::UserService;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// User storage backend
    pub store: Arc<dyn UserRepository>,
    /// Token signer, keyed once from `config.auth`
    pub tokens: Arc<TokenService>,
    /// Argon2id hasher
    pub hasher: Arc<PasswordHasher>,
    /// Access policy
    pub policy: AuthorizationPolicy,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Ready status
    pub is_ready: AtomicBool,
}

impl AppState {
    /// Create new application state with config and a storage backend
    pub fn new(config: AppConfig, store: Arc<dyn UserRepository>) -> Result<Self, PasswordError> {
        let tokens = Arc::new(TokenService::new(&config.auth));
        let hasher = Arc::new(PasswordHasher::new(&config.hashing)?);

        Ok(Self {
            config,
            store,
            tokens,
            hasher,
            policy: AuthorizationPolicy::new(),
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            is_ready: AtomicBool::new(true),
        })
    }

    pub fn auth_service(&self) -> AuthService {
        AuthService::new(self.store.clone(), self.tokens.clone(), self.hasher.clone())
    }

    pub fn user_service(&self) -> UserService {
        UserService::new(self.store.clone(), self.hasher.clone(), self.policy)
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is accepting traffic
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}
