//! User storage port
//!
//! `UserRepository` is the only way the service touches persisted accounts.
//! Two backends implement it:
//! - `PgUserStore`: PostgreSQL via SQLx
//! - `InMemoryUserStore`: process-local map for tests and local runs

mod memory;
mod postgres;

pub use memory::InMemoryUserStore;
pub use postgres::PgUserStore;

use async_trait::async_trait;

use crate::user::{Login, MobilePhone, NewUser, User, UserId};
use crate::Result;

/// Trait for user persistence
///
/// Implementations must enforce `(login, phone)` uniqueness themselves and
/// report collisions as `AccountsError::DuplicateUser`. Any other backend
/// failure is reported as `AccountsError::DatabaseError`.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Get user by ID
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>>;

    /// Get user by login. With several matches (same login, different
    /// phones) the lowest id wins.
    async fn find_by_login(&self, login: &str) -> Result<Option<User>>;

    /// Get user by the unique `(login, phone)` pair
    async fn find_by_login_and_phone(
        &self,
        login: &Login,
        phone: &MobilePhone,
    ) -> Result<Option<User>>;

    /// Get user whose stored bearer token equals `token` exactly
    async fn find_by_api_token(&self, token: &str) -> Result<Option<User>>;

    /// Insert a new user and return it with its assigned id
    async fn insert(&self, user: NewUser) -> Result<User>;

    /// Overwrite login, phone, password hash and roles of an existing user.
    /// The stored token is left alone.
    async fn update(&self, user: &User) -> Result<User>;

    /// Replace the stored token only if it still equals `expected`.
    ///
    /// Returns `false` when another writer got there first.
    async fn replace_api_token(
        &self,
        id: UserId,
        expected: Option<&str>,
        token: &str,
    ) -> Result<bool>;

    /// Delete user. Returns `false` if nothing was deleted.
    async fn delete(&self, id: UserId) -> Result<bool>;

    /// Check backend connectivity
    async fn ping(&self) -> Result<()>;
}
