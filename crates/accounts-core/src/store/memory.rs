//! In-memory user store
//!
//! Keeps accounts in a `BTreeMap` behind a tokio `RwLock`. Used by the test
//! router and for running the service without PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::UserRepository;
use crate::user::{Login, MobilePhone, NewUser, User, UserId};
use crate::{AccountsError, Result};

#[derive(Debug)]
struct MemoryState {
    users: BTreeMap<UserId, User>,
    next_id: i64,
}

/// Process-local user store
#[derive(Debug)]
pub struct InMemoryUserStore {
    state: RwLock<MemoryState>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState {
                users: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Number of stored users
    pub async fn len(&self) -> usize {
        self.state.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryState {
    fn pair_taken(&self, login: &Login, phone: &MobilePhone, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && &u.login == login && &u.phone == phone)
    }

    fn token_taken(&self, token: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.api_token.as_deref() == Some(token))
    }
}

#[async_trait]
impl UserRepository for InMemoryUserStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>> {
        // BTreeMap iterates in id order, so the first match has the lowest id
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.login.as_str() == login)
            .cloned())
    }

    async fn find_by_login_and_phone(
        &self,
        login: &Login,
        phone: &MobilePhone,
    ) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| &u.login == login && &u.phone == phone)
            .cloned())
    }

    async fn find_by_api_token(&self, token: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.api_token.as_deref() == Some(token))
            .cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<User> {
        let mut state = self.state.write().await;

        if state.pair_taken(&user.login, &user.phone, None) {
            return Err(AccountsError::DuplicateUser);
        }
        if let Some(token) = &user.api_token {
            if state.token_taken(token, None) {
                return Err(AccountsError::DuplicateUser);
            }
        }

        let id = UserId::new(state.next_id);
        state.next_id += 1;

        let now = Utc::now();
        let stored = User {
            id,
            login: user.login,
            phone: user.phone,
            password_hash: user.password_hash,
            roles: user.roles,
            api_token: user.api_token,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(id, stored.clone());

        Ok(stored)
    }

    async fn update(&self, user: &User) -> Result<User> {
        let mut state = self.state.write().await;

        if !state.users.contains_key(&user.id) {
            return Err(AccountsError::NotFound(format!(
                "User with ID {} not found",
                user.id
            )));
        }
        if state.pair_taken(&user.login, &user.phone, Some(user.id)) {
            return Err(AccountsError::DuplicateUser);
        }

        let stored = state
            .users
            .get_mut(&user.id)
            .ok_or_else(|| AccountsError::NotFound(format!("User with ID {} not found", user.id)))?;
        stored.login = user.login.clone();
        stored.phone = user.phone.clone();
        stored.password_hash = user.password_hash.clone();
        stored.roles = user.roles.clone();
        stored.updated_at = Utc::now();

        Ok(stored.clone())
    }

    async fn replace_api_token(
        &self,
        id: UserId,
        expected: Option<&str>,
        token: &str,
    ) -> Result<bool> {
        let mut state = self.state.write().await;

        if state.token_taken(token, Some(id)) {
            return Err(AccountsError::DatabaseError(
                "api token already assigned to another user".to_string(),
            ));
        }

        match state.users.get_mut(&id) {
            Some(user) if user.api_token.as_deref() == expected => {
                user.api_token = Some(token.to_string());
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: UserId) -> Result<bool> {
        Ok(self.state.write().await.users.remove(&id).is_some())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
