//! PostgreSQL user store
//!
//! Provides user persistence using SQLx and PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;

use super::UserRepository;
use crate::user::{Login, MobilePhone, NewUser, RoleSet, User, UserId};
use crate::{AccountsError, Result};

const USER_COLUMNS: &str =
    "id, login, phone, password_hash, roles, api_token, created_at, updated_at";

/// PostgreSQL user store
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new store connection
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| {
                AccountsError::DatabaseError(format!("PostgreSQL connection failed: {e}"))
            })?;

        Ok(Self { pool })
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AccountsError::DatabaseError(format!("Migration failed: {e}")))?;

        tracing::info!("Database migrations applied");
        Ok(())
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {clause} ORDER BY id LIMIT 1");

        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AccountsError::DatabaseError(format!("Failed to fetch user: {e}")))?;

        row.map(User::try_from).transpose()
    }
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    login: String,
    phone: String,
    password_hash: String,
    roles: Vec<String>,
    api_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AccountsError;

    fn try_from(row: UserRow) -> Result<Self> {
        // A malformed stored value is a storage fault, not a client error
        let login = Login::parse(row.login)
            .map_err(|e| AccountsError::DatabaseError(format!("Corrupt user {}: {e}", row.id)))?;
        let phone = MobilePhone::parse(row.phone)
            .map_err(|e| AccountsError::DatabaseError(format!("Corrupt user {}: {e}", row.id)))?;

        Ok(User {
            id: UserId::new(row.id),
            login,
            phone,
            password_hash: row.password_hash,
            roles: RoleSet::from_tags(&row.roles),
            api_token: row.api_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl UserRepository for PgUserStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AccountsError::DatabaseError(format!("Failed to get user: {e}")))?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>> {
        self.fetch_one_where("login = $1", login).await
    }

    async fn find_by_login_and_phone(
        &self,
        login: &Login,
        phone: &MobilePhone,
    ) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE login = $1 AND phone = $2");

        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(login.as_str())
            .bind(phone.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AccountsError::DatabaseError(format!("Failed to fetch user: {e}")))?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_api_token(&self, token: &str) -> Result<Option<User>> {
        self.fetch_one_where("api_token = $1", token).await
    }

    async fn insert(&self, user: NewUser) -> Result<User> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AccountsError::DatabaseError(format!("Failed to begin transaction: {e}")))?;

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM users WHERE login = $1 AND phone = $2")
                .bind(user.login.as_str())
                .bind(user.phone.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| AccountsError::DatabaseError(format!("Failed to check user: {e}")))?;

        if existing.is_some() {
            return Err(AccountsError::DuplicateUser);
        }

        let query = format!(
            r#"
            INSERT INTO users (login, phone, password_hash, roles, api_token, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING {USER_COLUMNS}
            "#
        );

        let row: UserRow = sqlx::query_as(&query)
            .bind(user.login.as_str())
            .bind(user.phone.as_str())
            .bind(&user.password_hash)
            .bind(user.roles.to_tags())
            .bind(&user.api_token)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_write_error("create user", e))?;

        tx.commit()
            .await
            .map_err(|e| map_write_error("create user", e))?;

        User::try_from(row)
    }

    async fn update(&self, user: &User) -> Result<User> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AccountsError::DatabaseError(format!("Failed to begin transaction: {e}")))?;

        let clash: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM users WHERE login = $1 AND phone = $2 AND id <> $3")
                .bind(user.login.as_str())
                .bind(user.phone.as_str())
                .bind(user.id.get())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| AccountsError::DatabaseError(format!("Failed to check user: {e}")))?;

        if clash.is_some() {
            return Err(AccountsError::DuplicateUser);
        }

        let query = format!(
            r#"
            UPDATE users SET
                login = $2,
                phone = $3,
                password_hash = $4,
                roles = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );

        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(user.id.get())
            .bind(user.login.as_str())
            .bind(user.phone.as_str())
            .bind(&user.password_hash)
            .bind(user.roles.to_tags())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_write_error("update user", e))?;

        let row = row.ok_or_else(|| {
            AccountsError::NotFound(format!("User with ID {} not found", user.id))
        })?;

        tx.commit()
            .await
            .map_err(|e| map_write_error("update user", e))?;

        User::try_from(row)
    }

    async fn replace_api_token(
        &self,
        id: UserId,
        expected: Option<&str>,
        token: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users SET api_token = $3, updated_at = NOW()
            WHERE id = $1 AND api_token IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(id.get())
        .bind(expected)
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(|e| AccountsError::DatabaseError(format!("Failed to store api token: {e}")))?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| AccountsError::DatabaseError(format!("Failed to delete user: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AccountsError::DatabaseError(format!("Ping failed: {e}")))?;

        Ok(())
    }
}

/// Translate a write failure, mapping unique violations to `DuplicateUser`
fn map_write_error(operation: &str, err: sqlx::Error) -> AccountsError {
    if is_unique_violation(&err) {
        AccountsError::DuplicateUser
    } else {
        AccountsError::DatabaseError(format!("Failed to {operation}: {err}"))
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
