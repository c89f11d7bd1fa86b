//! User identity model
//!
//! Value objects validate on construction, so a `Login` or `MobilePhone`
//! held anywhere in the program is always well-formed. Deserialization goes
//! through the same checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::{AccountsError, Result};

/// Minimum login length
pub const LOGIN_MIN_LEN: usize = 3;
/// Maximum login length
pub const LOGIN_MAX_LEN: usize = 8;
/// Exact length of a stored mobile phone number
pub const PHONE_LEN: usize = 13;
/// Country prefix every mobile phone must carry
pub const PHONE_PREFIX: &str = "+380";
/// Minimum password length
pub const PASSWORD_MIN_LEN: usize = 8;
/// Maximum password length accepted for hashing
pub const PASSWORD_MAX_LEN: usize = 128;

// ============================================================================
// Identifiers and value objects
// ============================================================================

/// Database-assigned user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = AccountsError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .map(Self)
            .ok_or_else(|| AccountsError::ValidationError(format!("`{s}` is not a valid user id")))
    }
}

/// Account login: 3-8 ASCII letters and digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Login(String);

impl Login {
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();

        if value.is_empty() {
            return Err(AccountsError::ValidationError(
                "Login cannot be empty".to_string(),
            ));
        }

        let len = value.chars().count();
        if len < LOGIN_MIN_LEN {
            return Err(AccountsError::ValidationError(format!(
                "Login must be at least {LOGIN_MIN_LEN} characters long"
            )));
        }
        if len > LOGIN_MAX_LEN {
            return Err(AccountsError::ValidationError(format!(
                "Login cannot be longer than {LOGIN_MAX_LEN} characters"
            )));
        }

        if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AccountsError::ValidationError(
                "Login must contain only English letters and numbers".to_string(),
            ));
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Login {
    type Error = AccountsError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Login> for String {
    fn from(login: Login) -> Self {
        login.0
    }
}

impl fmt::Display for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ukrainian mobile number in the form `+380XXXXXXXXX`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MobilePhone(String);

impl MobilePhone {
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();

        if value.is_empty() {
            return Err(AccountsError::ValidationError(
                "Phone number is empty".to_string(),
            ));
        }

        if value.chars().count() != PHONE_LEN {
            return Err(AccountsError::ValidationError(format!(
                "`{value}` is not a valid phone number value"
            )));
        }

        let valid = value
            .strip_prefix(PHONE_PREFIX)
            .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()));
        if !valid {
            return Err(AccountsError::ValidationError(format!(
                "`{value}` does not match the format +380XXXXXXXXX"
            )));
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MobilePhone {
    type Error = AccountsError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<MobilePhone> for String {
    fn from(phone: MobilePhone) -> Self {
        phone.0
    }
}

impl fmt::Display for MobilePhone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check a plaintext password against the length rules
pub fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(AccountsError::ValidationError(
            "Password cannot be empty".to_string(),
        ));
    }

    let len = password.chars().count();
    if len < PASSWORD_MIN_LEN {
        return Err(AccountsError::ValidationError(format!(
            "Password must be at least {PASSWORD_MIN_LEN} characters long"
        )));
    }
    if len > PASSWORD_MAX_LEN {
        return Err(AccountsError::ValidationError(format!(
            "Password cannot be longer than {PASSWORD_MAX_LEN} characters"
        )));
    }

    Ok(())
}

// ============================================================================
// Roles
// ============================================================================

/// Role tag attached to a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ROLE_USER")]
    User,
    #[serde(rename = "ROLE_ROOT")]
    Root,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "ROLE_USER",
            Role::Root => "ROLE_ROOT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ROLE_USER" => Some(Role::User),
            "ROLE_ROOT" => Some(Role::Root),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of roles; `ROLE_USER` is always a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Role>", into = "Vec<Role>")]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    /// The default role set: `{ROLE_USER}`
    pub fn user() -> Self {
        Self(BTreeSet::from([Role::User]))
    }

    /// `{ROLE_ROOT, ROLE_USER}`
    pub fn root() -> Self {
        Self(BTreeSet::from([Role::User, Role::Root]))
    }

    /// Build from stored role tags. Unknown tags are dropped.
    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let roles = tags.into_iter().filter_map(|tag| {
            let tag = tag.as_ref();
            let role = Role::parse(tag);
            if role.is_none() {
                tracing::warn!(role = %tag, "Ignoring unknown role tag");
            }
            role
        });
        Self::from_iter(roles)
    }

    pub fn is_root(&self) -> bool {
        self.0.contains(&Role::Root)
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    pub fn to_tags(&self) -> Vec<String> {
        self.iter().map(|r| r.as_str().to_string()).collect()
    }
}

impl Default for RoleSet {
    fn default() -> Self {
        Self::user()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        let mut roles: BTreeSet<Role> = iter.into_iter().collect();
        roles.insert(Role::User);
        Self(roles)
    }
}

impl From<Vec<Role>> for RoleSet {
    fn from(roles: Vec<Role>) -> Self {
        roles.into_iter().collect()
    }
}

impl From<RoleSet> for Vec<Role> {
    fn from(set: RoleSet) -> Self {
        set.0.into_iter().collect()
    }
}

// ============================================================================
// User records
// ============================================================================

/// Stored user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub login: Login,
    pub phone: MobilePhone,

    /// Argon2id PHC string, never rendered to clients
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub roles: RoleSet,

    /// Most recently issued bearer token
    #[serde(skip_serializing)]
    pub api_token: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_root(&self) -> bool {
        self.roles.is_root()
    }

    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id,
            roles: self.roles.clone(),
        }
    }

    pub fn to_public(&self) -> UserPublic {
        UserPublic {
            id: self.id,
            login: self.login.clone(),
            phone: self.phone.clone(),
        }
    }
}

/// Insert payload for a user that has no id yet
#[derive(Debug, Clone)]
pub struct NewUser {
    pub login: Login,
    pub phone: MobilePhone,
    pub password_hash: String,
    pub roles: RoleSet,
    pub api_token: Option<String>,
}

impl NewUser {
    pub fn new(login: Login, phone: MobilePhone, password_hash: String) -> Self {
        Self {
            login,
            phone,
            password_hash,
            roles: RoleSet::user(),
            api_token: None,
        }
    }

    pub fn with_roles(mut self, roles: RoleSet) -> Self {
        self.roles = roles;
        self
    }
}

/// Public user representation (safe for API responses)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: UserId,
    pub login: Login,
    pub phone: MobilePhone,
}

/// The authenticated actor of a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: UserId,
    pub roles: RoleSet,
}

impl Principal {
    pub fn new(id: UserId, roles: RoleSet) -> Self {
        Self { id, roles }
    }

    pub fn is_root(&self) -> bool {
        self.roles.is_root()
    }
}
