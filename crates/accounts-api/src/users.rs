//! User administration
//!
//! Every operation runs in the same order: validate input, load the target
//! (404), consult the policy (403), then persist (409 on duplicates).

use accounts_core::{
    validate_password, AccessDenied, AuthorizationPolicy, Login, MobilePhone, NewUser, Operation,
    Principal, User, UserId, UserPublic, UserRepository,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::audit::{audit_log, AuditEvent};
use crate::auth::password::PasswordHasher;
use crate::error::AppError;

/// Create user request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub login: String,
    pub phone: String,
    pub password: String,
}

/// Update user request; an absent or empty password keeps the current one
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub id: i64,
    pub login: String,
    pub phone: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Public user representation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub login: String,
    pub phone: String,
}

impl From<UserPublic> for UserResponse {
    fn from(user: UserPublic) -> Self {
        Self {
            id: user.id.get(),
            login: user.login.into(),
            phone: user.phone.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateUserResponse {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteResponse {
    pub message: String,
}

/// User CRUD service
pub struct UserService {
    store: Arc<dyn UserRepository>,
    hasher: Arc<PasswordHasher>,
    policy: AuthorizationPolicy,
}

impl UserService {
    pub fn new(
        store: Arc<dyn UserRepository>,
        hasher: Arc<PasswordHasher>,
        policy: AuthorizationPolicy,
    ) -> Self {
        Self {
            store,
            hasher,
            policy,
        }
    }

    /// Create a user with the default role set
    pub async fn create(
        &self,
        principal: &Principal,
        request: CreateUserRequest,
    ) -> Result<UserResponse, AppError> {
        let login = Login::parse(request.login)?;
        let phone = MobilePhone::parse(request.phone)?;
        validate_password(&request.password)?;

        self.authorize(principal, None, Operation::Create)?;

        let password_hash = self.hasher.hash_blocking(request.password).await?;
        let user = self
            .store
            .insert(NewUser::new(login, phone, password_hash))
            .await?;

        audit_log(&AuditEvent::UserCreated {
            user_id: user.id.get(),
            login: user.login.to_string(),
            created_by: principal.id.get(),
        });

        Ok(user.to_public().into())
    }

    /// Overwrite login and phone; re-hash only when a password is supplied
    pub async fn update(
        &self,
        principal: &Principal,
        request: UpdateUserRequest,
    ) -> Result<UpdateUserResponse, AppError> {
        if request.id <= 0 {
            return Err(AppError::BadRequest(format!(
                "`{}` is not a valid user id",
                request.id
            )));
        }
        let id = UserId::new(request.id);
        let login = Login::parse(request.login)?;
        let phone = MobilePhone::parse(request.phone)?;
        let password = request.password.filter(|p| !p.is_empty());
        if let Some(password) = &password {
            validate_password(password)?;
        }

        let mut user = self.load(id).await?;
        self.authorize(principal, Some(id), Operation::Update)?;

        user.login = login;
        user.phone = phone;
        let password_changed = password.is_some();
        if let Some(password) = password {
            user.password_hash = self.hasher.hash_blocking(password).await?;
        }

        let updated = self.store.update(&user).await?;

        audit_log(&AuditEvent::UserUpdated {
            user_id: updated.id.get(),
            updated_by: principal.id.get(),
            password_changed,
        });

        Ok(UpdateUserResponse {
            id: updated.id.get(),
        })
    }

    pub async fn get(&self, principal: &Principal, id: &str) -> Result<UserResponse, AppError> {
        let id = id.parse::<UserId>()?;

        let user = self.load(id).await?;
        self.authorize(principal, Some(id), Operation::Read)?;

        Ok(user.to_public().into())
    }

    pub async fn delete(&self, principal: &Principal, id: &str) -> Result<DeleteResponse, AppError> {
        let id = id.parse::<UserId>()?;

        self.load(id).await?;
        self.authorize(principal, Some(id), Operation::Delete)?;

        if !self.store.delete(id).await? {
            return Err(not_found(id));
        }

        audit_log(&AuditEvent::UserDeleted {
            user_id: id.get(),
            deleted_by: principal.id.get(),
        });

        Ok(DeleteResponse {
            message: "User deleted".to_string(),
        })
    }

    async fn load(&self, id: UserId) -> Result<User, AppError> {
        self.store.find_by_id(id).await?.ok_or_else(|| not_found(id))
    }

    fn authorize(
        &self,
        principal: &Principal,
        target: Option<UserId>,
        operation: Operation,
    ) -> Result<(), AppError> {
        self.policy
            .check(principal, target, operation)
            .map_err(|denied: AccessDenied| {
                audit_log(&AuditEvent::AccessDenied {
                    user_id: principal.id.get(),
                    target_id: target.map(UserId::get),
                    operation: operation.to_string(),
                    reason: denied.reason.clone(),
                });
                AppError::Forbidden(denied.reason)
            })
    }
}

fn not_found(id: UserId) -> AppError {
    AppError::NotFound(format!("User with ID {id} not found"))
}
