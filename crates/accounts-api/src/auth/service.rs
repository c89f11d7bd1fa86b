//! Authentication service layer
//!
//! Password login with token reuse, bearer authentication with rotation of
//! expired tokens, and the root bootstrap path.

use accounts_core::{
    validate_password, AccountsError, Login, MobilePhone, NewUser, Principal, RoleSet, User,
    UserRepository,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::jwt::{SignedToken, TokenClaims, TokenService};
use super::middleware::AuthError;
use super::password::PasswordHasher;
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::error::AppError;

/// Login name given to the bootstrap root account
pub const ROOT_LOGIN: &str = "root";

/// User login request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

/// Login response carrying the bearer token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub login: String,
    pub token: String,
}

/// Outcome of authenticating a bearer token
#[derive(Debug, Clone)]
pub struct Authentication {
    pub principal: Principal,
    /// Replacement token when the presented one had expired
    pub rotated_token: Option<String>,
}

/// Authentication service
pub struct AuthService {
    store: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
    hasher: Arc<PasswordHasher>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn UserRepository>,
        tokens: Arc<TokenService>,
        hasher: Arc<PasswordHasher>,
    ) -> Self {
        Self {
            store,
            tokens,
            hasher,
        }
    }

    /// Login with login name and password
    ///
    /// A still-valid stored token is returned unchanged; otherwise a fresh
    /// session token is issued and stored.
    pub async fn login(
        &self,
        request: LoginRequest,
        client: &ClientInfo,
    ) -> Result<LoginResponse, AuthError> {
        let Some(user) = self.store.find_by_login(&request.login).await? else {
            self.log_failure(&request.login, "Unknown login", client);
            return Err(AuthError::InvalidCredentials);
        };

        let matches = self
            .hasher
            .verify_blocking(request.password, user.password_hash.clone())
            .await?;
        if !matches {
            self.log_failure(&request.login, "Invalid password", client);
            return Err(AuthError::InvalidCredentials);
        }

        let now = Utc::now();
        let reusable = user.api_token.as_deref().filter(|stored| {
            self.tokens.verify(stored).is_ok_and(|verified| {
                !verified.is_expired_at(now) && verified.subject().ok() == Some(user.id)
            })
        });

        let (token, token_reused) = match reusable {
            Some(stored) => (stored.to_string(), true),
            None => {
                let issued = self.tokens.issue_at(
                    now,
                    user.id,
                    TokenClaims::for_user(&user),
                    self.tokens.session_ttl(),
                )?;
                (self.store_token(&user, issued.token).await?, false)
            }
        };

        audit_log(&AuditEvent::LoginSuccess {
            user_id: user.id.get(),
            login: user.login.to_string(),
            token_reused,
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        });

        Ok(LoginResponse {
            login: user.login.to_string(),
            token,
        })
    }

    /// Resolve an `Authorization` header value to a principal
    ///
    /// The token must equal a stored token and carry a valid signature.
    /// An expired token is replaced and the request still succeeds.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Authentication, AuthError> {
        let header = header.ok_or(AuthError::MissingAuthHeader)?;
        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidAuthHeader)?;

        let user = self
            .store
            .find_by_api_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let verified = self
            .tokens
            .verify(token)
            .map_err(|_| AuthError::InvalidToken)?;
        if verified.subject().ok() != Some(user.id) {
            return Err(AuthError::InvalidToken);
        }

        let principal = user.principal();
        let now = Utc::now();
        if !verified.is_expired_at(now) {
            return Ok(Authentication {
                principal,
                rotated_token: None,
            });
        }

        let issued = self.tokens.issue_at(
            now,
            user.id,
            TokenClaims::for_user(&user),
            self.tokens.session_ttl(),
        )?;
        let rotated = self.store_token(&user, issued.token).await?;

        audit_log(&AuditEvent::TokenRotated {
            user_id: user.id.get(),
        });

        Ok(Authentication {
            principal,
            rotated_token: Some(rotated),
        })
    }

    /// Create the root account with a long-lived token
    pub async fn create_root(
        &self,
        phone: &str,
        password: &str,
    ) -> Result<(User, SignedToken), AppError> {
        let login = Login::parse(ROOT_LOGIN)?;
        let phone = MobilePhone::parse(phone)?;
        validate_password(password)?;

        if self
            .store
            .find_by_login_and_phone(&login, &phone)
            .await?
            .is_some()
        {
            return Err(AccountsError::DuplicateUser.into());
        }

        let password_hash = self.hasher.hash_blocking(password.to_string()).await?;
        let mut user = self
            .store
            .insert(NewUser::new(login, phone, password_hash).with_roles(RoleSet::root()))
            .await?;

        // The token names the new id, so it can only be minted after insert
        let signed = self.tokens.issue(
            user.id,
            TokenClaims::for_user(&user),
            self.tokens.bootstrap_ttl(),
        )?;
        if !self
            .store
            .replace_api_token(user.id, None, &signed.token)
            .await?
        {
            return Err(AppError::Internal(format!(
                "Token for root user {} was replaced concurrently",
                user.id
            )));
        }
        user.api_token = Some(signed.token.clone());

        audit_log(&AuditEvent::RootProvisioned {
            user_id: user.id.get(),
            phone: user.phone.to_string(),
        });

        Ok((user, signed))
    }

    /// Store `token` in place of the user's current token.
    ///
    /// Losing the compare-and-swap means a concurrent request already stored
    /// a replacement; that one is returned instead of writing a third.
    async fn store_token(&self, user: &User, token: String) -> Result<String, AuthError> {
        if self
            .store
            .replace_api_token(user.id, user.api_token.as_deref(), &token)
            .await?
        {
            return Ok(token);
        }

        tracing::debug!(user_id = %user.id, "Token replaced concurrently, relaying winner");
        self.store
            .find_by_id(user.id)
            .await?
            .and_then(|current| current.api_token)
            .ok_or(AuthError::InvalidToken)
    }

    fn log_failure(&self, login: &str, reason: &str, client: &ClientInfo) {
        audit_log(&AuditEvent::LoginFailure {
            login: login.to_string(),
            reason: reason.to_string(),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accounts_core::{AuthConfig, HashingConfig, InMemoryUserStore, UserId};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    struct Fixture {
        store: Arc<InMemoryUserStore>,
        tokens: Arc<TokenService>,
        service: AuthService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryUserStore::new());
        let tokens = Arc::new(TokenService::new(&AuthConfig::default()));
        let hasher = Arc::new(
            PasswordHasher::new(&HashingConfig {
                memory_cost: 1024,
                time_cost: 1,
                parallelism: 1,
            })
            .unwrap(),
        );
        let service = AuthService::new(store.clone(), tokens.clone(), hasher);
        Fixture {
            store,
            tokens,
            service,
        }
    }

    async fn seed_user(fx: &Fixture, login: &str, password: &str) -> User {
        let hasher = PasswordHasher::new(&HashingConfig {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        })
        .unwrap();
        fx.store
            .insert(NewUser::new(
                Login::parse(login).unwrap(),
                MobilePhone::parse("+380991112233").unwrap(),
                hasher.hash(password).unwrap(),
            ))
            .await
            .unwrap()
    }

    fn login_request(login: &str, password: &str) -> LoginRequest {
        LoginRequest {
            login: login.to_string(),
            password: password.to_string(),
        }
    }

    enum Contender {
        Authenticate(String),
        Login(LoginRequest),
    }

    /// Store whose first token swap lets a second request store its token first
    struct RacingStore {
        inner: Arc<InMemoryUserStore>,
        rival: AuthService,
        contender: Mutex<Option<Contender>>,
        winner: Mutex<Option<String>>,
    }

    impl RacingStore {
        fn arm(&self, contender: Contender) {
            *self.contender.lock().unwrap() = Some(contender);
        }

        fn winner(&self) -> String {
            self.winner.lock().unwrap().clone().expect("contender ran")
        }

        async fn run_contender(&self) {
            let contender = self.contender.lock().unwrap().take();
            let token = match contender {
                Some(Contender::Authenticate(header)) => self
                    .rival
                    .authenticate(Some(&header))
                    .await
                    .unwrap()
                    .rotated_token
                    .unwrap(),
                Some(Contender::Login(request)) => {
                    self.rival
                        .login(request, &ClientInfo::default())
                        .await
                        .unwrap()
                        .token
                }
                None => return,
            };
            *self.winner.lock().unwrap() = Some(token);
        }
    }

    #[async_trait]
    impl UserRepository for RacingStore {
        async fn find_by_id(&self, id: UserId) -> accounts_core::Result<Option<User>> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_login(&self, login: &str) -> accounts_core::Result<Option<User>> {
            self.inner.find_by_login(login).await
        }

        async fn find_by_login_and_phone(
            &self,
            login: &Login,
            phone: &MobilePhone,
        ) -> accounts_core::Result<Option<User>> {
            self.inner.find_by_login_and_phone(login, phone).await
        }

        async fn find_by_api_token(&self, token: &str) -> accounts_core::Result<Option<User>> {
            self.inner.find_by_api_token(token).await
        }

        async fn insert(&self, user: NewUser) -> accounts_core::Result<User> {
            self.inner.insert(user).await
        }

        async fn update(&self, user: &User) -> accounts_core::Result<User> {
            self.inner.update(user).await
        }

        async fn replace_api_token(
            &self,
            id: UserId,
            expected: Option<&str>,
            token: &str,
        ) -> accounts_core::Result<bool> {
            self.run_contender().await;
            self.inner.replace_api_token(id, expected, token).await
        }

        async fn delete(&self, id: UserId) -> accounts_core::Result<bool> {
            self.inner.delete(id).await
        }

        async fn ping(&self) -> accounts_core::Result<()> {
            self.inner.ping().await
        }
    }

    fn racing_fixture() -> (Fixture, Arc<RacingStore>) {
        let fx = fixture();
        let hasher = Arc::new(
            PasswordHasher::new(&HashingConfig {
                memory_cost: 1024,
                time_cost: 1,
                parallelism: 1,
            })
            .unwrap(),
        );
        let racing = Arc::new(RacingStore {
            inner: fx.store.clone(),
            rival: AuthService::new(fx.store.clone(), fx.tokens.clone(), hasher.clone()),
            contender: Mutex::new(None),
            winner: Mutex::new(None),
        });
        let service = AuthService::new(racing.clone(), fx.tokens.clone(), hasher);
        (
            Fixture {
                store: fx.store,
                tokens: fx.tokens,
                service,
            },
            racing,
        )
    }

    #[tokio::test]
    async fn test_login_issues_session_token() {
        let fx = fixture();
        let user = seed_user(&fx, "bob1", "secretpw").await;

        let response = fx
            .service
            .login(login_request("bob1", "secretpw"), &ClientInfo::default())
            .await
            .unwrap();

        assert_eq!(response.login, "bob1");
        let verified = fx.tokens.verify(&response.token).unwrap();
        assert_eq!(verified.subject().unwrap(), user.id);
        assert_eq!(verified.claims.exp - verified.claims.iat, 24 * 3600);

        let stored = fx.store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.api_token.as_deref(), Some(response.token.as_str()));
    }

    #[tokio::test]
    async fn test_login_reuses_valid_token() {
        let fx = fixture();
        seed_user(&fx, "bob1", "secretpw").await;

        let first = fx
            .service
            .login(login_request("bob1", "secretpw"), &ClientInfo::default())
            .await
            .unwrap();
        let second = fx
            .service
            .login(login_request("bob1", "secretpw"), &ClientInfo::default())
            .await
            .unwrap();

        assert_eq!(first.token, second.token);
    }

    #[tokio::test]
    async fn test_login_replaces_expired_token() {
        let fx = fixture();
        let user = seed_user(&fx, "bob1", "secretpw").await;
        let stale = fx
            .tokens
            .issue_at(
                Utc::now() - Duration::days(2),
                user.id,
                TokenClaims::for_user(&user),
                fx.tokens.session_ttl(),
            )
            .unwrap();
        fx.store
            .replace_api_token(user.id, None, &stale.token)
            .await
            .unwrap();

        let response = fx
            .service
            .login(login_request("bob1", "secretpw"), &ClientInfo::default())
            .await
            .unwrap();

        assert_ne!(response.token, stale.token);
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let fx = fixture();
        seed_user(&fx, "bob1", "secretpw").await;

        let wrong_password = fx
            .service
            .login(login_request("bob1", "wrongpass"), &ClientInfo::default())
            .await;
        let unknown = fx
            .service
            .login(login_request("nobody", "secretpw"), &ClientInfo::default())
            .await;

        assert!(matches!(wrong_password, Err(AuthError::InvalidCredentials)));
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_authenticate_valid_token() {
        let fx = fixture();
        let user = seed_user(&fx, "bob1", "secretpw").await;
        let token = fx
            .service
            .login(login_request("bob1", "secretpw"), &ClientInfo::default())
            .await
            .unwrap()
            .token;

        let auth = fx
            .service
            .authenticate(Some(&format!("Bearer {token}")))
            .await
            .unwrap();

        assert_eq!(auth.principal.id, user.id);
        assert!(!auth.principal.is_root());
        assert!(auth.rotated_token.is_none());
    }

    #[tokio::test]
    async fn test_authenticate_rejects_bad_headers() {
        let fx = fixture();

        assert!(matches!(
            fx.service.authenticate(None).await,
            Err(AuthError::MissingAuthHeader)
        ));
        assert!(matches!(
            fx.service.authenticate(Some("Token abc")).await,
            Err(AuthError::InvalidAuthHeader)
        ));
        assert!(matches!(
            fx.service.authenticate(Some("Bearer ")).await,
            Err(AuthError::InvalidAuthHeader)
        ));
        assert!(matches!(
            fx.service.authenticate(Some("Bearer not-stored")).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_signed_but_unstored_token() {
        let fx = fixture();
        let user = seed_user(&fx, "bob1", "secretpw").await;
        let unstored = fx
            .tokens
            .issue(user.id, TokenClaims::for_user(&user), fx.tokens.session_ttl())
            .unwrap();

        let result = fx
            .service
            .authenticate(Some(&format!("Bearer {}", unstored.token)))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_authenticate_rotates_expired_token() {
        let fx = fixture();
        let user = seed_user(&fx, "bob1", "secretpw").await;
        let expired = fx
            .tokens
            .issue_at(
                Utc::now() - Duration::hours(25),
                user.id,
                TokenClaims::for_user(&user),
                fx.tokens.session_ttl(),
            )
            .unwrap();
        fx.store
            .replace_api_token(user.id, None, &expired.token)
            .await
            .unwrap();

        let auth = fx
            .service
            .authenticate(Some(&format!("Bearer {}", expired.token)))
            .await
            .unwrap();

        assert_eq!(auth.principal.id, user.id);
        let rotated = auth.rotated_token.expect("token should rotate");
        assert_ne!(rotated, expired.token);
        assert_eq!(
            fx.tokens.verify(&rotated).unwrap().subject().unwrap(),
            user.id
        );

        // The expired token is no longer accepted
        let again = fx
            .service
            .authenticate(Some(&format!("Bearer {}", expired.token)))
            .await;
        assert!(matches!(again, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_create_root() {
        let fx = fixture();

        let (root, signed) = fx
            .service
            .create_root("+380501234567", "rootpass")
            .await
            .unwrap();

        assert_eq!(root.login.as_str(), ROOT_LOGIN);
        assert!(root.is_root());

        let verified = fx.tokens.verify(&signed.token).unwrap();
        assert_eq!(verified.subject().unwrap(), root.id);
        assert_eq!(verified.claims.exp - verified.claims.iat, 365 * 24 * 3600);

        let auth = fx
            .service
            .authenticate(Some(&format!("Bearer {}", signed.token)))
            .await
            .unwrap();
        assert!(auth.principal.is_root());

        let again = fx.service.create_root("+380501234567", "rootpass").await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_create_root_validates_input() {
        let fx = fixture();

        let bad_phone = fx.service.create_root("0501234567", "rootpass").await;
        let short_password = fx.service.create_root("+380501234567", "short").await;

        assert!(matches!(bad_phone, Err(AppError::BadRequest(_))));
        assert!(matches!(short_password, Err(AppError::BadRequest(_))));
        assert!(fx.store.find_by_id(UserId::new(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_rotation_relays_stored_token() {
        let (fx, racing) = racing_fixture();
        let user = seed_user(&fx, "bob1", "secretpw").await;
        let expired = fx
            .tokens
            .issue_at(
                Utc::now() - Duration::hours(25),
                user.id,
                TokenClaims::for_user(&user),
                fx.tokens.session_ttl(),
            )
            .unwrap();
        fx.store
            .replace_api_token(user.id, None, &expired.token)
            .await
            .unwrap();
        let header = format!("Bearer {}", expired.token);
        racing.arm(Contender::Authenticate(header.clone()));

        let auth = fx.service.authenticate(Some(&header)).await.unwrap();

        let winner = racing.winner();
        assert_ne!(winner, expired.token);
        assert_eq!(auth.principal.id, user.id);
        assert_eq!(auth.rotated_token.as_deref(), Some(winner.as_str()));
        let stored = fx.store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.api_token.as_deref(), Some(winner.as_str()));

        // The relayed token is accepted without another rotation
        let next = fx
            .service
            .authenticate(Some(&format!("Bearer {winner}")))
            .await
            .unwrap();
        assert!(next.rotated_token.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_login_relays_stored_token() {
        let (fx, racing) = racing_fixture();
        let user = seed_user(&fx, "bob1", "secretpw").await;
        racing.arm(Contender::Login(login_request("bob1", "secretpw")));

        let response = fx
            .service
            .login(login_request("bob1", "secretpw"), &ClientInfo::default())
            .await
            .unwrap();

        let winner = racing.winner();
        assert_eq!(response.token, winner);
        let stored = fx.store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.api_token.as_deref(), Some(winner.as_str()));
        assert_eq!(
            fx.tokens.verify(&response.token).unwrap().subject().unwrap(),
            user.id
        );
    }
}
