//! JWT token issuing and verification
//!
//! Tokens are HMAC-SHA256 signed. Verification checks signature, issuer and
//! claim shape only; whether an expired token is rejected or rotated is
//! decided by the caller.

use accounts_core::{AuthConfig, User, UserId};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// JWT Claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - user ID
    pub sub: String,
    /// JWT ID - unique per issued token
    pub jti: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: i64,
    /// Expiration timestamp (Unix epoch)
    pub exp: i64,
    pub login: String,
    pub phone: String,
    pub roles: Vec<String>,
}

/// Custom claims embedded verbatim into a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub login: String,
    pub phone: String,
    pub roles: Vec<String>,
}

impl TokenClaims {
    pub fn for_user(user: &User) -> Self {
        Self {
            login: user.login.to_string(),
            phone: user.phone.to_string(),
            roles: user.roles.to_tags(),
        }
    }
}

/// Serialized token plus its expiry
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Token whose signature and shape have been checked
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub claims: Claims,
}

impl VerifiedToken {
    /// User id carried in `sub`
    pub fn subject(&self) -> Result<UserId, TokenError> {
        self.claims
            .sub
            .parse::<UserId>()
            .map_err(|_| TokenError::Malformed)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.claims.exp, 0).single()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.claims.exp
    }
}

/// Token errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Failed to encode JWT: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),

    #[error("Token lifetime out of range")]
    InvalidLifetime,
}

/// Issues and verifies bearer tokens with a key fixed at construction
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    session_ttl: Duration,
    bootstrap_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
            session_ttl: hours(config.token_ttl_hours),
            bootstrap_ttl: hours(config.bootstrap_token_ttl_days.saturating_mul(24)),
        }
    }

    /// Lifetime of login and rotation tokens
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Lifetime of the root bootstrap token
    pub fn bootstrap_ttl(&self) -> Duration {
        self.bootstrap_ttl
    }

    /// Issue a token valid from now for `ttl`
    pub fn issue(
        &self,
        subject: UserId,
        claims: TokenClaims,
        ttl: Duration,
    ) -> Result<SignedToken, TokenError> {
        self.issue_at(Utc::now(), subject, claims, ttl)
    }

    /// Issue a token as if the current time were `now`
    pub fn issue_at(
        &self,
        now: DateTime<Utc>,
        subject: UserId,
        claims: TokenClaims,
        ttl: Duration,
    ) -> Result<SignedToken, TokenError> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(TokenError::InvalidLifetime)?;

        let claims = Claims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            login: claims.login,
            phone: claims.phone,
            roles: claims.roles,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(SignedToken { token, expires_at })
    }

    /// Check signature, issuer and shape. Expiry is not enforced here.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| TokenError::Malformed)?;

        Ok(VerifiedToken {
            claims: data.claims,
        })
    }
}

fn hours(hours: u64) -> Duration {
    i64::try_from(hours)
        .ok()
        .and_then(Duration::try_hours)
        .unwrap_or(Duration::MAX)
}
