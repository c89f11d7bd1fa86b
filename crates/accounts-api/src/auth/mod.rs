//! Authentication module
//!
//! - Token issuing and verification (HS256 JWT)
//! - Password hashing with Argon2id
//! - Bearer middleware for request authentication
//! - Authentication service: login, token rotation, root bootstrap

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod service;

pub use jwt::{Claims, SignedToken, TokenClaims, TokenError, TokenService, VerifiedToken};
pub use middleware::{auth_middleware, AuthError, API_TOKEN_HEADER};
pub use password::{PasswordError, PasswordHasher};
pub use service::{AuthService, Authentication, LoginRequest, LoginResponse, ROOT_LOGIN};
