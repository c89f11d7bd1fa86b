//! Access control for user records
//!
//! Decides whether an authenticated principal may perform an operation on a
//! target user. The policy is a pure function of its inputs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::user::{Principal, UserId};

/// Operation requested on a user record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Policy violation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Access denied: {reason}")]
pub struct AccessDenied {
    pub reason: String,
}

impl AccessDenied {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Role-based policy for user administration
///
/// - `ROLE_ROOT` may do anything except delete its own account
/// - everyone else may only read and update their own record
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationPolicy;

impl AuthorizationPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Check whether `principal` may perform `operation` on `target`.
    ///
    /// `target` is `None` only for `Create`, where no record exists yet.
    pub fn check(
        &self,
        principal: &Principal,
        target: Option<UserId>,
        operation: Operation,
    ) -> Result<(), AccessDenied> {
        let is_self = target == Some(principal.id);

        // Applies to root as well
        if operation == Operation::Delete && is_self {
            return Err(AccessDenied::new("You cannot delete yourself"));
        }

        if principal.is_root() {
            return Ok(());
        }

        match operation {
            Operation::Read | Operation::Update if is_self => Ok(()),
            Operation::Read | Operation::Update => Err(AccessDenied::new(
                "Users may only access their own account",
            )),
            Operation::Create | Operation::Delete => Err(AccessDenied::new(format!(
                "{operation} requires ROLE_ROOT"
            ))),
        }
    }
}
