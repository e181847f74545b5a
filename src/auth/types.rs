//! Authentication context types.

use serde::Serialize;

use crate::jwt::Claims;

/// Identity established for one request from a verified bearer token.
///
/// Lives in the request's extensions and is dropped with the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticationContext {
    pub username: String,
    /// Verified roles, in token order
    pub roles: Vec<String>,
}

impl From<Claims> for AuthenticationContext {
    fn from(claims: Claims) -> Self {
        Self {
            username: claims.sub,
            roles: claims.user_role,
        }
    }
}

/// Why a request was left anonymous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnonymousReason {
    /// No `Authorization` header, or not a bearer credential
    MissingHeader,
    /// Malformed, forged or ill-typed token
    Invalid,
    /// Correctly signed but expired
    Expired,
}

/// Outcome of the per-request bearer check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Anonymous(AnonymousReason),
    Authenticated(AuthenticationContext),
}

impl AuthDecision {
    pub fn into_context(self) -> Option<AuthenticationContext> {
        match self {
            AuthDecision::Authenticated(ctx) => Some(ctx),
            AuthDecision::Anonymous(_) => None,
        }
    }
}
