//! Axum extractors for the request's authentication context.
//!
//! Both read what `bearer_auth` left in the request extensions; neither looks at
//! the token again.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::AuthRejection;
use super::types::AuthenticationContext;

/// Optional authentication extractor - never fails.
/// Useful for endpoints that work both authenticated and anonymously.
pub struct OptionalAuth(pub Option<AuthenticationContext>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(
            parts.extensions.get::<AuthenticationContext>().cloned(),
        ))
    }
}

/// Extractor for endpoints that require an authenticated request.
/// Rejects anonymous requests with an empty 401.
pub struct Auth(pub AuthenticationContext);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticationContext>()
            .cloned()
            .map(Auth)
            .ok_or(AuthRejection)
    }
}
