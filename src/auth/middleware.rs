//! Bearer authentication middleware.
//!
//! Every request is forwarded. A valid, unexpired bearer token attaches an
//! `AuthenticationContext` to the request; anything else leaves it anonymous.
//! Failures are never turned into responses, so clients cannot tell a forged
//! token from an expired one. There is no automatic refresh here.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::header::authorization_token;
use super::types::{AnonymousReason, AuthDecision, AuthenticationContext};
use crate::jwt::{TokenCodec, TokenError};

/// Decide the authentication state of a request from its headers.
/// Only verifies the signature; performs no I/O.
pub fn authenticate_bearer(codec: &TokenCodec, headers: &HeaderMap) -> AuthDecision {
    let Some(token) = authorization_token(headers) else {
        return AuthDecision::Anonymous(AnonymousReason::MissingHeader);
    };

    match codec.verify_unexpired(token) {
        Ok(claims) => AuthDecision::Authenticated(AuthenticationContext::from(claims)),
        Err(TokenError::Expired) => {
            debug!("Bearer token expired");
            AuthDecision::Anonymous(AnonymousReason::Expired)
        }
        Err(e) => {
            debug!(error = %e, "Bearer token rejected");
            AuthDecision::Anonymous(AnonymousReason::Invalid)
        }
    }
}

/// Middleware attaching the request's `AuthenticationContext`, if any.
///
/// Install with `axum::middleware::from_fn_with_state(codec, bearer_auth)`.
pub async fn bearer_auth(
    State(codec): State<Arc<TokenCodec>>,
    mut request: Request,
    next: Next,
) -> Response {
    // Never trust a context that arrived from outside this layer.
    request.extensions_mut().remove::<AuthenticationContext>();

    if let Some(ctx) = authenticate_bearer(&codec, request.headers()).into_context() {
        debug!(username = %ctx.username, roles = ?ctx.roles, "Request authenticated");
        request.extensions_mut().insert(ctx);
    }

    next.run(request).await
}
