mod error;
mod login;
mod me;
mod tokens;

use axum::{Router, middleware};
use std::sync::Arc;

use crate::auth::bearer_auth;
use crate::db::RefreshTokenStore;
use crate::jwt::TokenCodec;
use crate::login::CredentialVerifier;

pub use error::{ApiError, ResultExt, TOKEN_STORE_UNAVAILABLE};

/// State shared by the login and token endpoints.
#[derive(Clone)]
pub struct AuthState<V, S> {
    pub codec: Arc<TokenCodec>,
    pub verifier: V,
    pub store: S,
}

/// Create the API router.
///
/// Every route runs behind `bearer_auth`, so handlers can ask for the request's
/// `AuthenticationContext` through the `Auth` / `OptionalAuth` extractors.
pub fn create_api_router<V, S>(codec: Arc<TokenCodec>, verifier: V, store: S) -> Router
where
    V: CredentialVerifier + Clone + 'static,
    S: RefreshTokenStore + Clone + 'static,
{
    let state = AuthState {
        codec: codec.clone(),
        verifier,
        store,
    };

    Router::new()
        .merge(login::router(state.clone()))
        .nest("/token", tokens::router(state))
        .merge(me::router())
        .layer(middleware::from_fn_with_state(codec, bearer_auth))
}
