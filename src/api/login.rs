//! Login endpoint.
//!
//! - POST `/login` - Form-encoded `username` and `password`. Returns both tokens as
//!   `Authorization` and `Refresh-Token` bearer headers.

use axum::{
    Form, Router,
    extract::State,
    http::{StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::post,
};

use super::AuthState;
use super::error::{ApiError, TOKEN_STORE_UNAVAILABLE};
use crate::auth::{REFRESH_TOKEN_HEADER, bearer_value};
use crate::db::RefreshTokenStore;
use crate::login::{CredentialVerifier, Credentials, LoginError, login};

pub fn router<V, S>(state: AuthState<V, S>) -> Router
where
    V: CredentialVerifier + Clone + 'static,
    S: RefreshTokenStore + Clone + 'static,
{
    Router::new()
        .route("/login", post(login_handler::<V, S>))
        .with_state(state)
}

/// Rejected credentials get a bare 401 with no body and no token headers.
/// Store failures are a 503 and never carry a token.
async fn login_handler<V, S>(
    State(state): State<AuthState<V, S>>,
    Form(credentials): Form<Credentials>,
) -> Response
where
    V: CredentialVerifier + Clone + 'static,
    S: RefreshTokenStore + Clone + 'static,
{
    match login(&state.verifier, &state.codec, &state.store, &credentials).await {
        Ok(tokens) => (
            StatusCode::OK,
            [
                (AUTHORIZATION, bearer_value(&tokens.access_token)),
                (
                    REFRESH_TOKEN_HEADER.clone(),
                    bearer_value(&tokens.refresh_token),
                ),
            ],
        )
            .into_response(),
        Err(LoginError::CredentialRejected) => StatusCode::UNAUTHORIZED.into_response(),
        Err(LoginError::VerifierUnavailable(_)) => {
            ApiError::service_unavailable("Credential store unavailable").into_response()
        }
        Err(LoginError::StoreUnavailable(_)) => {
            ApiError::service_unavailable(TOKEN_STORE_UNAVAILABLE).into_response()
        }
        Err(LoginError::Token(_)) => ApiError::internal("Failed to generate token").into_response(),
    }
}
