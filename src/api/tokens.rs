//! Token management API endpoints.
//!
//! - POST `/refresh` - Exchange the `Refresh-Token` bearer for a new access token
//! - POST `/logout` - Revoke the `Refresh-Token` bearer

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::IntoResponse,
    routing::post,
};
use serde::Serialize;
use tracing::{error, info};

use super::AuthState;
use super::error::{ApiError, ResultExt};
use crate::auth::{bearer_value, refresh_token};
use crate::db::RefreshTokenStore;
use crate::login::CredentialVerifier;
use crate::rotation::is_refresh_token_valid;

pub fn router<V, S>(state: AuthState<V, S>) -> Router
where
    V: CredentialVerifier + Clone + 'static,
    S: RefreshTokenStore + Clone + 'static,
{
    Router::new()
        .route("/refresh", post(refresh::<V, S>))
        .route("/logout", post(logout::<V, S>))
        .with_state(state)
}

/// Issue a new access token for a refresh token that is still valid.
/// The refresh token itself is returned unchanged; rotation only happens on login.
async fn refresh<V, S>(
    State(state): State<AuthState<V, S>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError>
where
    V: CredentialVerifier + Clone + 'static,
    S: RefreshTokenStore + Clone + 'static,
{
    let token = refresh_token(&headers).ok_or_else(|| ApiError::unauthorized("No refresh token"))?;

    let valid = is_refresh_token_valid(&state.codec, &state.store, token)
        .await
        .token_store_err("Failed to check refresh token")?;
    if !valid {
        return Err(ApiError::unauthorized("Invalid or expired refresh token"));
    }

    let (subject, roles) = state
        .codec
        .decode_subject_and_roles(token)
        .map_err(|_| ApiError::unauthorized("Invalid or expired refresh token"))?;

    let access = state.codec.issue_access(&subject, &roles).map_err(|e| {
        error!("Failed to generate access token: {}", e);
        ApiError::internal("Failed to generate token")
    })?;

    info!(subject = %subject, "Access token refreshed");

    Ok((StatusCode::OK, [(AUTHORIZATION, bearer_value(&access.token))]))
}

#[derive(Serialize)]
struct RevokeResponse {
    revoked: bool,
}

/// Revoke the presented refresh token. Succeeds even without one.
async fn logout<V, S>(
    State(state): State<AuthState<V, S>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError>
where
    V: CredentialVerifier + Clone + 'static,
    S: RefreshTokenStore + Clone + 'static,
{
    let mut revoked = false;

    if let Some(token) = refresh_token(&headers) {
        if let Ok(claims) = state.codec.verify(token) {
            revoked = state
                .store
                .delete_by_token(token)
                .await
                .token_store_err("Failed to revoke refresh token")?;
            if revoked {
                info!(subject = %claims.sub, "Refresh token revoked");
            }
        }
    }

    Ok((StatusCode::OK, Json(RevokeResponse { revoked })))
}
