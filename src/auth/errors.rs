//! Authentication error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Rejection for handlers that require an authenticated request.
///
/// Carries no detail. Missing, forged and expired tokens get the same response.
#[derive(Debug)]
pub struct AuthRejection;

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        StatusCode::UNAUTHORIZED.into_response()
    }
}
