//! Identity of the caller.
//!
//! - GET `/me` - Username and roles from the verified access token

use axum::{Json, Router, routing::get};

use crate::auth::{Auth, AuthenticationContext};

pub fn router() -> Router {
    Router::new().route("/me", get(me))
}

async fn me(Auth(ctx): Auth) -> Json<AuthenticationContext> {
    Json(ctx)
}
