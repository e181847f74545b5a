//! Bearer header parsing utilities.

use axum::http::{HeaderMap, HeaderName, header};

/// Prefix of a bearer credential in a header value.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Header carrying the refresh token on login and refresh responses.
pub static REFRESH_TOKEN_HEADER: HeaderName = HeaderName::from_static("refresh-token");

/// Extract the token from a `Bearer <token>` header.
/// Returns `None` when the header is absent, not valid ASCII, or uses another scheme.
pub fn bearer_token<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    let value = headers.get(name)?.to_str().ok()?;
    value.strip_prefix(BEARER_PREFIX).map(str::trim)
}

/// Token from the `Authorization` header.
pub fn authorization_token(headers: &HeaderMap) -> Option<&str> {
    bearer_token(headers, &header::AUTHORIZATION)
}

/// Token from the `Refresh-Token` header.
pub fn refresh_token(headers: &HeaderMap) -> Option<&str> {
    bearer_token(headers, &REFRESH_TOKEN_HEADER)
}

/// Format a `Bearer <token>` header value.
pub fn bearer_value(token: &str) -> String {
    format!("{}{}", BEARER_PREFIX, token)
}
