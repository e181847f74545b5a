//! Bearer token authentication.
//!
//! Short-lived access tokens are checked statelessly on every request by
//! `bearer_auth`; refresh tokens are only consulted by the explicit login and
//! refresh endpoints.

mod errors;
mod extractors;
mod header;
mod middleware;
mod types;

pub use errors::AuthRejection;
pub use extractors::{Auth, OptionalAuth};
pub use header::{
    BEARER_PREFIX, REFRESH_TOKEN_HEADER, authorization_token, bearer_token, bearer_value,
    refresh_token,
};
pub use middleware::{authenticate_bearer, bearer_auth};
pub use types::{AnonymousReason, AuthDecision, AuthenticationContext};
