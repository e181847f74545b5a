//! JWT token generation and validation.
//!
//! Access and refresh tokens share one claim layout and are signed with the same
//! HS256 key. They only differ by the lifetime used when issuing them.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default access token lifetime: 10 minutes.
pub const DEFAULT_ACCESS_TTL_MS: i64 = 10 * 60 * 1000;

/// Default refresh token lifetime: 1 hour.
pub const DEFAULT_REFRESH_TTL_MS: i64 = 60 * 60 * 1000;

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Granted roles, in the order the credential verifier returned them
    #[serde(rename = "userRole")]
    pub user_role: Vec<String>,
    /// Issued at (Unix timestamp, seconds)
    pub iat: u64,
    /// Expiration time (Unix timestamp, seconds)
    pub exp: u64,
}

impl Claims {
    /// Expiration as Unix milliseconds.
    pub fn expires_at_millis(&self) -> i64 {
        i64::try_from(self.exp)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000)
    }

    /// True once the expiration instant lies strictly before `now_ms`.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at_millis() < now_ms
    }

    /// Check expiration against the current time.
    pub fn is_expired(&self) -> Result<bool, TokenError> {
        Ok(self.is_expired_at(now_millis()?))
    }
}

/// Token lifetimes in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access_ttl_ms: i64,
    pub refresh_ttl_ms: i64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_ttl_ms: DEFAULT_ACCESS_TTL_MS,
            refresh_ttl_ms: DEFAULT_REFRESH_TTL_MS,
        }
    }
}

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The compact JWT string
    pub token: String,
    pub claims: Claims,
}

/// Signs and verifies tokens with a process-wide secret.
///
/// Built once at startup and shared behind an `Arc`; nothing in here mutates
/// after construction.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetimes: TokenLifetimes,
}

impl TokenCodec {
    /// Create a codec with the default lifetimes.
    pub fn new(secret: &[u8]) -> Self {
        Self::with_lifetimes(secret, TokenLifetimes::default())
    }

    pub fn with_lifetimes(secret: &[u8], lifetimes: TokenLifetimes) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiration is a separate decision, see `is_expired`.
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            lifetimes,
        }
    }

    /// Sign a token for `subject` valid for `ttl_ms` milliseconds from now.
    /// A negative TTL yields a token that is already expired.
    pub fn issue(
        &self,
        subject: &str,
        roles: &[String],
        ttl_ms: i64,
    ) -> Result<IssuedToken, TokenError> {
        let now = now_millis()?;
        let expires = now.checked_add(ttl_ms).ok_or(TokenError::Time)?;

        let claims = Claims {
            sub: subject.to_string(),
            user_role: roles.to_vec(),
            iat: millis_to_secs(now)?,
            exp: millis_to_secs(expires)?,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(TokenError::Encoding)?;

        Ok(IssuedToken { token, claims })
    }

    /// Issue a short-lived access token.
    pub fn issue_access(&self, subject: &str, roles: &[String]) -> Result<IssuedToken, TokenError> {
        self.issue(subject, roles, self.lifetimes.access_ttl_ms)
    }

    /// Issue a long-lived refresh token. Persisting it is the caller's job.
    pub fn issue_refresh(
        &self,
        subject: &str,
        roles: &[String],
    ) -> Result<IssuedToken, TokenError> {
        self.issue(subject, roles, self.lifetimes.refresh_ttl_ms)
    }

    /// Check structure and signature and decode the claims.
    /// Expiration is NOT checked here.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let data =
            jsonwebtoken::decode::<serde_json::Value>(token, &self.decoding_key, &self.validation)
                .map_err(|e| match e.kind() {
                    ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                    _ => TokenError::Malformed(e.to_string()),
                })?;

        serde_json::from_value(data.claims).map_err(|e| TokenError::InvalidClaims(e.to_string()))
    }

    /// Whether a correctly signed token has passed its expiration.
    /// Fails if the token does not verify, so callers cannot mistake a forged
    /// token for a merely expired one.
    pub fn is_expired(&self, token: &str) -> Result<bool, TokenError> {
        self.verify(token)?.is_expired()
    }

    /// `verify` followed by the expiration check.
    pub fn verify_unexpired(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify(token)?;
        if claims.is_expired()? {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Subject and roles of a verified token.
    pub fn decode_subject_and_roles(&self, token: &str) -> Result<(String, Vec<String>), TokenError> {
        let claims = self.verify(token)?;
        Ok((claims.sub, claims.user_role))
    }
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> Result<i64, TokenError> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| TokenError::Time)?;
    i64::try_from(elapsed.as_millis()).map_err(|_| TokenError::Time)
}

fn millis_to_secs(ms: i64) -> Result<u64, TokenError> {
    u64::try_from(ms.div_euclid(1000)).map_err(|_| TokenError::Time)
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum TokenError {
    /// Not a structurally valid token (bad segments, base64, JSON, missing claims)
    Malformed(String),
    /// Signature does not match the configured key
    InvalidSignature,
    /// Signed correctly but a claim has the wrong type
    InvalidClaims(String),
    /// Past its expiration time
    Expired,
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// System time error
    Time,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Malformed(e) => write!(f, "Malformed token: {}", e),
            TokenError::InvalidSignature => write!(f, "Invalid token signature"),
            TokenError::InvalidClaims(e) => write!(f, "Invalid token claims: {}", e),
            TokenError::Expired => write!(f, "Token expired"),
            TokenError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            TokenError::Time => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for TokenError {}
