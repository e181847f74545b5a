//! Login: credential check, access token issuance and refresh token rotation.
//!
//! Credential verification is a capability handed in by the caller. The login
//! itself is a plain function over that capability, the codec and the store.

use std::collections::HashMap;
use std::future::Future;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::db::{Database, RefreshTokenStore, verify_password_hash};
use crate::jwt::{TokenCodec, TokenError};
use crate::rotation::{RotatedToken, RotationError, rotate_refresh_token};

/// Username and secret submitted by a client.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An authenticated identity returned by a credential verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub roles: Vec<String>,
}

/// Backend failure inside a credential verifier.
#[derive(Debug)]
pub struct VerifierError(pub String);

impl std::fmt::Display for VerifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential verification failed: {}", self.0)
    }
}

impl std::error::Error for VerifierError {}

/// Checks a username/secret pair. `Ok(None)` means the credentials were rejected.
pub trait CredentialVerifier: Send + Sync {
    fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<Option<Principal>, VerifierError>> + Send;
}

impl CredentialVerifier for Database {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Principal>, VerifierError> {
        let user = self
            .users()
            .verify_password(username, password)
            .await
            .map_err(|e| VerifierError(e.to_string()))?;

        Ok(user.map(|u| Principal {
            username: u.username,
            roles: u.roles,
        }))
    }
}

/// Fixed set of users with bcrypt-hashed passwords.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    users: HashMap<String, (String, Vec<String>)>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user whose password is already a bcrypt hash.
    pub fn with_hashed_user(
        mut self,
        username: impl Into<String>,
        password_hash: impl Into<String>,
        roles: Vec<String>,
    ) -> Self {
        self.users
            .insert(username.into(), (password_hash.into(), roles));
        self
    }

    /// Hash `password` with `cost` and add the user.
    pub fn with_user(
        self,
        username: impl Into<String>,
        password: &str,
        roles: Vec<String>,
        cost: u32,
    ) -> Result<Self, bcrypt::BcryptError> {
        let hash = bcrypt::hash(password, cost)?;
        Ok(self.with_hashed_user(username, hash, roles))
    }
}

impl CredentialVerifier for StaticCredentials {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Principal>, VerifierError> {
        let Some((hash, roles)) = self.users.get(username) else {
            return Ok(None);
        };

        let matches = verify_password_hash(password, hash)
            .await
            .map_err(|e| VerifierError(e.to_string()))?;
        Ok(matches.then(|| Principal {
            username: username.to_string(),
            roles: roles.clone(),
        }))
    }
}

/// Tokens handed back by a successful login.
#[derive(Debug, Clone)]
pub struct LoginTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Whether the refresh token was newly issued rather than reused
    pub refresh_issued: bool,
}

/// Why a login did not produce tokens.
#[derive(Debug)]
pub enum LoginError {
    /// Unknown user or wrong secret
    CredentialRejected,
    /// The credential backend could not be reached
    VerifierUnavailable(String),
    /// The refresh token store failed during rotation
    StoreUnavailable(String),
    /// Token signing failed
    Token(TokenError),
}

impl std::fmt::Display for LoginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoginError::CredentialRejected => write!(f, "Credentials rejected"),
            LoginError::VerifierUnavailable(e) => write!(f, "Verifier unavailable: {}", e),
            LoginError::StoreUnavailable(e) => write!(f, "Store unavailable: {}", e),
            LoginError::Token(e) => write!(f, "Token error: {}", e),
        }
    }
}

impl std::error::Error for LoginError {}

impl From<RotationError> for LoginError {
    fn from(e: RotationError) -> Self {
        match e {
            RotationError::Store(e) => LoginError::StoreUnavailable(e.to_string()),
            RotationError::Token(e) => LoginError::Token(e),
        }
    }
}

/// Verify `credentials`, then issue an access token and resolve the refresh token.
///
/// Nothing is written to the store unless the credentials are accepted, and no
/// tokens are returned unless the refresh token is persisted.
pub async fn login<V, S>(
    verifier: &V,
    codec: &TokenCodec,
    store: &S,
    credentials: &Credentials,
) -> Result<LoginTokens, LoginError>
where
    V: CredentialVerifier,
    S: RefreshTokenStore,
{
    let principal = verifier
        .authenticate(&credentials.username, &credentials.password)
        .await
        .map_err(|e| {
            error!(error = %e, "Credential verifier failed");
            LoginError::VerifierUnavailable(e.to_string())
        })?
        .ok_or_else(|| {
            warn!(username = %credentials.username, "Login rejected");
            LoginError::CredentialRejected
        })?;

    let access = codec
        .issue_access(&principal.username, &principal.roles)
        .map_err(|e| {
            error!(username = %principal.username, error = %e, "Failed to generate access token");
            LoginError::Token(e)
        })?;

    let refresh = rotate_refresh_token(codec, store, &principal.username, &principal.roles)
        .await
        .inspect_err(|e| {
            error!(username = %principal.username, error = %e, "Refresh token rotation failed");
        })?;

    info!(username = %principal.username, roles = ?principal.roles, "Login succeeded");

    let refresh_issued = matches!(refresh, RotatedToken::Issued(_));
    Ok(LoginTokens {
        access_token: access.token,
        refresh_token: refresh.into_token(),
        refresh_issued,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryTokenStore, RefreshTokenRecord, ReplaceOutcome, StoreError};

    const TEST_COST: u32 = 4;

    fn verifier() -> StaticCredentials {
        StaticCredentials::new()
            .with_user("alice", "correct", vec!["ROLE_USER".to_string()], TEST_COST)
            .unwrap()
    }

    fn credentials(password: &str) -> Credentials {
        Credentials {
            username: "alice".to_string(),
            password: password.to_string(),
        }
    }

    /// A store whose backend is always down.
    struct DownStore;

    impl RefreshTokenStore for DownStore {
        async fn find_by_subject(
            &self,
            _subject: &str,
        ) -> Result<Option<RefreshTokenRecord>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn find_by_token(
            &self,
            _token: &str,
        ) -> Result<Option<RefreshTokenRecord>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn upsert(&self, _record: &RefreshTokenRecord) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn delete_by_token(&self, _token: &str) -> Result<bool, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn replace_for_subject(
            &self,
            _expected: Option<&str>,
            _record: &RefreshTokenRecord,
        ) -> Result<ReplaceOutcome, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn delete_expired(&self, _now_ms: i64) -> Result<u64, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    #[tokio::test]
    async fn test_login_success_issues_both_tokens() {
        let codec = TokenCodec::new(b"test-secret-key-for-testing");
        let store = MemoryTokenStore::new();

        let tokens = login(&verifier(), &codec, &store, &credentials("correct"))
            .await
            .unwrap();

        assert!(tokens.refresh_issued);
        let (subject, roles) = codec.decode_subject_and_roles(&tokens.access_token).unwrap();
        assert_eq!(subject, "alice");
        assert_eq!(roles, vec!["ROLE_USER".to_string()]);
        assert_eq!(
            store.find_by_subject("alice").await.unwrap().unwrap().token,
            tokens.refresh_token
        );
    }

    #[tokio::test]
    async fn test_login_rejected_leaves_store_untouched() {
        let codec = TokenCodec::new(b"test-secret-key-for-testing");
        let store = MemoryTokenStore::new();

        let result = login(&verifier(), &codec, &store, &credentials("wrong")).await;

        assert!(matches!(result, Err(LoginError::CredentialRejected)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_login_unknown_user_rejected() {
        let codec = TokenCodec::new(b"test-secret-key-for-testing");
        let store = MemoryTokenStore::new();
        let creds = Credentials {
            username: "mallory".to_string(),
            password: "correct".to_string(),
        };

        let result = login(&verifier(), &codec, &store, &creds).await;
        assert!(matches!(result, Err(LoginError::CredentialRejected)));
    }

    #[tokio::test]
    async fn test_login_fails_when_store_is_down() {
        let codec = TokenCodec::new(b"test-secret-key-for-testing");

        let result = login(&verifier(), &codec, &DownStore, &credentials("correct")).await;
        assert!(matches!(result, Err(LoginError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_repeated_login_reuses_refresh_token() {
        let codec = TokenCodec::new(b"test-secret-key-for-testing");
        let store = MemoryTokenStore::new();

        let first = login(&verifier(), &codec, &store, &credentials("correct"))
            .await
            .unwrap();
        let second = login(&verifier(), &codec, &store, &credentials("correct"))
            .await
            .unwrap();

        assert_eq!(first.refresh_token, second.refresh_token);
        assert!(!second.refresh_issued);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let rendered = format!("{:?}", credentials("hunter2"));
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_password_check_does_not_block_executor() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let verifier = StaticCredentials::new()
            .with_user("alice", "correct", vec![], bcrypt::DEFAULT_COST)
            .unwrap();
        let codec = TokenCodec::new(b"test-secret-key-for-testing");
        let store = MemoryTokenStore::new();

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = ticks.clone();
            async move {
                let mut interval = tokio::time::interval(std::time::Duration::from_millis(5));
                loop {
                    interval.tick().await;
                    ticks.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        login(&verifier, &codec, &store, &credentials("correct"))
            .await
            .unwrap();
        ticker.abort();

        // Default-cost bcrypt takes far longer than two 5 ms ticks
        assert!(ticks.load(Ordering::Relaxed) >= 2);
    }
}
