//! Refresh token rotation.
//!
//! On every login the subject's stored refresh token is reused while it still
//! verifies and has not expired; otherwise it is replaced by a freshly issued one.
//! Replacement goes through the store's compare-and-swap, so concurrent logins for
//! one subject converge on a single record.

use tracing::{debug, info};

use crate::db::{RefreshTokenRecord, RefreshTokenStore, ReplaceOutcome, StoreError};
use crate::jwt::{TokenCodec, TokenError, now_millis};

/// Replacement attempts before giving up on a contended subject.
const MAX_ROTATION_ATTEMPTS: usize = 3;

/// The refresh token a login hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotatedToken {
    /// The stored token was still valid and is returned unchanged
    Reused(String),
    /// A new token was issued and persisted
    Issued(String),
}

impl RotatedToken {
    pub fn token(&self) -> &str {
        match self {
            RotatedToken::Reused(t) | RotatedToken::Issued(t) => t,
        }
    }

    pub fn into_token(self) -> String {
        match self {
            RotatedToken::Reused(t) | RotatedToken::Issued(t) => t,
        }
    }
}

/// Errors raised while rotating.
#[derive(Debug)]
pub enum RotationError {
    Store(StoreError),
    Token(TokenError),
}

impl std::fmt::Display for RotationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RotationError::Store(e) => write!(f, "Refresh token store failed: {}", e),
            RotationError::Token(e) => write!(f, "Refresh token issuance failed: {}", e),
        }
    }
}

impl std::error::Error for RotationError {}

impl From<StoreError> for RotationError {
    fn from(e: StoreError) -> Self {
        RotationError::Store(e)
    }
}

impl From<TokenError> for RotationError {
    fn from(e: TokenError) -> Self {
        RotationError::Token(e)
    }
}

/// Whether a stored record may be handed out again at `now_ms`.
fn reusable(codec: &TokenCodec, record: &RefreshTokenRecord, now_ms: i64) -> bool {
    if let Err(e) = codec.verify(&record.token) {
        debug!(subject = %record.subject, error = %e, "Stored refresh token no longer verifies");
        return false;
    }
    record.expiration > now_ms
}

/// Resolve the refresh token for `subject`, reusing or replacing the stored one.
pub async fn rotate_refresh_token<S>(
    codec: &TokenCodec,
    store: &S,
    subject: &str,
    roles: &[String],
) -> Result<RotatedToken, RotationError>
where
    S: RefreshTokenStore,
{
    for _ in 0..MAX_ROTATION_ATTEMPTS {
        let existing = store.find_by_subject(subject).await?;
        let now = now_millis()?;

        if let Some(record) = &existing {
            if reusable(codec, record, now) {
                debug!(subject = %subject, "Reusing refresh token");
                return Ok(RotatedToken::Reused(record.token.clone()));
            }
        }

        let issued = codec.issue_refresh(subject, roles)?;
        let record = RefreshTokenRecord {
            token: issued.token,
            subject: subject.to_string(),
            expiration: issued.claims.expires_at_millis(),
        };

        let expected = existing.as_ref().map(|r| r.token.as_str());
        match store.replace_for_subject(expected, &record).await? {
            ReplaceOutcome::Replaced => {
                info!(
                    subject = %subject,
                    replaced = existing.is_some(),
                    "Issued new refresh token"
                );
                return Ok(RotatedToken::Issued(record.token));
            }
            ReplaceOutcome::Conflict => {
                debug!(subject = %subject, "Concurrent rotation detected, retrying");
            }
        }
    }

    Err(RotationError::Store(StoreError::Contended))
}

/// A refresh token is valid when it verifies and the store still holds an
/// unexpired record for exactly this token. Deleting the record revokes it.
pub async fn is_refresh_token_valid<S>(
    codec: &TokenCodec,
    store: &S,
    token: &str,
) -> Result<bool, StoreError>
where
    S: RefreshTokenStore,
{
    if codec.verify(token).is_err() {
        return Ok(false);
    }

    let Some(record) = store.find_by_token(token).await? else {
        return Ok(false);
    };

    match now_millis() {
        Ok(now) => Ok(record.expiration > now),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, MemoryTokenStore};
    use crate::jwt::TokenLifetimes;
    use std::sync::Arc;

    fn codec(refresh_ttl_ms: i64) -> TokenCodec {
        TokenCodec::with_lifetimes(
            b"test-secret-key-for-testing",
            TokenLifetimes {
                access_ttl_ms: 60_000,
                refresh_ttl_ms,
            },
        )
    }

    fn user_roles() -> Vec<String> {
        vec!["ROLE_USER".to_string()]
    }

    #[tokio::test]
    async fn test_first_rotation_issues_and_persists() {
        let codec = codec(60 * 60 * 1000);
        let store = MemoryTokenStore::new();

        let rotated = rotate_refresh_token(&codec, &store, "alice", &user_roles())
            .await
            .unwrap();

        assert!(matches!(rotated, RotatedToken::Issued(_)));
        let record = store.find_by_subject("alice").await.unwrap().unwrap();
        assert_eq!(record.token, rotated.token());
        assert!(
            is_refresh_token_valid(&codec, &store, rotated.token())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_rotation_reuses_valid_token() {
        let codec = codec(60 * 60 * 1000);
        let store = MemoryTokenStore::new();

        let first = rotate_refresh_token(&codec, &store, "alice", &user_roles())
            .await
            .unwrap();
        let second = rotate_refresh_token(&codec, &store, "alice", &user_roles())
            .await
            .unwrap();

        assert_eq!(second, RotatedToken::Reused(first.token().to_string()));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_rotation_replaces_expired_record() {
        let codec = codec(60 * 60 * 1000);
        let store = MemoryTokenStore::new();

        let stale = codec.issue("alice", &user_roles(), -5_000).unwrap();
        store
            .upsert(&RefreshTokenRecord {
                token: stale.token.clone(),
                subject: "alice".to_string(),
                expiration: stale.claims.expires_at_millis(),
            })
            .await
            .unwrap();

        let rotated = rotate_refresh_token(&codec, &store, "alice", &user_roles())
            .await
            .unwrap();

        assert!(matches!(rotated, RotatedToken::Issued(_)));
        assert_ne!(rotated.token(), stale.token);
        assert!(store.find_by_token(&stale.token).await.unwrap().is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_rotation_replaces_token_signed_with_other_key() {
        let codec = codec(60 * 60 * 1000);
        let other = TokenCodec::new(b"a-different-secret-key-entirely");
        let store = MemoryTokenStore::new();

        let foreign = other.issue("alice", &user_roles(), 60_000).unwrap();
        store
            .upsert(&RefreshTokenRecord {
                token: foreign.token.clone(),
                subject: "alice".to_string(),
                expiration: foreign.claims.expires_at_millis(),
            })
            .await
            .unwrap();

        let rotated = rotate_refresh_token(&codec, &store, "alice", &user_roles())
            .await
            .unwrap();

        assert!(matches!(rotated, RotatedToken::Issued(_)));
        assert!(store.find_by_token(&foreign.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deleted_record_revokes_token() {
        let codec = codec(60 * 60 * 1000);
        let store = MemoryTokenStore::new();

        let rotated = rotate_refresh_token(&codec, &store, "alice", &user_roles())
            .await
            .unwrap();
        store.delete_by_token(rotated.token()).await.unwrap();

        assert!(
            !is_refresh_token_valid(&codec, &store, rotated.token())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_unpersisted_token_is_not_valid() {
        let codec = codec(60 * 60 * 1000);
        let store = MemoryTokenStore::new();

        let issued = codec.issue_refresh("alice", &user_roles()).unwrap();
        assert!(
            !is_refresh_token_valid(&codec, &store, &issued.token)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_parallel_rotations_leave_one_record() {
        let codec = Arc::new(codec(60 * 60 * 1000));
        let store = MemoryTokenStore::new();

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let codec = codec.clone();
            let store = store.clone();
            tasks.spawn(async move {
                rotate_refresh_token(&codec, &store, "alice", &user_roles())
                    .await
                    .unwrap()
                    .into_token()
            });
        }

        let mut tokens = Vec::new();
        while let Some(result) = tasks.join_next().await {
            tokens.push(result.unwrap());
        }

        assert_eq!(store.len().await, 1);
        let stored = store.find_by_subject("alice").await.unwrap().unwrap();
        assert!(tokens.iter().all(|t| *t == stored.token));
    }

    #[tokio::test]
    async fn test_rotation_against_sqlite_store() {
        let codec = codec(60 * 60 * 1000);
        let db = Database::open(":memory:").await.unwrap();
        let store = db.tokens();

        let first = rotate_refresh_token(&codec, &store, "alice", &user_roles())
            .await
            .unwrap();
        let second = rotate_refresh_token(&codec, &store, "alice", &user_roles())
            .await
            .unwrap();

        assert_eq!(first.token(), second.token());
        assert!(matches!(second, RotatedToken::Reused(_)));
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
