//! Refresh token persistence.
//!
//! Only refresh tokens are stored; access tokens are stateless. A subject owns at
//! most one record, which the `subject` primary key enforces.

use std::future::Future;

use sqlx::sqlite::SqlitePool;

/// A persisted refresh token.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub token: String,
    pub subject: String,
    /// Expiration as Unix milliseconds
    pub expiration: i64,
}

/// Outcome of a compare-and-swap replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced,
    /// The subject's current record was not the one the caller expected.
    Conflict,
}

/// Errors returned by refresh token stores.
#[derive(Debug)]
pub enum StoreError {
    Database(sqlx::Error),
    /// Gave up after repeatedly losing replacement races
    Contended,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Contended => write!(f, "Refresh token record is contended"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

/// Read/write contract for refresh token persistence.
pub trait RefreshTokenStore: Send + Sync {
    fn find_by_subject(
        &self,
        subject: &str,
    ) -> impl Future<Output = Result<Option<RefreshTokenRecord>, StoreError>> + Send;

    fn find_by_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<RefreshTokenRecord>, StoreError>> + Send;

    /// Insert the record, replacing whatever the subject held before.
    fn upsert(
        &self,
        record: &RefreshTokenRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete a record by token string (revoke). Returns whether a record existed.
    fn delete_by_token(&self, token: &str)
    -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Atomically swap the subject's record for `record`, but only if the
    /// subject's current token is `expected` (`None`: no record may exist).
    fn replace_for_subject(
        &self,
        expected: Option<&str>,
        record: &RefreshTokenRecord,
    ) -> impl Future<Output = Result<ReplaceOutcome, StoreError>> + Send;

    /// Delete every record whose expiration lies before `now_ms`.
    fn delete_expired(&self, now_ms: i64) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// SQLite-backed refresh token store.
#[derive(Clone)]
pub struct TokenStore {
    pool: SqlitePool,
}

impl TokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Count all stored records (diagnostics and tests).
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM refresh_tokens")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}

impl RefreshTokenStore for TokenStore {
    async fn find_by_subject(
        &self,
        subject: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT token, subject, expiration FROM refresh_tokens WHERE subject = ?",
        )
        .bind(subject)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT token, subject, expiration FROM refresh_tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (subject, token, expiration) VALUES (?, ?, ?)
             ON CONFLICT(subject) DO UPDATE SET token = excluded.token, expiration = excluded.expiration",
        )
        .bind(&record.subject)
        .bind(&record.token)
        .bind(record.expiration)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_by_token(&self, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_for_subject(
        &self,
        expected: Option<&str>,
        record: &RefreshTokenRecord,
    ) -> Result<ReplaceOutcome, StoreError> {
        // Single statement so the read of the current token and the write happen
        // under one SQLite write lock.
        let result = match expected {
            None => {
                sqlx::query(
                    "INSERT INTO refresh_tokens (subject, token, expiration) VALUES (?, ?, ?)
                     ON CONFLICT(subject) DO NOTHING",
                )
                .bind(&record.subject)
                .bind(&record.token)
                .bind(record.expiration)
                .execute(&self.pool)
                .await?
            }
            Some(current) => {
                sqlx::query(
                    "INSERT INTO refresh_tokens (subject, token, expiration) VALUES (?, ?, ?)
                     ON CONFLICT(subject) DO UPDATE SET token = excluded.token, expiration = excluded.expiration
                     WHERE refresh_tokens.token = ?",
                )
                .bind(&record.subject)
                .bind(&record.token)
                .bind(record.expiration)
                .bind(current)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() > 0 {
            Ok(ReplaceOutcome::Replaced)
        } else {
            Ok(ReplaceOutcome::Conflict)
        }
    }

    async fn delete_expired(&self, now_ms: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expiration < ?")
            .bind(now_ms)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
