//! In-process refresh token store.
//!
//! Useful for embedding and tests. Every operation takes the map lock once, so
//! `replace_for_subject` is atomic with respect to other callers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::token::{RefreshTokenRecord, RefreshTokenStore, ReplaceOutcome, StoreError};

/// Refresh token store backed by a map keyed by subject.
#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    records: Arc<Mutex<HashMap<String, RefreshTokenRecord>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

impl RefreshTokenStore for MemoryTokenStore {
    async fn find_by_subject(
        &self,
        subject: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self.records.lock().await.get(subject).cloned())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(records.values().find(|r| r.token == token).cloned())
    }

    async fn upsert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .await
            .insert(record.subject.clone(), record.clone());
        Ok(())
    }

    async fn delete_by_token(&self, token: &str) -> Result<bool, StoreError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| r.token != token);
        Ok(records.len() < before)
    }

    async fn replace_for_subject(
        &self,
        expected: Option<&str>,
        record: &RefreshTokenRecord,
    ) -> Result<ReplaceOutcome, StoreError> {
        let mut records = self.records.lock().await;
        let current = records.get(&record.subject).map(|r| r.token.as_str());

        match (expected, current) {
            (None, Some(_)) => return Ok(ReplaceOutcome::Conflict),
            (Some(want), Some(have)) if want != have => return Ok(ReplaceOutcome::Conflict),
            _ => {}
        }

        records.insert(record.subject.clone(), record.clone());
        Ok(ReplaceOutcome::Replaced)
    }

    async fn delete_expired(&self, now_ms: i64) -> Result<u64, StoreError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| r.expiration >= now_ms);
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(subject: &str, token: &str, expiration: i64) -> RefreshTokenRecord {
        RefreshTokenRecord {
            token: token.to_string(),
            subject: subject.to_string(),
            expiration,
        }
    }

    #[tokio::test]
    async fn test_replace_semantics_match_sqlite_store() {
        let store = MemoryTokenStore::new();

        let first = store
            .replace_for_subject(None, &record("alice", "tok-1", 1000))
            .await
            .unwrap();
        assert_eq!(first, ReplaceOutcome::Replaced);

        let lost = store
            .replace_for_subject(None, &record("alice", "tok-2", 1000))
            .await
            .unwrap();
        assert_eq!(lost, ReplaceOutcome::Conflict);

        let stale = store
            .replace_for_subject(Some("tok-0"), &record("alice", "tok-2", 1000))
            .await
            .unwrap();
        assert_eq!(stale, ReplaceOutcome::Conflict);

        let swapped = store
            .replace_for_subject(Some("tok-1"), &record("alice", "tok-2", 2000))
            .await
            .unwrap();
        assert_eq!(swapped, ReplaceOutcome::Replaced);

        assert_eq!(store.len().await, 1);
        assert!(store.find_by_token("tok-1").await.unwrap().is_none());
        assert_eq!(
            store.find_by_token("tok-2").await.unwrap().unwrap().expiration,
            2000
        );
    }

    #[tokio::test]
    async fn test_delete_by_token_and_expired() {
        let store = MemoryTokenStore::new();
        store.upsert(&record("alice", "tok-1", 1000)).await.unwrap();
        store.upsert(&record("bob", "tok-2", 3000)).await.unwrap();

        assert!(store.delete_by_token("tok-2").await.unwrap());
        assert!(!store.delete_by_token("tok-2").await.unwrap());

        assert_eq!(store.delete_expired(2000).await.unwrap(), 1);
        assert!(store.is_empty().await);
    }
}
