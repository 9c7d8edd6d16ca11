//! Pending two-factor handshakes.
//!
//! A handshake is created after a correct password for an account with 2FA
//! enabled and is redeemable once. `take` must be atomic: of two concurrent
//! callers with the same token, at most one receives the entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHandshake {
    pub temp_token: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingHandshake {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[async_trait]
pub trait HandshakeStore: Send + Sync {
    async fn insert(&self, handshake: PendingHandshake) -> Result<(), StoreError>;

    /// Look up without consuming. Expired entries may still be returned.
    async fn peek(&self, temp_token: &str) -> Result<Option<PendingHandshake>, StoreError>;

    /// Remove and return the entry.
    async fn take(&self, temp_token: &str) -> Result<Option<PendingHandshake>, StoreError>;

    /// Drop entries expired at `now`. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

#[derive(Default)]
pub struct MemoryHandshakeStore {
    entries: DashMap<String, PendingHandshake>,
}

impl MemoryHandshakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl HandshakeStore for MemoryHandshakeStore {
    async fn insert(&self, handshake: PendingHandshake) -> Result<(), StoreError> {
        self.entries
            .insert(handshake.temp_token.clone(), handshake);
        Ok(())
    }

    async fn peek(&self, temp_token: &str) -> Result<Option<PendingHandshake>, StoreError> {
        Ok(self.entries.get(temp_token).map(|e| e.value().clone()))
    }

    async fn take(&self, temp_token: &str) -> Result<Option<PendingHandshake>, StoreError> {
        Ok(self.entries.remove(temp_token).map(|(_, handshake)| handshake))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let before = self.entries.len();
        self.entries.retain(|_, h| !h.is_expired(now));
        Ok(before.saturating_sub(self.entries.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn handshake(token: &str, now: DateTime<Utc>) -> PendingHandshake {
        PendingHandshake {
            temp_token: token.to_string(),
            username: "root".to_string(),
            created_at: now,
            expires_at: now + Duration::seconds(300),
        }
    }

    #[tokio::test]
    async fn test_take_is_single_use() {
        let store = MemoryHandshakeStore::new();
        let now = Utc::now();
        store.insert(handshake("t1", now)).await.unwrap();

        assert!(store.peek("t1").await.unwrap().is_some());
        assert!(store.take("t1").await.unwrap().is_some());
        assert!(store.take("t1").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_take_has_one_winner() {
        let store = Arc::new(MemoryHandshakeStore::new());
        store.insert(handshake("t1", Utc::now())).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.take("t1").await.unwrap().is_some() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryHandshakeStore::new();
        let now = Utc::now();
        store.insert(handshake("old", now - Duration::seconds(600))).await.unwrap();
        store.insert(handshake("new", now)).await.unwrap();

        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }
}
