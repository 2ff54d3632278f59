use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{SessionRecord, SessionStore, StoreError};
use crate::session::SessionId;

/// In-process store used by tests and by local runs without a database.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held, expired ones included.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &SessionId, now: i64) -> Result<Option<SessionRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .get(id)
            .filter(|record| !record.is_expired(now))
            .cloned())
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn touch(&self, id: &SessionId, expires_at: i64) -> Result<(), StoreError> {
        if let Some(record) = self.records.write().await.get_mut(id) {
            record.expires_at = expires_at;
        }
        Ok(())
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), StoreError> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn prune_expired(&self, now: i64) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired(now));
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::{Identity, SessionData};

    fn record(expires_at: i64) -> SessionRecord {
        let mut data = SessionData::default();
        data.user = Some(Identity::new("u1"));
        SessionRecord {
            id: SessionId::generate().unwrap(),
            data,
            expires_at,
        }
    }

    #[tokio::test]
    async fn expired_records_load_as_absent() {
        let store = MemorySessionStore::new();
        let live = record(200);
        let stale = record(100);
        store.save(&live).await.unwrap();
        store.save(&stale).await.unwrap();

        assert_eq!(store.load(&live.id, 150).await.unwrap(), Some(live.clone()));
        assert_eq!(store.load(&stale.id, 150).await.unwrap(), None);
        assert_eq!(
            store
                .load(&SessionId::generate().unwrap(), 150)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn saving_twice_keeps_the_same_payload() {
        let store = MemorySessionStore::new();
        let record = record(500);
        store.save(&record).await.unwrap();
        store.save(&record).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.load(&record.id, 0).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn touch_moves_expiry_and_destroy_removes() {
        let store = MemorySessionStore::new();
        let record = record(100);
        store.save(&record).await.unwrap();
        store.touch(&record.id, 300).await.unwrap();
        assert_eq!(
            store.load(&record.id, 200).await.unwrap().map(|r| r.expires_at),
            Some(300)
        );

        store.destroy(&record.id).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn prune_removes_only_expired() {
        let store = MemorySessionStore::new();
        store.save(&record(100)).await.unwrap();
        store.save(&record(100)).await.unwrap();
        store.save(&record(900)).await.unwrap();
        assert_eq!(store.prune_expired(500).await.unwrap(), 2);
        assert_eq!(store.len().await, 1);
    }
}
