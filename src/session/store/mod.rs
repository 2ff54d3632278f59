//! Session persistence contract and its backends.

mod memory;
mod postgres;

pub use memory::MemorySessionStore;
pub use postgres::PgSessionStore;

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error};

use super::{now_unix_seconds, SessionData, SessionId};

/// Shortest sweep interval; smaller values are raised to this.
pub const MIN_PRUNE_INTERVAL: Duration = Duration::from_secs(1);

/// A stored session row.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: SessionId,
    pub data: SessionData,
    /// Unix seconds; the record is treated as absent from this instant on.
    pub expires_at: i64,
}

impl SessionRecord {
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session database error")]
    Database(#[from] sqlx::Error),
    #[error("session payload could not be decoded")]
    Decode(#[source] sqlx::Error),
}

/// Backing storage for sessions.
///
/// Missing and expired records are reported as `Ok(None)`, never as errors.
/// `save` overwrites unconditionally: two requests racing on one id resolve
/// as last write wins.
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    async fn load(&self, id: &SessionId, now: i64) -> Result<Option<SessionRecord>, StoreError>;

    async fn save(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Move the expiry of an existing record; unknown ids are ignored.
    async fn touch(&self, id: &SessionId, expires_at: i64) -> Result<(), StoreError>;

    async fn destroy(&self, id: &SessionId) -> Result<(), StoreError>;

    /// Delete every record that expired before `now`, returning how many were removed.
    async fn prune_expired(&self, now: i64) -> Result<u64, StoreError>;
}

/// Periodically delete expired rows. Expired sessions already load as absent,
/// this only keeps the table from growing.
pub fn spawn_prune_worker(store: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every.max(MIN_PRUNE_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.prune_expired(now_unix_seconds()).await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "pruned expired sessions"),
                Err(err) => error!("Failed to prune expired sessions: {err}"),
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_interval_worker_keeps_running_and_prunes() {
        let store = Arc::new(MemorySessionStore::new());
        let stale = SessionRecord {
            id: SessionId::generate().unwrap(),
            data: SessionData::default(),
            expires_at: 1,
        };
        store.save(&stale).await.unwrap();

        let worker = spawn_prune_worker(store.clone(), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!worker.is_finished());
        assert!(store.is_empty().await);
        worker.abort();
    }
}
