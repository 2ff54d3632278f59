//! Server-side sessions.
//!
//! A [`Session`] is attached to every routed request by [`middleware::attach`].
//! Collaborators mutate it through the handle; the middleware decides after the
//! response is produced whether the record has to be saved, touched or destroyed:
//!
//! - new and untouched sessions are never written (anonymous traffic stays free),
//! - a payload that differs from what was loaded is saved and the cookie refreshed,
//! - `touch()` (or the rolling policy) extends the expiry without rewriting data,
//! - `destroy()` deletes the record and expires the cookie.

pub mod cookie;
pub mod id;
pub mod middleware;
pub mod store;

pub use id::{CookieSigner, SessionId};
pub use store::{SessionRecord, SessionStore, StoreError};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seven days, the lifetime of a session from its last save.
pub const DEFAULT_MAX_AGE_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Ten years. Longer lifetimes are clamped to this.
pub const MAX_AGE_LIMIT_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

/// The authenticated caller bound by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: None,
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Persisted session payload: an explicit identity plus freeform extension keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Identity>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl SessionData {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.extensions.is_empty()
    }
}

#[derive(Debug)]
struct Inner {
    id: SessionId,
    data: SessionData,
    /// Payload as loaded; `None` for sessions created by this request.
    snapshot: Option<SessionData>,
    touched: bool,
    destroyed: bool,
    /// Ids replaced by `regenerate()` that must be deleted from the store.
    retired: Vec<SessionId>,
}

/// Mutable, cloneable handle to the session of the current request.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<Mutex<Inner>>,
}

impl Session {
    /// A session created for this request; persisted only once it carries data.
    ///
    /// # Errors
    /// Returns an error if a session id cannot be generated.
    pub fn fresh() -> Result<Self> {
        Ok(Self::with_inner(Inner {
            id: SessionId::generate()?,
            data: SessionData::default(),
            snapshot: None,
            touched: false,
            destroyed: false,
            retired: Vec::new(),
        }))
    }

    /// A session resumed from a stored record.
    #[must_use]
    pub fn from_record(record: SessionRecord) -> Self {
        Self::with_inner(Inner {
            id: record.id,
            snapshot: Some(record.data.clone()),
            data: record.data,
            touched: false,
            destroyed: false,
            retired: Vec::new(),
        })
    }

    fn with_inner(inner: Inner) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    // The lock is never held across an await point.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.lock().id.clone()
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.lock().snapshot.is_none()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.lock().data.user.clone()
    }

    pub fn bind_identity(&self, identity: Identity) {
        self.lock().data.user = Some(identity);
    }

    pub fn clear_identity(&self) {
        self.lock().data.user = None;
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().data.extensions.get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.lock().data.extensions.insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.lock().data.extensions.remove(key)
    }

    #[must_use]
    pub fn data(&self) -> SessionData {
        self.lock().data.clone()
    }

    /// Extend the expiry on this response without changing the payload.
    pub fn touch(&self) {
        self.lock().touched = true;
    }

    /// Issue a new identifier for the same payload; the old record is deleted.
    ///
    /// # Errors
    /// Returns an error if a session id cannot be generated.
    pub fn regenerate(&self) -> Result<()> {
        let id = SessionId::generate()?;
        let mut inner = self.lock();
        let old = std::mem::replace(&mut inner.id, id);
        if inner.snapshot.is_some() {
            inner.retired.push(old);
        }
        // The new id has never been stored, so it must be saved even if unchanged.
        inner.snapshot = None;
        Ok(())
    }

    /// Drop the session: the record is deleted and the cookie expired.
    pub fn destroy(&self) {
        let mut inner = self.lock();
        inner.destroyed = true;
        inner.data = SessionData::default();
    }

    pub(crate) fn outcome(&self, rolling: bool) -> Outcome {
        let inner = self.lock();
        if inner.destroyed {
            let mut ids = inner.retired.clone();
            if inner.snapshot.is_some() {
                ids.push(inner.id.clone());
            }
            return Outcome::Destroy(ids);
        }

        match &inner.snapshot {
            None if inner.data.is_empty() && inner.retired.is_empty() => Outcome::Unchanged,
            None => Outcome::Save {
                id: inner.id.clone(),
                data: inner.data.clone(),
                retired: inner.retired.clone(),
            },
            Some(snapshot) if *snapshot != inner.data => Outcome::Save {
                id: inner.id.clone(),
                data: inner.data.clone(),
                retired: Vec::new(),
            },
            Some(_) if inner.touched || rolling => Outcome::Touch(inner.id.clone()),
            Some(_) => Outcome::Unchanged,
        }
    }
}

/// What the session middleware must do once the response is ready.
#[derive(Debug, PartialEq)]
pub(crate) enum Outcome {
    Unchanged,
    Save {
        id: SessionId,
        data: SessionData,
        retired: Vec<SessionId>,
    },
    Touch(SessionId),
    Destroy(Vec<SessionId>),
}

/// Current Unix time in seconds.
#[must_use]
pub fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loaded(data: SessionData) -> Session {
        Session::from_record(SessionRecord {
            id: SessionId::generate().unwrap(),
            data,
            expires_at: now_unix_seconds() + 60,
        })
    }

    #[test]
    fn fresh_session_without_data_is_not_persisted() {
        let session = Session::fresh().unwrap();
        assert!(session.is_new());
        assert_eq!(session.outcome(false), Outcome::Unchanged);
        // Rolling never applies to sessions that were never stored.
        assert_eq!(session.outcome(true), Outcome::Unchanged);
    }

    #[test]
    fn fresh_session_with_identity_is_saved() {
        let session = Session::fresh().unwrap();
        session.bind_identity(Identity::new("42"));
        match session.outcome(false) {
            Outcome::Save { id, data, retired } => {
                assert_eq!(id, session.id());
                assert_eq!(data.user, Some(Identity::new("42")));
                assert!(retired.is_empty());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn loaded_session_is_saved_only_when_modified() {
        let mut data = SessionData::default();
        data.user = Some(Identity::new("7"));
        let session = loaded(data);
        assert_eq!(session.outcome(false), Outcome::Unchanged);

        // Rebinding the same identity is not a modification.
        session.bind_identity(Identity::new("7"));
        assert_eq!(session.outcome(false), Outcome::Unchanged);

        session.insert("theme", json!("dark"));
        assert!(matches!(session.outcome(false), Outcome::Save { .. }));
    }

    #[test]
    fn touch_and_rolling_extend_existing_sessions() {
        let session = loaded(SessionData::default());
        assert_eq!(session.outcome(true), Outcome::Touch(session.id()));

        let session = loaded(SessionData::default());
        session.touch();
        assert_eq!(session.outcome(false), Outcome::Touch(session.id()));
    }

    #[test]
    fn destroy_deletes_stored_record() {
        let session = loaded(SessionData::default());
        let id = session.id();
        session.destroy();
        assert_eq!(session.outcome(false), Outcome::Destroy(vec![id]));

        let fresh = Session::fresh().unwrap();
        fresh.destroy();
        assert_eq!(fresh.outcome(false), Outcome::Destroy(Vec::new()));
    }

    #[test]
    fn regenerate_retires_the_old_id() {
        let mut data = SessionData::default();
        data.user = Some(Identity::new("1"));
        let session = loaded(data);
        let old = session.id();
        session.regenerate().unwrap();
        assert_ne!(session.id(), old);
        match session.outcome(false) {
            Outcome::Save { id, retired, .. } => {
                assert_eq!(id, session.id());
                assert_eq!(retired, vec![old]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn session_data_serializes_extensions_flat() {
        let mut data = SessionData::default();
        data.user = Some(Identity::new("9").with_username("ada"));
        data.extensions.insert("cart".to_string(), json!([1, 2]));
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(
            value,
            json!({"user": {"user_id": "9", "username": "ada"}, "cart": [1, 2]})
        );
        let back: SessionData = serde_json::from_value(value).unwrap();
        assert_eq!(back, data);
    }
}
