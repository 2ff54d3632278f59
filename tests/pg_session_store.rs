//! Runs against a real database only when `BULLETIN_TEST_DSN` is set, e.g.
//! `BULLETIN_TEST_DSN=postgres://postgres@localhost:5432/bulletin cargo test`.

#![allow(clippy::unwrap_used)]

use bulletin::session::{
    now_unix_seconds, store::PgSessionStore, Identity, SessionData, SessionId, SessionRecord,
    SessionStore,
};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;

async fn store() -> Option<PgSessionStore> {
    let Ok(dsn) = std::env::var("BULLETIN_TEST_DSN") else {
        eprintln!("BULLETIN_TEST_DSN not set, skipping");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&dsn)
        .await
        .unwrap();
    Some(PgSessionStore::new(pool).await.unwrap())
}

fn record(expires_at: i64) -> SessionRecord {
    let mut data = SessionData {
        user: Some(Identity::new("u-7").with_username("ada")),
        ..SessionData::default()
    };
    data.extensions.insert("theme".to_string(), json!("dark"));
    SessionRecord {
        id: SessionId::generate().unwrap(),
        data,
        expires_at,
    }
}

#[tokio::test]
async fn save_load_round_trip() {
    let Some(store) = store().await else { return };
    let now = now_unix_seconds();
    let record = record(now + 60);

    store.save(&record).await.unwrap();
    let loaded = store.load(&record.id, now).await.unwrap().unwrap();
    assert_eq!(loaded, record);

    store.destroy(&record.id).await.unwrap();
    assert!(store.load(&record.id, now).await.unwrap().is_none());
}

#[tokio::test]
async fn save_overwrites_existing_row() {
    let Some(store) = store().await else { return };
    let now = now_unix_seconds();
    let mut record = record(now + 60);
    store.save(&record).await.unwrap();

    record.data.user = None;
    record.expires_at = now + 120;
    store.save(&record).await.unwrap();

    let loaded = store.load(&record.id, now).await.unwrap().unwrap();
    assert!(loaded.data.user.is_none());
    assert_eq!(loaded.expires_at, now + 120);
    store.destroy(&record.id).await.unwrap();
}

#[tokio::test]
async fn expired_rows_load_as_absent_and_are_pruned() {
    let Some(store) = store().await else { return };
    let now = now_unix_seconds();
    let record = record(now - 5);
    store.save(&record).await.unwrap();

    assert!(store.load(&record.id, now).await.unwrap().is_none());
    assert!(store.prune_expired(now).await.unwrap() >= 1);
    assert!(store.load(&record.id, now - 10).await.unwrap().is_none());
}

#[tokio::test]
async fn touch_moves_expiry() {
    let Some(store) = store().await else { return };
    let now = now_unix_seconds();
    let record = record(now + 5);
    store.save(&record).await.unwrap();

    store.touch(&record.id, now + 3600).await.unwrap();
    let loaded = store.load(&record.id, now + 60).await.unwrap().unwrap();
    assert_eq!(loaded.expires_at, now + 3600);

    store.destroy(&record.id).await.unwrap();
    store.touch(&record.id, now + 3600).await.unwrap();
    assert!(store.load(&record.id, now).await.unwrap().is_none());
}

#[tokio::test]
async fn provisioning_is_idempotent() {
    let Some(first) = store().await else { return };
    let second = store().await.unwrap();
    let record = record(now_unix_seconds() + 60);
    first.save(&record).await.unwrap();
    assert!(second
        .load(&record.id, now_unix_seconds())
        .await
        .unwrap()
        .is_some());
    second.destroy(&record.id).await.unwrap();
}
