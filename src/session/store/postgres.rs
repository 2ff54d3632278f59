//! `PostgreSQL` session store.
//!
//! The table is self-provisioned on startup:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS session (
//!     sid    TEXT PRIMARY KEY,
//!     sess   JSONB NOT NULL,
//!     expire TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! Timestamps are bound as Unix seconds and converted with `to_timestamp`, so
//! expiry checks use the gateway clock rather than the database clock.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{types::Json, PgPool, Row};
use tracing::{info_span, Instrument};

use super::{SessionRecord, SessionStore, StoreError};
use crate::session::{SessionData, SessionId};

const CREATE_TABLE: &str = r"
    CREATE TABLE IF NOT EXISTS session (
        sid TEXT PRIMARY KEY,
        sess JSONB NOT NULL,
        expire TIMESTAMPTZ NOT NULL
    )
";

const CREATE_INDEX: &str = "CREATE INDEX IF NOT EXISTS session_expire_idx ON session (expire)";

#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Build the store and make sure its table exists.
    ///
    /// # Errors
    /// Returns an error if the table or index cannot be created, e.g. for lack of privileges.
    pub async fn new(pool: PgPool) -> Result<Self> {
        let store = Self { pool };
        store.provision().await?;
        Ok(store)
    }

    async fn provision(&self) -> Result<()> {
        for statement in [CREATE_TABLE, CREATE_INDEX] {
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "CREATE",
                db.statement = statement
            );
            sqlx::query(statement)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to provision session table")?;
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self, id: &SessionId, now: i64) -> Result<Option<SessionRecord>, StoreError> {
        let query = r"
            SELECT sess, EXTRACT(EPOCH FROM expire)::BIGINT AS expires_at
            FROM session
            WHERE sid = $1 AND expire > to_timestamp($2)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let Json(data): Json<SessionData> = row.try_get("sess").map_err(StoreError::Decode)?;
        let expires_at: i64 = row.try_get("expires_at").map_err(StoreError::Decode)?;

        Ok(Some(SessionRecord {
            id: id.clone(),
            data,
            expires_at,
        }))
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO session (sid, sess, expire)
            VALUES ($1, $2, to_timestamp($3))
            ON CONFLICT (sid) DO UPDATE
            SET sess = EXCLUDED.sess, expire = EXCLUDED.expire
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(record.id.as_str())
            .bind(Json(&record.data))
            .bind(record.expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn touch(&self, id: &SessionId, expires_at: i64) -> Result<(), StoreError> {
        let query = "UPDATE session SET expire = to_timestamp($2) WHERE sid = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id.as_str())
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), StoreError> {
        let query = "DELETE FROM session WHERE sid = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn prune_expired(&self, now: i64) -> Result<u64, StoreError> {
        let query = "DELETE FROM session WHERE expire <= to_timestamp($1)";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected())
    }
}
