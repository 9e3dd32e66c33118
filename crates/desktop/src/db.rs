//! Local SQLite database holding the read cache and the mutation queue.

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions};

use crate::config::DatabaseLocation;
use crate::error::OfflineResult;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS read_cache (
        request_key TEXT NOT NULL,
        generation  TEXT NOT NULL,
        body        TEXT NOT NULL,
        cached_at   TEXT NOT NULL,
        PRIMARY KEY (request_key, generation)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pending_mutations (
        seq             INTEGER PRIMARY KEY AUTOINCREMENT,
        id              TEXT NOT NULL UNIQUE,
        method          TEXT NOT NULL,
        path            TEXT NOT NULL,
        body            TEXT NULL,
        provisional_id  TEXT NULL,
        idempotency_key TEXT NOT NULL,
        attempts        INTEGER NOT NULL DEFAULT 0,
        last_error      TEXT NULL,
        created_at      TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS identity_map (
        provisional_id TEXT PRIMARY KEY,
        server_id      TEXT NOT NULL,
        remapped_at    TEXT NOT NULL
    )
    "#,
];

/// Handle to the local database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LocalDb {
    pool: SqlitePool,
}

impl LocalDb {
    pub async fn open(location: &DatabaseLocation) -> OfflineResult<Self> {
        let pool = match location {
            // One connection that never expires, or the in-memory database vanishes.
            DatabaseLocation::InMemory => {
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
                    .await?
            }
            DatabaseLocation::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal);
                SqlitePoolOptions::new()
                    .max_connections(4)
                    .connect_with(options)
                    .await?
            }
        };

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        tracing::debug!(?location, "local database ready");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Record that a provisional identity now has a server identity.
    pub async fn record_identity(&self, provisional_id: &str, server_id: &str) -> OfflineResult<()> {
        let mut conn = self.pool.acquire().await?;
        self.record_identity_with(&mut conn, provisional_id, server_id).await
    }

    pub(crate) async fn record_identity_with(
        &self,
        conn: &mut SqliteConnection,
        provisional_id: &str,
        server_id: &str,
    ) -> OfflineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO identity_map (provisional_id, server_id, remapped_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(provisional_id) DO UPDATE SET
                server_id = excluded.server_id,
                remapped_at = excluded.remapped_at
            "#,
        )
        .bind(provisional_id)
        .bind(server_id)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Server identity a provisional identity was remapped to, if any.
    pub async fn resolve_identity(&self, provisional_id: &str) -> OfflineResult<Option<String>> {
        let server_id: Option<String> =
            sqlx::query_scalar("SELECT server_id FROM identity_map WHERE provisional_id = ?1")
                .bind(provisional_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(server_id)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_map_round_trips() {
        let db = LocalDb::open(&DatabaseLocation::InMemory).await.unwrap();
        assert_eq!(db.resolve_identity("local-1").await.unwrap(), None);
        db.record_identity("local-1", "0192").await.unwrap();
        assert_eq!(db.resolve_identity("local-1").await.unwrap().as_deref(), Some("0192"));
    }
}
