//! Generation-tagged read cache.
//!
//! Responses are keyed by [`RequestKey`] and tagged with the cache generation
//! current when they were stored. Opening a cache with a new generation purges
//! every entry from older generations, so no response survives a schema change.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::SqliteConnection;

use crate::db::LocalDb;
use crate::error::{OfflineError, OfflineResult};
use crate::types::RequestKey;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
    pub body: Value,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReadCache {
    db: LocalDb,
    generation: String,
}

impl ReadCache {
    /// Activate `generation`, purging entries from every other generation.
    pub async fn open(db: LocalDb, generation: impl Into<String>) -> OfflineResult<Self> {
        let cache = Self {
            db,
            generation: generation.into(),
        };
        let purged = cache.purge_other_generations().await?;
        if purged > 0 {
            tracing::info!(
                generation = %cache.generation,
                purged,
                "purged cache entries from previous generations"
            );
        }
        Ok(cache)
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub async fn get(&self, key: &RequestKey) -> OfflineResult<Option<CachedEntry>> {
        let row = sqlx::query(
            r#"
            SELECT body, cached_at
            FROM read_cache
            WHERE request_key = ?1
              AND generation = ?2
            "#,
        )
        .bind(key.as_str())
        .bind(&self.generation)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let body: String = row.try_get("body")?;
        let cached_at: String = row.try_get("cached_at")?;
        let cached_at = DateTime::parse_from_rfc3339(&cached_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| OfflineError::corrupt(format!("invalid cached_at for {key}: {e}")))?;

        Ok(Some(CachedEntry {
            body: serde_json::from_str(&body)?,
            cached_at,
        }))
    }

    pub async fn put(&self, key: &RequestKey, body: &Value) -> OfflineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO read_cache (request_key, generation, body, cached_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(request_key, generation)
            DO UPDATE SET
                body = excluded.body,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(key.as_str())
        .bind(&self.generation)
        .bind(serde_json::to_string(body)?)
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Rewrite `old` to `new` in every cached key and body. Returns rows touched.
    ///
    /// Provisional identities are unique tokens, so a textual replace cannot hit
    /// unrelated data.
    pub async fn remap_identity(&self, old: &str, new: &str) -> OfflineResult<u64> {
        let mut conn = self.db.pool().acquire().await?;
        self.remap_identity_with(&mut conn, old, new).await
    }

    pub(crate) async fn remap_identity_with(
        &self,
        conn: &mut SqliteConnection,
        old: &str,
        new: &str,
    ) -> OfflineResult<u64> {
        let pattern = format!("%{old}%");
        let result = sqlx::query(
            r#"
            UPDATE OR REPLACE read_cache
            SET request_key = replace(request_key, ?1, ?2),
                body = replace(body, ?1, ?2)
            WHERE request_key LIKE ?3 OR body LIKE ?3
            "#,
        )
        .bind(old)
        .bind(new)
        .bind(&pattern)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn purge_other_generations(&self) -> OfflineResult<u64> {
        let result = sqlx::query("DELETE FROM read_cache WHERE generation <> ?1")
            .bind(&self.generation)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
