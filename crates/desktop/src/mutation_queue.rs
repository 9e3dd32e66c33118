//! Durable FIFO of writes accepted while offline.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use crate::db::LocalDb;
use crate::error::{OfflineError, OfflineResult};
use crate::types::{HttpMethod, PendingMutation};

/// SQLite-backed mutation queue. Order is the insertion order (`seq`), never
/// timestamps, so clock adjustments cannot reorder replay.
#[derive(Debug, Clone)]
pub struct MutationQueue {
    db: LocalDb,
}

impl MutationQueue {
    pub fn new(db: LocalDb) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &LocalDb {
        &self.db
    }

    pub async fn enqueue(&self, mutation: &PendingMutation) -> OfflineResult<()> {
        let body = mutation.body.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO pending_mutations (
                id,
                method,
                path,
                body,
                provisional_id,
                idempotency_key,
                attempts,
                last_error,
                created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(mutation.id.to_string())
        .bind(mutation.method.as_str())
        .bind(&mutation.path)
        .bind(body)
        .bind(&mutation.provisional_id)
        .bind(&mutation.idempotency_key)
        .bind(i64::from(mutation.attempts))
        .bind(&mutation.last_error)
        .bind(mutation.created_at.to_rfc3339())
        .execute(self.db.pool())
        .await?;

        tracing::info!(
            mutation_id = %mutation.id,
            method = %mutation.method,
            path = %mutation.path,
            "queued offline mutation"
        );
        Ok(())
    }

    /// Head of the queue.
    pub async fn peek(&self) -> OfflineResult<Option<PendingMutation>> {
        let row = sqlx::query(
            r#"
            SELECT id, method, path, body, provisional_id, idempotency_key, attempts, last_error, created_at
            FROM pending_mutations
            ORDER BY seq ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(self.db.pool())
        .await?;
        row.map(row_to_mutation).transpose()
    }

    /// All queued mutations in replay order.
    pub async fn pending(&self) -> OfflineResult<Vec<PendingMutation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, method, path, body, provisional_id, idempotency_key, attempts, last_error, created_at
            FROM pending_mutations
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;
        rows.into_iter().map(row_to_mutation).collect()
    }

    pub async fn len(&self) -> OfflineResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_mutations")
            .fetch_one(self.db.pool())
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub async fn is_empty(&self) -> OfflineResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Remove an acknowledged (or abandoned) entry. Returns whether it existed.
    pub async fn remove(&self, id: Uuid) -> OfflineResult<bool> {
        let mut conn = self.db.pool().acquire().await?;
        self.remove_with(&mut conn, id).await
    }

    /// [`remove`](Self::remove) on a caller-held connection or transaction.
    pub(crate) async fn remove_with(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
    ) -> OfflineResult<bool> {
        let result = sqlx::query("DELETE FROM pending_mutations WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count a failed attempt; the entry stays queued.
    pub async fn record_failure(&self, id: Uuid, error: &str) -> OfflineResult<()> {
        sqlx::query(
            r#"
            UPDATE pending_mutations
            SET attempts = attempts + 1,
                last_error = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(error)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Rewrite references to `old` in the path and body of every queued entry.
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
            UPDATE pending_mutations
            SET path = replace(path, ?1, ?2),
                body = replace(body, ?1, ?2)
            WHERE path LIKE ?3 OR body LIKE ?3
            "#,
        )
        .bind(old)
        .bind(new)
        .bind(&pattern)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_mutation(row: SqliteRow) -> OfflineResult<PendingMutation> {
    let id: String = row.try_get("id")?;
    let method: String = row.try_get("method")?;
    let body: Option<String> = row.try_get("body")?;
    let attempts: i64 = row.try_get("attempts")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(PendingMutation {
        id: Uuid::parse_str(&id)
            .map_err(|e| OfflineError::corrupt(format!("invalid mutation id '{id}': {e}")))?,
        method: HttpMethod::parse(&method)
            .ok_or_else(|| OfflineError::corrupt(format!("invalid method '{method}'")))?,
        path: row.try_get("path")?,
        body: body
            .map(|b| serde_json::from_str::<Value>(&b))
            .transpose()?,
        provisional_id: row.try_get("provisional_id")?,
        idempotency_key: row.try_get("idempotency_key")?,
        attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        last_error: row.try_get("last_error")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| OfflineError::corrupt(format!("invalid created_at '{created_at}': {e}")))?,
    })
}
