//! Replay of queued mutations against the live backend.
//!
//! Strictly FIFO and strictly sequential: one mutation in flight at a time,
//! replay stops at the first failure, and an entry is removed only after the
//! backend acknowledged it. A 4xx rejection drops the entry as conflicted,
//! except busy answers (408, 429, the same key still in flight), which keep
//! it. Delivery is at-least-once; each entry carries an idempotency key so the
//! backend can drop the duplicate of a lost ack.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::ReadCache;
use crate::db::LocalDb;
use crate::error::OfflineResult;
use crate::interceptor::entity_id;
use crate::mutation_queue::MutationQueue;
use crate::offline::Connectivity;
use crate::transport::{Transport, TransportError};
use crate::types::{PendingMutation, WriteOutcome};

/// Why a replay run stopped early.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum ReplayError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("backend error {status}")]
    Server { status: u16, body: Value },
    /// The backend asked to come back later; the entry was not rejected.
    #[error("backend busy ({status}); retry later")]
    Busy { status: u16, body: Value },
}

impl From<TransportError> for ReplayError {
    fn from(value: TransportError) -> Self {
        ReplayError::Transport(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayedMutation {
    pub mutation_id: Uuid,
    pub outcome: WriteOutcome,
}

/// A provisional identity replaced by the server's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRemap {
    pub provisional_id: String,
    pub server_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplayReport {
    /// Confirmed and conflicted entries, in replay order.
    pub replayed: Vec<ReplayedMutation>,
    pub remapped: Vec<IdentityRemap>,
    /// Dropped without replay: too old or too many failed attempts.
    pub expired: Vec<Uuid>,
    /// The entry replay stopped at; it stays queued.
    pub failed: Option<(Uuid, ReplayError)>,
    pub cancelled: bool,
    pub remaining: usize,
}

impl ReplayReport {
    pub fn confirmed(&self) -> usize {
        self.replayed
            .iter()
            .filter(|r| matches!(r.outcome, WriteOutcome::Confirmed { .. }))
            .count()
    }

    pub fn conflicted(&self) -> usize {
        self.replayed
            .iter()
            .filter(|r| matches!(r.outcome, WriteOutcome::Conflicted { .. }))
            .count()
    }

    /// Whether the queue was drained without interruption.
    pub fn is_complete(&self) -> bool {
        self.failed.is_none() && !self.cancelled && self.remaining == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayPolicy {
    pub max_attempts: u32,
    pub max_age: Option<chrono::Duration>,
}

impl Default for ReplayPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            max_age: Some(chrono::Duration::days(30)),
        }
    }
}

impl ReplayPolicy {
    fn is_expired(&self, mutation: &PendingMutation) -> bool {
        mutation.attempts >= self.max_attempts
            || self
                .max_age
                .is_some_and(|age| Utc::now() - mutation.created_at > age)
    }
}

#[derive(Debug)]
pub struct Reconciler<T> {
    transport: T,
    queue: MutationQueue,
    cache: ReadCache,
    db: LocalDb,
    connectivity: Arc<Connectivity>,
    policy: ReplayPolicy,
    /// Held for a whole run: two runs never interleave.
    running: Mutex<()>,
}

impl<T: Transport> Reconciler<T> {
    pub fn new(
        transport: T,
        queue: MutationQueue,
        cache: ReadCache,
        db: LocalDb,
        connectivity: Arc<Connectivity>,
        policy: ReplayPolicy,
    ) -> Self {
        Self {
            transport,
            queue,
            cache,
            db,
            connectivity,
            policy,
            running: Mutex::new(()),
        }
    }

    pub fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Replay queued mutations in order until the queue is empty, an entry
    /// fails, or `cancel` fires.
    pub async fn replay(&self, cancel: &CancellationToken) -> OfflineResult<ReplayReport> {
        let _guard = self.running.lock().await;
        let mut report = ReplayReport::default();

        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            // Re-read the head each time: a remap may have rewritten it.
            let Some(mutation) = self.queue.peek().await? else {
                break;
            };

            if self.policy.is_expired(&mutation) {
                tracing::warn!(
                    mutation_id = %mutation.id,
                    attempts = mutation.attempts,
                    created_at = %mutation.created_at,
                    "queued mutation expired; dropping it"
                );
                self.queue.remove(mutation.id).await?;
                report.expired.push(mutation.id);
                continue;
            }

            let request = mutation.request();
            let sent = tokio::select! {
                _ = cancel.cancelled() => None,
                result = self.transport.send(&request, Some(&mutation.idempotency_key)) => Some(result),
            };
            let Some(result) = sent else {
                // The request may have reached the backend; the idempotency key covers the retry.
                report.cancelled = true;
                break;
            };

            match result {
                Ok(resp) if resp.is_success() => {
                    self.connectivity.mark_online();
                    let server_id = entity_id(&resp.body);
                    if let Some(remap) = self.acknowledge(&mutation, server_id.as_deref()).await? {
                        report.remapped.push(remap);
                    }
                    tracing::info!(mutation_id = %mutation.id, path = %mutation.path, "replayed mutation confirmed");
                    report.replayed.push(ReplayedMutation {
                        mutation_id: mutation.id,
                        outcome: WriteOutcome::Confirmed { server_id },
                    });
                }
                Ok(resp) if resp.is_retryable() => {
                    self.connectivity.mark_online();
                    let error = ReplayError::Busy {
                        status: resp.status,
                        body: resp.body,
                    };
                    self.fail(&mutation, error, &mut report).await?;
                    break;
                }
                Ok(resp) if resp.is_client_error() => {
                    // Retrying a rejected write cannot succeed.
                    self.connectivity.mark_online();
                    self.queue.remove(mutation.id).await?;
                    tracing::warn!(
                        mutation_id = %mutation.id,
                        path = %mutation.path,
                        status = resp.status,
                        "replayed mutation rejected by backend"
                    );
                    report.replayed.push(ReplayedMutation {
                        mutation_id: mutation.id,
                        outcome: WriteOutcome::Conflicted {
                            status: resp.status,
                            body: resp.body,
                        },
                    });
                }
                Ok(resp) => {
                    let error = ReplayError::Server {
                        status: resp.status,
                        body: resp.body,
                    };
                    self.fail(&mutation, error, &mut report).await?;
                    break;
                }
                Err(e) => {
                    if !matches!(e, TransportError::InvalidRequest(_)) {
                        self.connectivity.mark_offline();
                    }
                    self.fail(&mutation, e.into(), &mut report).await?;
                    break;
                }
            }
        }

        report.remaining = self.queue.len().await?;
        tracing::info!(
            confirmed = report.confirmed(),
            conflicted = report.conflicted(),
            expired = report.expired.len(),
            remaining = report.remaining,
            cancelled = report.cancelled,
            "replay finished"
        );
        Ok(report)
    }

    async fn fail(
        &self,
        mutation: &PendingMutation,
        error: ReplayError,
        report: &mut ReplayReport,
    ) -> OfflineResult<()> {
        self.queue.record_failure(mutation.id, &error.to_string()).await?;
        tracing::warn!(
            mutation_id = %mutation.id,
            attempt = mutation.attempts + 1,
            %error,
            "replay failed; mutation stays queued"
        );
        report.failed = Some((mutation.id, error));
        Ok(())
    }

    /// Remove an acknowledged entry and, when the backend assigned a different
    /// identity, rewrite every queued entry, cached read and the identity map
    /// in the same transaction.
    async fn acknowledge(
        &self,
        mutation: &PendingMutation,
        server_id: Option<&str>,
    ) -> OfflineResult<Option<IdentityRemap>> {
        let remap = match (mutation.provisional_id.as_deref(), server_id) {
            (Some(provisional), Some(server)) if provisional != server => Some((provisional, server)),
            _ => None,
        };

        let mut tx = self.db.pool().begin().await?;
        self.queue.remove_with(&mut tx, mutation.id).await?;
        let Some((provisional, server)) = remap else {
            tx.commit().await?;
            return Ok(None);
        };
        self.db.record_identity_with(&mut tx, provisional, server).await?;
        let queued = self.queue.remap_identity_with(&mut tx, provisional, server).await?;
        let cached = self.cache.remap_identity_with(&mut tx, provisional, server).await?;
        tx.commit().await?;

        tracing::info!(
            provisional_id = provisional,
            server_id = server,
            queued,
            cached,
            "provisional identity remapped"
        );
        Ok(Some(IdentityRemap {
            provisional_id: provisional.to_string(),
            server_id: server.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseLocation;
    use crate::interceptor::OfflineInterceptor;
    use crate::routes::OfflineDefaults;
    use crate::testing::FakeTransport;
    use crate::transport::IDEMPOTENCY_IN_PROGRESS;
    use crate::types::ApiRequest;
    use serde_json::json;

    struct Harness {
        transport: FakeTransport,
        layer: OfflineInterceptor<FakeTransport>,
        reconciler: Reconciler<FakeTransport>,
    }

    async fn test_harness(policy: ReplayPolicy) -> Harness {
        let transport = FakeTransport::new();
        let db = LocalDb::open(&DatabaseLocation::InMemory).await.unwrap();
        let cache = ReadCache::open(db.clone(), "test").await.unwrap();
        let queue = MutationQueue::new(db.clone());
        let connectivity = Arc::new(Connectivity::default());
        let layer = OfflineInterceptor::new(
            transport.clone(),
            cache.clone(),
            queue.clone(),
            OfflineDefaults::standard(),
            connectivity.clone(),
        )
        .unwrap();
        let reconciler = Reconciler::new(transport.clone(), queue, cache, db, connectivity, policy);
        Harness {
            transport,
            layer,
            reconciler,
        }
    }

    fn paths(sent: &[(ApiRequest, Option<String>)]) -> Vec<String> {
        sent.iter()
            .map(|(r, _)| format!("{} {}", r.method, r.path))
            .collect()
    }

    #[tokio::test]
    async fn replays_in_order_and_remaps_dependents() {
        let h = test_harness(ReplayPolicy::default()).await;
        h.transport.go_offline();

        let created = h
            .layer
            .post("/items", json!({ "name": "Geometria", "code": "GEO-001" }))
            .await
            .unwrap();
        let local_id = created.body["id"].as_str().unwrap().to_string();
        h.layer
            .post(
                "/movements",
                json!({ "item_id": local_id, "movement_type": "IN", "quantity": 3, "reason": "purchase" }),
            )
            .await
            .unwrap();
        h.layer
            .put(format!("/items/{local_id}"), json!({ "name": "Geometria 2" }))
            .await
            .unwrap();

        h.transport.go_online();
        let report = h.reconciler.replay(&CancellationToken::new()).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.confirmed(), 3);
        // Both POSTs carried provisional identities.
        assert_eq!(report.remapped.len(), 2);
        assert_eq!(
            report.remapped[0],
            IdentityRemap {
                provisional_id: local_id.clone(),
                server_id: "srv-1".into()
            }
        );

        let sent = h.transport.sent();
        assert_eq!(
            paths(&sent),
            vec!["POST /items", "POST /movements", "PUT /items/srv-1"]
        );
        assert_eq!(sent[1].0.body.as_ref().unwrap()["item_id"], "srv-1");
        assert!(sent.iter().all(|(_, key)| key.is_some()));
        assert!(h.reconciler.queue().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn stops_at_first_failure_and_does_not_reapply_acknowledged() {
        let h = test_harness(ReplayPolicy::default()).await;
        h.transport.go_offline();
        h.layer.post("/clients", json!({ "name": "A", "phone": "1" })).await.unwrap();
        h.layer.post("/clients", json!({ "name": "B", "phone": "2" })).await.unwrap();

        h.transport.go_online();
        h.transport.offline_after(1);
        let first = h.reconciler.replay(&CancellationToken::new()).await.unwrap();
        assert_eq!(first.confirmed(), 1);
        assert!(matches!(first.failed, Some((_, ReplayError::Transport(_)))));
        assert_eq!(first.remaining, 1);

        let head = h.reconciler.queue().peek().await.unwrap().unwrap();
        assert_eq!(head.attempts, 1);
        assert_eq!(head.body.as_ref().unwrap()["name"], "B");

        h.transport.go_online();
        let second = h.reconciler.replay(&CancellationToken::new()).await.unwrap();
        assert!(second.is_complete());

        let names: Vec<Value> = h
            .transport
            .sent()
            .iter()
            .map(|(r, _)| r.body.as_ref().unwrap()["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("A"), json!("B")]);
    }

    #[tokio::test]
    async fn rejected_entries_are_conflicted_and_replay_continues() {
        let h = test_harness(ReplayPolicy::default()).await;
        h.transport.go_offline();
        h.layer
            .post("/movements", json!({ "item_id": "x", "movement_type": "IN", "quantity": 0, "reason": "purchase" }))
            .await
            .unwrap();
        h.layer.post("/clients", json!({ "name": "A", "phone": "1" })).await.unwrap();

        h.transport.go_online();
        h.transport.respond("POST /movements", 400, json!({ "error": "invalid_quantity" }));
        let report = h.reconciler.replay(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.conflicted(), 1);
        assert_eq!(report.confirmed(), 1);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn in_flight_duplicate_keeps_the_entry_and_its_dependents() {
        let h = test_harness(ReplayPolicy::default()).await;
        h.transport.go_offline();
        let created = h
            .layer
            .post("/items", json!({ "name": "Geometria", "code": "GEO-001" }))
            .await
            .unwrap();
        let local_id = created.body["id"].as_str().unwrap().to_string();
        h.layer
            .post(
                "/movements",
                json!({ "item_id": local_id, "movement_type": "IN", "quantity": 3, "reason": "purchase" }),
            )
            .await
            .unwrap();

        h.transport.go_online();
        h.transport.respond(
            "POST /items",
            409,
            json!({ "error": IDEMPOTENCY_IN_PROGRESS, "message": "still processing" }),
        );
        let busy = h.reconciler.replay(&CancellationToken::new()).await.unwrap();

        assert!(matches!(
            busy.failed,
            Some((_, ReplayError::Busy { status: 409, .. }))
        ));
        assert!(busy.replayed.is_empty());
        assert_eq!(busy.remaining, 2);
        assert_eq!(paths(&h.transport.sent()), vec!["POST /items"]);

        h.transport.forget("POST /items");
        let report = h.reconciler.replay(&CancellationToken::new()).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.confirmed(), 2);
        let sent = h.transport.sent();
        assert_eq!(sent[2].0.body.as_ref().unwrap()["item_id"], "srv-1");
        // Same key on the retry, so the backend can match it to the first attempt.
        assert_eq!(sent[0].1, sent[1].1);
    }

    #[tokio::test]
    async fn acknowledgement_and_remap_commit_together() {
        let h = test_harness(ReplayPolicy::default()).await;
        h.transport.go_offline();
        let created = h
            .layer
            .post("/items", json!({ "name": "Geometria", "code": "GEO-001" }))
            .await
            .unwrap();
        let local_id = created.body["id"].as_str().unwrap().to_string();
        h.layer
            .post("/movements", json!({ "item_id": local_id, "quantity": 1 }))
            .await
            .unwrap();

        // Make the identity-map write fail after the backend acknowledged the create.
        sqlx::query("DROP TABLE identity_map")
            .execute(h.reconciler.db.pool())
            .await
            .unwrap();
        h.transport.go_online();
        assert!(h.reconciler.replay(&CancellationToken::new()).await.is_err());

        let pending = h.reconciler.queue().pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].provisional_id.as_deref(), Some(local_id.as_str()));
        assert_eq!(pending[1].body.as_ref().unwrap()["item_id"], json!(local_id));
    }

    #[tokio::test]
    async fn later_online_writes_replay_after_earlier_queued_ones() {
        let h = test_harness(ReplayPolicy::default()).await;
        h.transport.go_offline();
        let created = h
            .layer
            .post("/items", json!({ "name": "Geometria", "code": "GEO-001" }))
            .await
            .unwrap();
        let local_id = created.body["id"].as_str().unwrap().to_string();

        h.transport.go_online();
        h.layer
            .put(format!("/items/{local_id}"), json!({ "name": "Geometria 2" }))
            .await
            .unwrap();
        h.layer
            .post("/movements", json!({ "item_id": local_id, "quantity": 2 }))
            .await
            .unwrap();
        assert!(h.transport.sent().is_empty());

        let report = h.reconciler.replay(&CancellationToken::new()).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(
            paths(&h.transport.sent()),
            vec!["POST /items", "PUT /items/srv-1", "POST /movements"]
        );

        // Once the backlog is gone, the caller's provisional id goes straight out as the server's.
        let direct = h
            .layer
            .post("/movements", json!({ "item_id": local_id, "quantity": 1 }))
            .await
            .unwrap();
        assert!(matches!(direct.write, Some(WriteOutcome::Confirmed { .. })));
        let sent = h.transport.sent();
        assert_eq!(sent[3].0.body.as_ref().unwrap()["item_id"], "srv-1");
    }

    #[tokio::test]
    async fn server_errors_keep_the_entry_queued() {
        let h = test_harness(ReplayPolicy::default()).await;
        h.transport.go_offline();
        h.layer.post("/work-orders", json!({ "turbo_code": "X" })).await.unwrap();

        h.transport.go_online();
        h.transport.respond("POST /work-orders", 503, Value::Null);
        let report = h.reconciler.replay(&CancellationToken::new()).await.unwrap();

        assert!(matches!(
            report.failed,
            Some((_, ReplayError::Server { status: 503, .. }))
        ));
        assert_eq!(report.remaining, 1);
    }

    #[tokio::test]
    async fn cancelled_replay_leaves_queue_untouched() {
        let h = test_harness(ReplayPolicy::default()).await;
        h.transport.go_offline();
        h.layer.post("/clients", json!({ "name": "A", "phone": "1" })).await.unwrap();
        h.transport.go_online();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = h.reconciler.replay(&cancel).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.remaining, 1);
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn exhausted_entries_expire() {
        let h = test_harness(ReplayPolicy {
            max_attempts: 1,
            max_age: None,
        })
        .await;
        h.transport.go_offline();
        h.layer.post("/clients", json!({ "name": "A", "phone": "1" })).await.unwrap();

        let failed = h.reconciler.replay(&CancellationToken::new()).await.unwrap();
        assert!(failed.failed.is_some());

        h.transport.go_online();
        let report = h.reconciler.replay(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.expired.len(), 1);
        assert!(report.replayed.is_empty());
        assert_eq!(report.remaining, 0);
        assert!(h.transport.sent().is_empty());
    }
}
