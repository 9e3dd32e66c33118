//! Offline interception layer.
//!
//! Sits between the application and the backend:
//!
//! - GET: network with a bounded timeout, cached on success; on a network
//!   failure the cached body, else the route's offline default.
//! - POST/PUT: network, passed through on success; on a network failure a
//!   provisional identity is synthesized, the write is queued, and a
//!   success-shaped response tagged `offline` is returned. Writes skip the
//!   network and queue directly while earlier writes are still queued, or
//!   while they name a provisional identity the backend has not issued.
//! - DELETE and anything else: fail closed with [`OfflineError::NotApplied`].
//!
//! Provisional identities that replay already confirmed are swapped for the
//! server's before any of this. Connectivity errors never escape for
//! GET/POST/PUT. Backend answers, including 4xx/5xx, are passed through as
//! they are.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::cache::ReadCache;
use crate::error::{OfflineError, OfflineResult};
use crate::mutation_queue::MutationQueue;
use crate::offline::Connectivity;
use crate::routes::OfflineDefaults;
use crate::transport::{Transport, TransportError, TransportResponse};
use crate::types::{
    ApiRequest, ApiResponse, HttpMethod, PendingMutation, ResponseSource, WriteOutcome,
    provisional_id,
};

#[derive(Debug)]
pub struct OfflineInterceptor<T> {
    transport: T,
    cache: ReadCache,
    queue: MutationQueue,
    defaults: OfflineDefaults,
    connectivity: Arc<Connectivity>,
}

impl<T: Transport> OfflineInterceptor<T> {
    /// Fails if `defaults` does not cover every route.
    pub fn new(
        transport: T,
        cache: ReadCache,
        queue: MutationQueue,
        defaults: OfflineDefaults,
        connectivity: Arc<Connectivity>,
    ) -> OfflineResult<Self> {
        defaults.validate()?;
        Ok(Self {
            transport,
            cache,
            queue,
            defaults,
            connectivity,
        })
    }

    pub fn connectivity(&self) -> &Arc<Connectivity> {
        &self.connectivity
    }

    pub fn cache(&self) -> &ReadCache {
        &self.cache
    }

    pub fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    pub async fn request(&self, mut request: ApiRequest) -> OfflineResult<ApiResponse> {
        self.resolve_identities(&mut request).await?;
        match request.method {
            HttpMethod::Get => self.read(request).await,
            method if method.is_queueable() => self.write(request).await,
            _ => self.fail_closed(request).await,
        }
    }

    pub async fn get(&self, path: impl Into<String>) -> OfflineResult<ApiResponse> {
        self.request(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: impl Into<String>, body: Value) -> OfflineResult<ApiResponse> {
        self.request(ApiRequest::post(path, body)).await
    }

    pub async fn put(&self, path: impl Into<String>, body: Value) -> OfflineResult<ApiResponse> {
        self.request(ApiRequest::put(path, body)).await
    }

    pub async fn delete(&self, path: impl Into<String>) -> OfflineResult<ApiResponse> {
        self.request(ApiRequest::delete(path)).await
    }

    async fn resolve_identities(&self, request: &mut ApiRequest) -> OfflineResult<()> {
        for provisional in request.provisional_ids() {
            if let Some(server) = self.queue.db().resolve_identity(&provisional).await? {
                tracing::debug!(provisional_id = %provisional, server_id = %server, "resolved provisional identity");
                request.remap_identity(&provisional, &server);
            }
        }
        Ok(())
    }

    /// Why a write has to queue behind the backlog instead of going out now.
    async fn queue_reason(&self, request: &ApiRequest) -> OfflineResult<Option<String>> {
        if request.references_provisional_id() {
            return Ok(Some(format!(
                "{} references an identity not yet known to the backend",
                request.path
            )));
        }
        let queued = self.queue.len().await?;
        if queued > 0 {
            return Ok(Some(format!("{queued} earlier writes still queued")));
        }
        Ok(None)
    }

    /// A request naming a provisional identity cannot be answered by the
    /// backend yet, so it skips the network.
    async fn send(&self, request: &ApiRequest) -> Result<TransportResponse, TransportError> {
        if request.references_provisional_id() {
            return Err(TransportError::InvalidRequest(format!(
                "{} references an identity not yet known to the backend",
                request.path
            )));
        }
        match self.transport.send(request, None).await {
            Ok(resp) => {
                self.connectivity.mark_online();
                Ok(resp)
            }
            Err(e) => {
                if !matches!(e, TransportError::InvalidRequest(_)) {
                    self.connectivity.mark_offline();
                }
                Err(e)
            }
        }
    }

    async fn read(&self, request: ApiRequest) -> OfflineResult<ApiResponse> {
        let key = request.key();
        let error = match self.send(&request).await {
            Ok(resp) => {
                if resp.is_success() {
                    self.cache.put(&key, &resp.body).await?;
                }
                return Ok(ApiResponse {
                    status: resp.status,
                    body: resp.body,
                    offline: false,
                    source: ResponseSource::Network,
                    write: None,
                });
            }
            Err(e) => e,
        };

        if let Some(entry) = self.cache.get(&key).await? {
            tracing::debug!(%key, %error, "serving cached response");
            return Ok(ApiResponse {
                status: 200,
                body: entry.body,
                offline: true,
                source: ResponseSource::Cache {
                    cached_at: entry.cached_at,
                },
                write: None,
            });
        }

        tracing::debug!(%key, %error, "serving offline default");
        Ok(ApiResponse {
            status: 200,
            body: self.defaults.for_path(&request.path),
            offline: true,
            source: ResponseSource::OfflineDefault,
            write: None,
        })
    }

    async fn write(&self, request: ApiRequest) -> OfflineResult<ApiResponse> {
        let reason = match self.queue_reason(&request).await? {
            Some(reason) => reason,
            None => match self.send(&request).await {
                Ok(resp) => {
                    let write = if resp.is_success() {
                        WriteOutcome::Confirmed {
                            server_id: entity_id(&resp.body),
                        }
                    } else {
                        WriteOutcome::Conflicted {
                            status: resp.status,
                            body: resp.body.clone(),
                        }
                    };
                    return Ok(ApiResponse {
                        status: resp.status,
                        body: resp.body,
                        offline: false,
                        source: ResponseSource::Network,
                        write: Some(write),
                    });
                }
                Err(e) => e.to_string(),
            },
        };

        let (status, provisional, body) = match request.method {
            HttpMethod::Post => {
                let id = provisional_id();
                let body = with_id(request.body.clone(), &id);
                (201, Some(id), body)
            }
            _ => {
                let id = request.route_path().rsplit('/').next().unwrap_or_default().to_string();
                (200, None, with_id(request.body.clone(), &id))
            }
        };

        let mutation = PendingMutation::new(
            request.method,
            request.path.clone(),
            request.body.clone(),
            provisional.clone(),
            Utc::now(),
        );
        self.queue.enqueue(&mutation).await?;
        tracing::info!(
            mutation_id = %mutation.id,
            provisional_id = ?provisional,
            %reason,
            "write accepted provisionally"
        );

        Ok(ApiResponse {
            status,
            body,
            offline: true,
            source: ResponseSource::Provisional,
            write: Some(WriteOutcome::Provisional {
                mutation_id: mutation.id,
                provisional_id: provisional,
            }),
        })
    }

    /// Deletes are never queued, and must not overtake queued writes either.
    async fn fail_closed(&self, request: ApiRequest) -> OfflineResult<ApiResponse> {
        let error = match self.queue_reason(&request).await? {
            Some(reason) => reason,
            None => match self.send(&request).await {
                Ok(resp) => {
                    return Ok(ApiResponse {
                        status: resp.status,
                        body: resp.body,
                        offline: false,
                        source: ResponseSource::Network,
                        write: None,
                    });
                }
                Err(e) => e.to_string(),
            },
        };
        tracing::warn!(method = %request.method, path = %request.path, %error, "write not applied while offline");
        Err(OfflineError::NotApplied {
            method: request.method.to_string(),
            path: request.path,
        })
    }
}

/// `id` field of a JSON object response, if it is a string.
pub(crate) fn entity_id(body: &Value) -> Option<String> {
    body.get("id").and_then(Value::as_str).map(str::to_string)
}

fn with_id(body: Option<Value>, id: &str) -> Value {
    match body {
        Some(Value::Object(mut map)) => {
            map.insert("id".to_string(), Value::String(id.to_string()));
            Value::Object(map)
        }
        Some(other) => other,
        None => serde_json::json!({ "id": id }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseLocation;
    use crate::db::LocalDb;
    use crate::testing::FakeTransport;
    use crate::types::{ConnectivityState, is_provisional_id};
    use serde_json::json;

    async fn test_interceptor(transport: FakeTransport) -> OfflineInterceptor<FakeTransport> {
        let db = LocalDb::open(&DatabaseLocation::InMemory).await.unwrap();
        OfflineInterceptor::new(
            transport,
            ReadCache::open(db.clone(), "test").await.unwrap(),
            MutationQueue::new(db),
            OfflineDefaults::standard(),
            Arc::new(Connectivity::default()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn get_falls_back_to_last_cached_response() {
        let transport = FakeTransport::new();
        transport.respond("GET /items", 200, json!([{ "id": "a" }]));
        let layer = test_interceptor(transport.clone()).await;

        let online = layer.get("/items").await.unwrap();
        assert!(!online.offline);

        transport.go_offline();
        let offline = layer.get("/items").await.unwrap();
        assert!(offline.offline);
        assert!(matches!(offline.source, ResponseSource::Cache { .. }));
        assert_eq!(offline.body, json!([{ "id": "a" }]));
        assert_eq!(layer.connectivity().state(), ConnectivityState::Offline);
    }

    #[tokio::test]
    async fn get_without_cache_returns_tagged_default() {
        let transport = FakeTransport::new();
        transport.go_offline();
        let layer = test_interceptor(transport).await;

        let items = layer.get("/items").await.unwrap();
        assert_eq!(items.body, json!([]));
        assert!(items.offline);
        assert_eq!(items.source, ResponseSource::OfflineDefault);

        let makes = layer.get("/car-makes").await.unwrap();
        assert!(!makes.body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_post_synthesizes_identity_and_queues() {
        let transport = FakeTransport::new();
        transport.go_offline();
        let layer = test_interceptor(transport).await;

        let resp = layer
            .post("/items", json!({ "name": "Geometria", "code": "GEO-001" }))
            .await
            .unwrap();

        assert_eq!(resp.status, 201);
        assert!(resp.offline);
        assert!(resp.is_provisional());
        let id = resp.body["id"].as_str().unwrap();
        assert!(is_provisional_id(id));
        assert_eq!(resp.body["code"], "GEO-001");

        let queued = layer.queue().pending().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].provisional_id.as_deref(), Some(id));
        assert_eq!(queued[0].body.as_ref().unwrap().get("id"), None);
    }

    #[tokio::test]
    async fn online_rejection_is_passed_through_not_queued() {
        let transport = FakeTransport::new();
        transport.respond("POST /movements", 400, json!({ "error": "invalid_reason" }));
        let layer = test_interceptor(transport).await;

        let resp = layer.post("/movements", json!({})).await.unwrap();
        assert_eq!(resp.status, 400);
        assert!(matches!(resp.write, Some(WriteOutcome::Conflicted { status: 400, .. })));
        assert!(layer.queue().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn writes_against_provisional_ids_are_queued_without_network() {
        let transport = FakeTransport::new();
        let layer = test_interceptor(transport.clone()).await;

        let resp = layer
            .put("/items/local-0192", json!({ "name": "renamed" }))
            .await
            .unwrap();
        assert!(resp.is_provisional());
        assert_eq!(resp.body["id"], "local-0192");
        assert!(transport.sent().is_empty());
        // An identity the backend does not know yet says nothing about connectivity.
        assert_eq!(layer.connectivity().state(), ConnectivityState::Online);
    }

    #[tokio::test]
    async fn online_write_naming_a_queued_create_waits_behind_it() {
        let transport = FakeTransport::new();
        transport.go_offline();
        let layer = test_interceptor(transport.clone()).await;
        let created = layer
            .post("/items", json!({ "name": "Geometria", "code": "GEO-001" }))
            .await
            .unwrap();
        let local_id = created.body["id"].as_str().unwrap().to_string();

        transport.go_online();
        let movement = layer
            .post(
                "/movements",
                json!({ "item_id": local_id, "movement_type": "IN", "quantity": 3, "reason": "purchase" }),
            )
            .await
            .unwrap();

        assert!(movement.is_provisional());
        assert!(transport.sent().is_empty());
        let queued = layer.queue().pending().await.unwrap();
        let paths: Vec<&str> = queued.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["/items", "/movements"]);
    }

    #[tokio::test]
    async fn online_write_does_not_overtake_queued_writes() {
        let transport = FakeTransport::new();
        transport.go_offline();
        let layer = test_interceptor(transport.clone()).await;
        layer.put("/items/0192", json!({ "name": "older" })).await.unwrap();

        transport.go_online();
        let newer = layer.put("/items/0192", json!({ "name": "newer" })).await.unwrap();
        assert!(newer.is_provisional());
        assert!(transport.sent().is_empty());

        let err = layer.delete("/items/0192").await.unwrap_err();
        assert!(err.is_not_applied());
        assert!(transport.sent().is_empty());

        let names: Vec<Value> = layer
            .queue()
            .pending()
            .await
            .unwrap()
            .iter()
            .map(|m| m.body.as_ref().unwrap()["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("older"), json!("newer")]);
    }

    #[tokio::test]
    async fn confirmed_provisional_ids_are_resolved_before_sending() {
        let transport = FakeTransport::new();
        let layer = test_interceptor(transport.clone()).await;
        layer.queue().db().record_identity("local-0192", "srv-7").await.unwrap();

        let resp = layer
            .post(
                "/movements",
                json!({ "item_id": "local-0192", "movement_type": "IN", "quantity": 1, "reason": "purchase" }),
            )
            .await
            .unwrap();

        assert!(matches!(resp.write, Some(WriteOutcome::Confirmed { .. })));
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.body.as_ref().unwrap()["item_id"], "srv-7");
    }

    #[tokio::test]
    async fn offline_delete_fails_closed() {
        let transport = FakeTransport::new();
        transport.go_offline();
        let layer = test_interceptor(transport).await;

        let err = layer.delete("/items/abc").await.unwrap_err();
        assert!(err.is_not_applied());
        assert!(err.to_string().contains("deferred, not deleted"));
        assert!(layer.queue().is_empty().await.unwrap());
    }
}
