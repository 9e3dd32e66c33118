//! `Idempotency-Key` handling for write requests.
//!
//! A `POST` or `PUT` carrying the header is executed once per
//! `(method, path, key)`. A successful response is cached and replayed for
//! repeats within the TTL, marked with `Idempotent-Replay: true`. Failed
//! responses are not cached, so a rejected write can be retried with the same key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::app::errors;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const IDEMPOTENT_REPLAY_HEADER: &str = "idempotent-replay";

/// Cached bodies larger than this are passed through uncached.
const MAX_CACHED_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
struct CachedResponse {
    status: StatusCode,
    content_type: Option<HeaderValue>,
    body: Bytes,
    stored_at: Instant,
}

#[derive(Debug)]
enum Slot {
    InFlight(Instant),
    Done(CachedResponse),
}

#[derive(Debug)]
pub struct IdempotencyStore {
    ttl: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

enum Claim {
    Replay(CachedResponse),
    Busy,
    Claimed,
}

impl IdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // The map holds no invariants a panicking writer could break.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn claim(&self, key: &str) -> Claim {
        let mut slots = self.slots();
        let now = Instant::now();
        slots.retain(|_, slot| match slot {
            Slot::InFlight(at) => now.duration_since(*at) < self.ttl,
            Slot::Done(cached) => now.duration_since(cached.stored_at) < self.ttl,
        });

        match slots.get(key) {
            Some(Slot::Done(cached)) => Claim::Replay(cached.clone()),
            Some(Slot::InFlight(_)) => Claim::Busy,
            None => {
                slots.insert(key.to_string(), Slot::InFlight(now));
                Claim::Claimed
            }
        }
    }

    fn complete(&self, key: &str, cached: Option<CachedResponse>) {
        let mut slots = self.slots();
        match cached {
            Some(cached) => {
                slots.insert(key.to_string(), Slot::Done(cached));
            }
            None => {
                slots.remove(key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub async fn idempotency_middleware(
    State(store): State<Arc<IdempotencyStore>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !matches!(*req.method(), Method::POST | Method::PUT) {
        return next.run(req).await;
    }
    let Some(raw_key) = req
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
    else {
        return next.run(req).await;
    };

    let key = format!("{} {} {}", req.method(), req.uri().path(), raw_key);

    match store.claim(&key) {
        Claim::Replay(cached) => {
            tracing::debug!(%key, "replaying idempotent response");
            return replay(cached);
        }
        Claim::Busy => {
            return errors::json_error(
                StatusCode::CONFLICT,
                "idempotency_in_progress",
                "a request with this Idempotency-Key is still being processed",
            );
        }
        Claim::Claimed => {}
    }

    let response = next.run(req).await;
    if !response.status().is_success() {
        store.complete(&key, None);
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(%key, error = %e, "response body could not be buffered for idempotency");
            store.complete(&key, None);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    store.complete(
        &key,
        Some(CachedResponse {
            status: parts.status,
            content_type: parts.headers.get(header::CONTENT_TYPE).cloned(),
            body: bytes.clone(),
            stored_at: Instant::now(),
        }),
    );
    Response::from_parts(parts, Body::from(bytes))
}

fn replay(cached: CachedResponse) -> Response {
    let mut response = Response::new(Body::from(cached.body));
    *response.status_mut() = cached.status;
    if let Some(content_type) = cached.content_type {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    response
        .headers_mut()
        .insert(IDEMPOTENT_REPLAY_HEADER, HeaderValue::from_static("true"));
    response
}
