//! In-process transport double for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::transport::{Transport, TransportError, TransportResponse};
use crate::types::{ApiRequest, HttpMethod};

#[derive(Debug, Default)]
struct FakeState {
    offline: bool,
    /// Go offline once this many requests have been answered.
    offline_after: Option<usize>,
    responses: HashMap<String, (u16, Value)>,
    sent: Vec<(ApiRequest, Option<String>)>,
    next_id: u64,
}

/// Answers from a fixed table; unknown writes echo the body with a
/// server-assigned `id` (`srv-1`, `srv-2`, ...).
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, key: &str, status: u16, body: Value) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert(key.to_string(), (status, body));
    }

    pub(crate) fn forget(&self, key: &str) {
        self.state.lock().unwrap().responses.remove(key);
    }

    pub(crate) fn go_offline(&self) {
        self.state.lock().unwrap().offline = true;
    }

    pub(crate) fn go_online(&self) {
        let mut state = self.state.lock().unwrap();
        state.offline = false;
        state.offline_after = None;
    }

    pub(crate) fn offline_after(&self, answered: usize) {
        let mut state = self.state.lock().unwrap();
        state.offline_after = Some(state.sent.len() + answered);
    }

    /// Requests that reached the "backend", with their idempotency keys.
    pub(crate) fn sent(&self) -> Vec<(ApiRequest, Option<String>)> {
        self.state.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        idempotency_key: Option<&str>,
    ) -> Result<TransportResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.offline || state.offline_after.is_some_and(|n| state.sent.len() >= n) {
            return Err(TransportError::Unreachable("connection refused".into()));
        }
        state
            .sent
            .push((request.clone(), idempotency_key.map(str::to_string)));

        let key = format!("{} {}", request.method, request.path);
        if let Some((status, body)) = state.responses.get(&key) {
            return Ok(TransportResponse {
                status: *status,
                body: body.clone(),
            });
        }

        let (status, body) = match request.method {
            HttpMethod::Post => {
                state.next_id += 1;
                let mut body = request.body.clone().unwrap_or_else(|| json!({}));
                if let Value::Object(map) = &mut body {
                    map.insert("id".into(), json!(format!("srv-{}", state.next_id)));
                }
                (201, body)
            }
            HttpMethod::Get => (200, json!([])),
            _ => (200, request.body.clone().unwrap_or(Value::Null)),
        };
        Ok(TransportResponse { status, body })
    }
}
