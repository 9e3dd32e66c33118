//! Request/response shapes shared by the interceptor, the queue and replay.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Prefix of identities synthesized while offline.
pub const PROVISIONAL_ID_PREFIX: &str = "local-";

pub fn provisional_id() -> String {
    format!("{PROVISIONAL_ID_PREFIX}{}", Uuid::now_v7())
}

pub fn is_provisional_id(id: &str) -> bool {
    id.starts_with(PROVISIONAL_ID_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    /// Writes that may be applied provisionally and queued.
    pub fn is_queueable(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache identity of a request: method, path and query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(method: HttpMethod, path_and_query: &str) -> Self {
        Self(format!("{method} {path_and_query}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RequestKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One outbound call. `path` includes the query string, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Put,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Delete,
            path: path.into(),
            body: None,
        }
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method, &self.path)
    }

    /// Path without the query string.
    pub fn route_path(&self) -> &str {
        self.path.split('?').next().unwrap_or_default()
    }

    /// Provisional identities named in the path, the query or any string of
    /// the body, in order of appearance and without duplicates.
    pub fn provisional_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        let mut push = |candidate: &str| {
            if is_provisional_id(candidate) && !ids.iter().any(|id| id == candidate) {
                ids.push(candidate.to_string());
            }
        };
        for segment in self.path.split(['/', '?', '&', '=']) {
            push(segment);
        }
        if let Some(body) = &self.body {
            visit_strings(body, &mut push);
        }
        ids
    }

    pub fn references_provisional_id(&self) -> bool {
        !self.provisional_ids().is_empty()
    }

    /// Replace every occurrence of `old` in the path and the body.
    pub fn remap_identity(&mut self, old: &str, new: &str) {
        self.path = self.path.replace(old, new);
        if let Some(body) = &mut self.body {
            replace_strings(body, old, new);
        }
    }
}

fn visit_strings(value: &Value, visit: &mut impl FnMut(&str)) {
    match value {
        Value::String(s) => visit(s),
        Value::Array(items) => items.iter().for_each(|v| visit_strings(v, visit)),
        Value::Object(map) => map.values().for_each(|v| visit_strings(v, visit)),
        _ => {}
    }
}

fn replace_strings(value: &mut Value, old: &str, new: &str) {
    match value {
        Value::String(s) if s.contains(old) => *s = s.replace(old, new),
        Value::Array(items) => items.iter_mut().for_each(|v| replace_strings(v, old, new)),
        Value::Object(map) => map.values_mut().for_each(|v| replace_strings(v, old, new)),
        _ => {}
    }
}

/// Where the body of an [`ApiResponse`] came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache { cached_at: DateTime<Utc> },
    OfflineDefault,
    Provisional,
}

/// Result of a write, as a two-phase protocol: accepted locally, then
/// confirmed or rejected by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// Applied locally and queued for replay.
    Provisional {
        mutation_id: Uuid,
        provisional_id: Option<String>,
    },
    /// Acknowledged by the backend.
    Confirmed { server_id: Option<String> },
    /// Rejected by the backend; the local provisional state must be corrected.
    Conflicted { status: u16, body: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    /// `true` when the body was not produced by the backend just now.
    pub offline: bool,
    pub source: ResponseSource,
    /// Set for POST/PUT.
    pub write: Option<WriteOutcome>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self.write, Some(WriteOutcome::Provisional { .. }))
    }
}

/// A write accepted while offline, waiting for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMutation {
    pub id: Uuid,
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
    /// Identity handed to the caller for a POST; replaced by the server's on replay.
    pub provisional_id: Option<String>,
    /// Sent as `Idempotency-Key` so a replay retried after a lost ack is deduplicated.
    pub idempotency_key: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingMutation {
    pub fn new(
        method: HttpMethod,
        path: impl Into<String>,
        body: Option<Value>,
        provisional_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::now_v7();
        Self {
            id,
            method,
            path: path.into(),
            body,
            provisional_id,
            idempotency_key: id.to_string(),
            attempts: 0,
            last_error: None,
            created_at: now,
        }
    }

    pub fn request(&self) -> ApiRequest {
        ApiRequest {
            method: self.method,
            path: self.path.clone(),
            body: self.body.clone(),
        }
    }
}

/// Connectivity state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Online,
    Offline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_key_includes_method_path_and_query() {
        let req = ApiRequest::get("/items?search=geo");
        assert_eq!(req.key().as_str(), "GET /items?search=geo");
        assert_eq!(req.route_path(), "/items");
    }

    #[test]
    fn provisional_ids_are_detected_in_paths() {
        let id = provisional_id();
        assert!(is_provisional_id(&id));
        assert!(ApiRequest::put(format!("/items/{id}"), Value::Null).references_provisional_id());
        assert!(ApiRequest::get(format!("/movements?item_id={id}")).references_provisional_id());
        assert!(!ApiRequest::get("/items").references_provisional_id());
    }

    #[test]
    fn provisional_ids_are_detected_in_nested_bodies() {
        let request = ApiRequest::post(
            "/movements",
            serde_json::json!({ "item_id": "local-a", "lines": [{ "ref": "local-b" }, { "ref": "local-a" }] }),
        );
        assert_eq!(request.provisional_ids(), vec!["local-a", "local-b"]);
        assert!(
            !ApiRequest::post("/clients", serde_json::json!({ "name": "A" })).references_provisional_id()
        );
    }

    #[test]
    fn remap_rewrites_path_and_body() {
        let mut request = ApiRequest::put(
            "/items/local-a",
            serde_json::json!({ "item_id": "local-a", "quantity": 2 }),
        );
        request.remap_identity("local-a", "0192");
        assert_eq!(request.path, "/items/0192");
        assert_eq!(request.body.unwrap()["item_id"], "0192");
    }

    #[test]
    fn only_post_and_put_are_queueable() {
        assert!(HttpMethod::Post.is_queueable());
        assert!(HttpMethod::Put.is_queueable());
        assert!(!HttpMethod::Delete.is_queueable());
        assert!(!HttpMethod::Patch.is_queueable());
        assert_eq!(HttpMethod::parse("put"), Some(HttpMethod::Put));
    }
}
