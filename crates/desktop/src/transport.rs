//! Backend boundary: one request in, status and JSON body out.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::types::{ApiRequest, HttpMethod};

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Error code the backend answers with while a request carrying the same
/// idempotency key is still being processed.
pub const IDEMPOTENCY_IN_PROGRESS: &str = "idempotency_in_progress";

/// Network-level failure. The backend never saw (or never answered) the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// A 4xx that says "not now" rather than "never": request timeout, rate
    /// limiting, or the same idempotency key still in flight.
    pub fn is_retryable(&self) -> bool {
        match self.status {
            408 | 429 => true,
            409 => self.body.get("error").and_then(Value::as_str) == Some(IDEMPOTENCY_IN_PROGRESS),
            _ => false,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &ApiRequest,
        idempotency_key: Option<&str>,
    ) -> Result<TransportResponse, TransportError>;

    /// Cheap reachability check.
    async fn probe(&self) -> bool {
        matches!(
            self.send(&ApiRequest::get("/health"), None).await,
            Ok(resp) if resp.is_success()
        )
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(
        &self,
        request: &ApiRequest,
        idempotency_key: Option<&str>,
    ) -> Result<TransportResponse, TransportError> {
        (**self).send(request, idempotency_key).await
    }

    async fn probe(&self) -> bool {
        (**self).probe().await
    }
}

/// reqwest-backed transport with a bounded per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Unreachable(err.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        idempotency_key: Option<&str>,
    ) -> Result<TransportResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(key) = idempotency_key {
            builder = builder.header(IDEMPOTENCY_KEY_HEADER, key);
        }

        let resp = builder.send().await.map_err(|e| self.classify(e))?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await.map_err(|e| self.classify(e))?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            // Non-JSON bodies (plain-text rejections) are kept as a string.
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn busy_answers_are_retryable_rejections_are_not() {
        let response = |status, body| TransportResponse { status, body };
        assert!(response(409, json!({ "error": IDEMPOTENCY_IN_PROGRESS })).is_retryable());
        assert!(response(429, Value::Null).is_retryable());
        assert!(response(408, Value::Null).is_retryable());
        assert!(!response(409, json!({ "error": "conflict" })).is_retryable());
        assert!(!response(400, json!({ "error": "invalid_quantity" })).is_retryable());
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        // Port 9 (discard) on loopback is closed in test environments.
        let transport = HttpTransport::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = transport.send(&ApiRequest::get("/items"), None).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Unreachable(_) | TransportError::Timeout(_)
        ));
        assert!(!transport.probe().await);
    }
}
