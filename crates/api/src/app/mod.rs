//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store and engine wiring
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request/response DTOs and parsing helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use anyhow::Context;
use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::config::ApiConfig;
use crate::middleware::{self, IdempotencyStore};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(config: &ApiConfig) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(config).context("failed to build services")?);
    let idempotency = Arc::new(IdempotencyStore::new(config.idempotency_ttl));

    let api = routes::router().layer(
        ServiceBuilder::new()
            .layer(Extension(services))
            .layer(axum::middleware::from_fn_with_state(
                idempotency,
                middleware::idempotency_middleware,
            )),
    );

    Ok(Router::new()
        .route("/health", get(routes::system::health))
        .merge(api))
}
