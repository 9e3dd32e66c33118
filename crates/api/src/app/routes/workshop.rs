use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use turboshop_core::{ClientId, WorkOrderId};
use turboshop_workshop::{ClientFilter, NewClient, NewWorkOrder, WorkOrderFilter};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/clients", get(list_clients).post(register_client))
        .route("/clients/:id", get(get_client))
        .route("/work-orders", get(list_work_orders).post(create_work_order))
        .route("/work-orders/:id", get(get_work_order))
        .route("/work-orders/:id/status", post(change_status))
        .route("/work-orders/:id/override", post(override_status))
}

pub async fn register_client(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<NewClient>,
) -> axum::response::Response {
    match services.workshop.register_client(body) {
        Ok(client) => (StatusCode::CREATED, Json(client)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn list_clients(
    Extension(services): Extension<Arc<AppServices>>,
    Query(filter): Query<ClientFilter>,
) -> axum::response::Response {
    match services.workshop.clients(&filter) {
        Ok(clients) => (StatusCode::OK, Json(clients)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn get_client(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ClientId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.workshop.client(id) {
        Ok(client) => (StatusCode::OK, Json(client)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn create_work_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<NewWorkOrder>,
) -> axum::response::Response {
    match services.workshop.create_work_order(body) {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn list_work_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Query(filter): Query<WorkOrderFilter>,
) -> axum::response::Response {
    match services.workshop.list(&filter) {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn get_work_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: WorkOrderId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.workshop.get(id) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn change_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeStatusRequest>,
) -> axum::response::Response {
    let id: WorkOrderId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.workshop.change_status(id, body.status) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

pub async fn override_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::OverrideStatusRequest>,
) -> axum::response::Response {
    let id: WorkOrderId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.workshop.override_status(id, body.status, &body.reason) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
