use axum::{Router, routing::get};

pub mod inventory;
pub mod system;
pub mod workshop;

/// Router for all business endpoints.
pub fn router() -> Router {
    Router::new()
        .merge(inventory::router())
        .merge(workshop::router())
        .route("/car-makes", get(system::car_makes))
        .route("/work-processes", get(system::work_processes))
}
