use axum::Json;

use turboshop_workshop::{CAR_MAKES, WORK_PROCESSES, WorkProcess};

use crate::app::dto::{CarMakeResponse, HealthResponse};

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn car_makes() -> Json<Vec<CarMakeResponse>> {
    Json(
        CAR_MAKES
            .iter()
            .map(|&name| CarMakeResponse { name })
            .collect(),
    )
}

pub async fn work_processes() -> Json<&'static [WorkProcess]> {
    Json(WORK_PROCESSES)
}
