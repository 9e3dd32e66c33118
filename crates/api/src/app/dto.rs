use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use turboshop_core::DomainError;
use turboshop_infra::MovementRequest;
use turboshop_inventory::{MovementReason, MovementType};
use turboshop_workshop::WorkOrderStatus;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /movements`. Type and reason arrive as strings so that an
/// unknown or mismatched reason is reported as `invalid_reason`.
#[derive(Debug, Deserialize)]
pub struct RecordMovementRequest {
    pub item_id: String,
    pub movement_type: String,
    pub quantity: i64,
    pub reason: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: String,
}

impl RecordMovementRequest {
    pub fn into_request(self) -> Result<MovementRequest, DomainError> {
        let movement_type: MovementType = self.movement_type.parse()?;
        let reason = MovementReason::parse_for(movement_type, &self.reason)?;
        Ok(MovementRequest {
            item_id: self.item_id.trim().parse()?,
            movement_type,
            quantity: self.quantity,
            reason,
            reference: self.reference.filter(|r| !r.trim().is_empty()),
            notes: self.notes,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteItemQuery {
    #[serde(default)]
    pub cascade: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: WorkOrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct OverrideStatusRequest {
    pub status: WorkOrderStatus,
    pub reason: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct CarMakeResponse {
    pub name: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: core::str::FromStr<Err = DomainError>,
{
    raw.trim().parse().map_err(|e: DomainError| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string())
    })
}
