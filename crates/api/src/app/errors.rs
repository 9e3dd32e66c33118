use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use turboshop_core::DomainError;

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        DomainError::ItemNotFound(_)
        | DomainError::WorkOrderNotFound(_)
        | DomainError::ClientNotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        DomainError::InvalidQuantity(_) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_quantity", message)
        }
        DomainError::InvalidReason { .. } => {
            json_error(StatusCode::BAD_REQUEST, "invalid_reason", message)
        }
        DomainError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        DomainError::InvalidId(_) => json_error(StatusCode::BAD_REQUEST, "invalid_id", message),
        DomainError::InsufficientStock { .. } => {
            json_error(StatusCode::CONFLICT, "insufficient_stock", message)
        }
        DomainError::SequenceConflict { .. } => {
            json_error(StatusCode::CONFLICT, "sequence_conflict", message)
        }
        DomainError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        DomainError::InvalidTransition { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_transition", message)
        }
        DomainError::InvariantViolation(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", message)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classes_map_to_distinct_statuses() {
        let cases = [
            (DomainError::ItemNotFound("x".into()), StatusCode::NOT_FOUND),
            (DomainError::InvalidQuantity(0), StatusCode::BAD_REQUEST),
            (
                DomainError::invalid_transition("FINALIZED", "DRAFT"),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (DomainError::conflict("dup"), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }
}
