//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Connectivity and storage concerns belong to the
/// crates that own those boundaries.
///
/// Validation-class errors (`InvalidQuantity`, `InvalidReason`,
/// `InvalidTransition`, `Validation`) must be surfaced to the caller as-is:
/// retrying a logically invalid operation cannot succeed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The referenced inventory item does not exist.
    #[error("inventory item not found: {0}")]
    ItemNotFound(String),

    /// The referenced work order does not exist.
    #[error("work order not found: {0}")]
    WorkOrderNotFound(String),

    /// The referenced client does not exist.
    #[error("client not found: {0}")]
    ClientNotFound(String),

    /// A movement quantity was zero or negative.
    #[error("invalid quantity {0}: must be a positive integer")]
    InvalidQuantity(i64),

    /// A movement reason does not belong to the reason set of its type.
    #[error("reason '{reason}' is not valid for {movement_type} movements")]
    InvalidReason {
        movement_type: String,
        reason: String,
    },

    /// An OUT movement would drive stock below zero while the reject policy is active.
    #[error("insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i64, requested: i64 },

    /// A work-order status change is not an edge of the state machine.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Work-order number allocation kept colliding beyond the retry bound.
    #[error("could not allocate a unique work sequence after {attempts} attempts")]
    SequenceConflict { attempts: u32 },

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A conflict occurred (duplicate code, stale version, ...).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_transition(from: impl core::fmt::Display, to: impl core::fmt::Display) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// True for not-found variants of any entity.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ItemNotFound(_) | Self::WorkOrderNotFound(_) | Self::ClientNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_renders_both_states() {
        let err = DomainError::invalid_transition("FINALIZED", "DRAFT");
        assert_eq!(
            err.to_string(),
            "invalid status transition from FINALIZED to DRAFT"
        );
    }

    #[test]
    fn not_found_covers_every_entity() {
        assert!(DomainError::ItemNotFound("x".into()).is_not_found());
        assert!(DomainError::WorkOrderNotFound("x".into()).is_not_found());
        assert!(DomainError::ClientNotFound("x".into()).is_not_found());
        assert!(!DomainError::InvalidQuantity(0).is_not_found());
    }
}
