use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use turboshop_core::query::empty_string_as_none;
use turboshop_core::{DomainError, DomainResult, ItemId, MovementId};

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementType {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
        }
    }

    /// +1 for IN, -1 for OUT.
    pub fn sign(&self) -> i64 {
        match self {
            MovementType::In => 1,
            MovementType::Out => -1,
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IN" => Ok(MovementType::In),
            "OUT" => Ok(MovementType::Out),
            other => Err(DomainError::validation(format!(
                "movement_type must be IN or OUT, got '{other}'"
            ))),
        }
    }
}

/// Why stock moved. Each reason is valid only for some movement types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementReason {
    Purchase,
    Return,
    Usage,
    Damaged,
    Lost,
    Correction,
}

impl MovementReason {
    pub const ALL: [MovementReason; 6] = [
        MovementReason::Purchase,
        MovementReason::Return,
        MovementReason::Usage,
        MovementReason::Damaged,
        MovementReason::Lost,
        MovementReason::Correction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Purchase => "purchase",
            MovementReason::Return => "return",
            MovementReason::Usage => "usage",
            MovementReason::Damaged => "damaged",
            MovementReason::Lost => "lost",
            MovementReason::Correction => "correction",
        }
    }

    /// IN: purchase, return, correction. OUT: usage, damaged, lost, correction.
    pub fn is_valid_for(&self, movement_type: MovementType) -> bool {
        match movement_type {
            MovementType::In => matches!(
                self,
                MovementReason::Purchase | MovementReason::Return | MovementReason::Correction
            ),
            MovementType::Out => matches!(
                self,
                MovementReason::Usage
                    | MovementReason::Damaged
                    | MovementReason::Lost
                    | MovementReason::Correction
            ),
        }
    }

    /// Parse a wire reason and check it against the movement type in one step.
    ///
    /// Unknown strings and known-but-mismatched reasons both yield `InvalidReason`.
    pub fn parse_for(movement_type: MovementType, raw: &str) -> DomainResult<MovementReason> {
        let invalid = || DomainError::InvalidReason {
            movement_type: movement_type.to_string(),
            reason: raw.to_string(),
        };

        let reason = Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(invalid)?;

        if reason.is_valid_for(movement_type) {
            Ok(reason)
        } else {
            Err(invalid())
        }
    }
}

impl core::fmt::Display for MovementReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when an OUT movement would leave the item below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegativeStockPolicy {
    /// Record the movement anyway; the item surfaces as `critical`.
    #[default]
    Permit,
    /// Refuse the movement with `InsufficientStock`.
    Reject,
}

impl core::str::FromStr for NegativeStockPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "permit" => Ok(NegativeStockPolicy::Permit),
            "reject" => Ok(NegativeStockPolicy::Reject),
            other => Err(DomainError::validation(format!(
                "negative stock policy must be permit or reject, got '{other}'"
            ))),
        }
    }
}

/// Append-only audit row: one real-world stock change.
///
/// Rows are never updated or deleted after creation.
/// `stock_after - stock_before == signed_quantity()` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub item_id: ItemId,
    pub movement_type: MovementType,
    /// Always positive; direction comes from `movement_type`.
    pub quantity: i64,
    pub reason: MovementReason,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: String,
    pub stock_before: i64,
    pub stock_after: i64,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn signed_quantity(&self) -> i64 {
        self.movement_type.sign() * self.quantity
    }

    /// Snapshot arithmetic matches the signed quantity.
    pub fn is_consistent(&self) -> bool {
        self.quantity > 0 && self.stock_after - self.stock_before == self.signed_quantity()
    }

    pub fn left_negative_stock(&self) -> bool {
        self.stock_after < 0
    }
}

/// Command: record a stock movement against an item.
///
/// `movement_id` and `occurred_at` are supplied by the caller so that deciding
/// the movement stays deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub movement_id: MovementId,
    pub item_id: ItemId,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reason: MovementReason,
    pub reference: Option<String>,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

/// Read filter for the movement history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub item_id: Option<ItemId>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub movement_type: Option<MovementType>,
    /// Defaults to [`MovementFilter::DEFAULT_LIMIT`] when absent.
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub limit: Option<usize>,
}

impl MovementFilter {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn for_item(item_id: ItemId) -> Self {
        Self {
            item_id: Some(item_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, movement: &StockMovement) -> bool {
        self.item_id.is_none_or(|id| movement.item_id == id)
            && self
                .movement_type
                .is_none_or(|t| movement.movement_type == t)
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }
}
