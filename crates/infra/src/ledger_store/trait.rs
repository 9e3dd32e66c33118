use std::sync::Arc;

use thiserror::Error;

use turboshop_core::{DomainError, ExpectedVersion, ItemId};
use turboshop_inventory::{InventoryItem, MovementFilter, StockMovement};

/// Ledger store operation error.
///
/// These are storage and concurrency failures, as opposed to domain validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerStoreError {
    #[error("inventory item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("item code already in use: {0}")]
    DuplicateCode(String),

    /// The compare-and-swap on `current_stock` lost against a concurrent writer.
    #[error("stale stock snapshot: expected {expected}, found {actual}")]
    StaleStock { expected: i64, actual: i64 },

    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("item {0} still has recorded movements")]
    HasMovements(ItemId),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<LedgerStoreError> for DomainError {
    fn from(value: LedgerStoreError) -> Self {
        match value {
            LedgerStoreError::ItemNotFound(id) => DomainError::ItemNotFound(id.to_string()),
            LedgerStoreError::DuplicateCode(code) => {
                DomainError::conflict(format!("item code '{code}' already exists"))
            }
            LedgerStoreError::HasMovements(id) => DomainError::conflict(format!(
                "item {id} has recorded movements; delete with cascade to remove them"
            )),
            LedgerStoreError::StaleStock { .. } | LedgerStoreError::Concurrency(_) => {
                DomainError::conflict(value.to_string())
            }
            LedgerStoreError::InvalidAppend(msg) | LedgerStoreError::Storage(msg) => {
                DomainError::invariant(msg)
            }
        }
    }
}

/// Authoritative table of inventory items and their movement history.
///
/// ## Atomicity
///
/// `append_movement` is the one write path for stock. Implementations must check
/// that the stored `current_stock` still equals `movement.stock_before`, then append
/// the row and move `current_stock` to `movement.stock_after` as a single step.
/// A lost race surfaces as `StaleStock` and leaves both the item and the history
/// untouched.
///
/// ## Ordering
///
/// `movements` returns rows newest first, in reverse append order.
pub trait LedgerStore: Send + Sync {
    /// Insert a new item. Codes are unique across the store.
    fn insert_item(&self, item: InventoryItem) -> Result<(), LedgerStoreError>;

    fn get_item(&self, id: ItemId) -> Result<Option<InventoryItem>, LedgerStoreError>;

    fn find_by_code(&self, code: &str) -> Result<Option<InventoryItem>, LedgerStoreError>;

    fn list_items(&self) -> Result<Vec<InventoryItem>, LedgerStoreError>;

    /// Replace an item's details, guarded by its version.
    ///
    /// The stored `current_stock` always wins over the one carried by `item`.
    fn update_item(
        &self,
        item: InventoryItem,
        expected_version: ExpectedVersion,
    ) -> Result<(), LedgerStoreError>;

    /// Delete an item. Without `cascade`, items with history are refused.
    /// Returns the number of movement rows removed.
    fn delete_item(&self, id: ItemId, cascade: bool) -> Result<usize, LedgerStoreError>;

    /// Append a movement and update the item's stock atomically.
    ///
    /// Returns the item as committed.
    fn append_movement(&self, movement: StockMovement) -> Result<InventoryItem, LedgerStoreError>;

    fn movements(&self, filter: &MovementFilter) -> Result<Vec<StockMovement>, LedgerStoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn insert_item(&self, item: InventoryItem) -> Result<(), LedgerStoreError> {
        (**self).insert_item(item)
    }

    fn get_item(&self, id: ItemId) -> Result<Option<InventoryItem>, LedgerStoreError> {
        (**self).get_item(id)
    }

    fn find_by_code(&self, code: &str) -> Result<Option<InventoryItem>, LedgerStoreError> {
        (**self).find_by_code(code)
    }

    fn list_items(&self) -> Result<Vec<InventoryItem>, LedgerStoreError> {
        (**self).list_items()
    }

    fn update_item(
        &self,
        item: InventoryItem,
        expected_version: ExpectedVersion,
    ) -> Result<(), LedgerStoreError> {
        (**self).update_item(item, expected_version)
    }

    fn delete_item(&self, id: ItemId, cascade: bool) -> Result<usize, LedgerStoreError> {
        (**self).delete_item(id, cascade)
    }

    fn append_movement(&self, movement: StockMovement) -> Result<InventoryItem, LedgerStoreError> {
        (**self).append_movement(movement)
    }

    fn movements(&self, filter: &MovementFilter) -> Result<Vec<StockMovement>, LedgerStoreError> {
        (**self).movements(filter)
    }
}
