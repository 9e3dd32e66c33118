//! Inventory ledger domain module.
//!
//! This crate contains the business rules of the stock ledger, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage):
//!
//! - every stock change is an append-only [`StockMovement`]
//! - [`InventoryItem::current_stock`] is a cache of the signed movement sum
//! - [`StockStatus`] is derived on read, never stored

pub mod dashboard;
pub mod item;
pub mod movement;

pub use dashboard::{Dashboard, compute_dashboard, RECENT_MOVEMENT_WINDOW_DAYS};
pub use item::{
    Category, InventoryCommand, InventoryItem, ItemFilter, ItemPatch, NewItem, StockStatus,
};
pub use movement::{
    MovementFilter, MovementReason, MovementType, NegativeStockPolicy, RecordMovement,
    StockMovement,
};
