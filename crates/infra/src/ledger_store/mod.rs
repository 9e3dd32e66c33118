//! Ledger store boundary.
//!
//! Holds inventory items together with their append-only movement history and
//! guarantees that a movement row and the matching `current_stock` update are
//! committed together or not at all.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use r#trait::{LedgerStore, LedgerStoreError};
