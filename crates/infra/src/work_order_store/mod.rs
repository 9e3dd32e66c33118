//! Work-order persistence boundary.
//!
//! The store, not the sequencer, owns the uniqueness of `work_sequence`.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryWorkOrderStore;
pub use r#trait::{WorkOrderStore, WorkOrderStoreError};
