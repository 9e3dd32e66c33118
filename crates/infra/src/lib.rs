//! Infrastructure layer: stores and the services that orchestrate them.

pub mod client_store;
pub mod ledger_store;
pub mod sequencer;
pub mod stock_engine;
pub mod work_order_store;

pub use client_store::{ClientStore, InMemoryClientStore};
pub use ledger_store::{InMemoryLedgerStore, LedgerStore, LedgerStoreError};
pub use sequencer::{SequencerConfig, WorkOrderSequencer, WorkOrderView};
pub use stock_engine::{
    ItemView, LedgerAudit, LedgerConfig, MovementOutcome, MovementRequest, StockMovementEngine,
    default_items,
};
pub use work_order_store::{InMemoryWorkOrderStore, WorkOrderStore, WorkOrderStoreError};
