//! Workshop domain module.
//!
//! Work orders, their status lifecycle and the clients they belong to,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod client;
pub mod reference;
pub mod work_order;

pub use client::{Client, ClientFilter, NewClient};
pub use reference::{CAR_MAKES, WORK_PROCESSES, WorkProcess};
pub use work_order::{
    NewWorkOrder, StatusChange, WorkOrder, WorkOrderCommand, WorkOrderFilter, WorkOrderStatus,
    format_work_number,
};
