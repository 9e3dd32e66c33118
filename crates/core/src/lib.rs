//! `turboshop-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the ledger and
//! work-order crates (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod query;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{ClientId, ItemId, MovementId, WorkOrderId};
