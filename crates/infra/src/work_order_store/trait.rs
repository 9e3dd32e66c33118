use std::sync::Arc;

use thiserror::Error;

use turboshop_core::{DomainError, ExpectedVersion, WorkOrderId};
use turboshop_workshop::WorkOrder;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkOrderStoreError {
    /// Unique constraint on `work_sequence` fired.
    #[error("work sequence {0} is already taken")]
    DuplicateSequence(u64),

    #[error("work order not found: {0}")]
    NotFound(WorkOrderId),

    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<WorkOrderStoreError> for DomainError {
    fn from(value: WorkOrderStoreError) -> Self {
        match value {
            WorkOrderStoreError::NotFound(id) => DomainError::WorkOrderNotFound(id.to_string()),
            WorkOrderStoreError::DuplicateSequence(_) | WorkOrderStoreError::Concurrency(_) => {
                DomainError::conflict(value.to_string())
            }
            WorkOrderStoreError::Storage(msg) => DomainError::invariant(msg),
        }
    }
}

/// Work-order table with a hard uniqueness constraint on `work_sequence`.
///
/// `max_sequence` followed by `insert` is deliberately not atomic: callers
/// allocate optimistically and retry on `DuplicateSequence`.
pub trait WorkOrderStore: Send + Sync {
    /// Highest allocated sequence, or 0 when the table is empty.
    fn max_sequence(&self) -> Result<u64, WorkOrderStoreError>;

    fn insert(&self, order: WorkOrder) -> Result<(), WorkOrderStoreError>;

    fn get(&self, id: WorkOrderId) -> Result<Option<WorkOrder>, WorkOrderStoreError>;

    fn list(&self) -> Result<Vec<WorkOrder>, WorkOrderStoreError>;

    fn update(
        &self,
        order: WorkOrder,
        expected_version: ExpectedVersion,
    ) -> Result<(), WorkOrderStoreError>;
}

impl<S> WorkOrderStore for Arc<S>
where
    S: WorkOrderStore + ?Sized,
{
    fn max_sequence(&self) -> Result<u64, WorkOrderStoreError> {
        (**self).max_sequence()
    }

    fn insert(&self, order: WorkOrder) -> Result<(), WorkOrderStoreError> {
        (**self).insert(order)
    }

    fn get(&self, id: WorkOrderId) -> Result<Option<WorkOrder>, WorkOrderStoreError> {
        (**self).get(id)
    }

    fn list(&self) -> Result<Vec<WorkOrder>, WorkOrderStoreError> {
        (**self).list()
    }

    fn update(
        &self,
        order: WorkOrder,
        expected_version: ExpectedVersion,
    ) -> Result<(), WorkOrderStoreError> {
        (**self).update(order, expected_version)
    }
}
