use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use turboshop_core::{AggregateRoot, ExpectedVersion, WorkOrderId};
use turboshop_workshop::WorkOrder;

use super::r#trait::{WorkOrderStore, WorkOrderStoreError};

#[derive(Debug, Default)]
struct OrderTable {
    orders: HashMap<WorkOrderId, WorkOrder>,
    by_sequence: BTreeMap<u64, WorkOrderId>,
}

/// In-memory work-order store. The sequence index is the unique constraint.
#[derive(Debug, Default)]
pub struct InMemoryWorkOrderStore {
    table: RwLock<OrderTable>,
}

impl InMemoryWorkOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> WorkOrderStoreError {
        WorkOrderStoreError::Storage("lock poisoned".to_string())
    }
}

impl WorkOrderStore for InMemoryWorkOrderStore {
    fn max_sequence(&self) -> Result<u64, WorkOrderStoreError> {
        let table = self.table.read().map_err(|_| Self::poisoned())?;
        Ok(table.by_sequence.keys().next_back().copied().unwrap_or(0))
    }

    fn insert(&self, order: WorkOrder) -> Result<(), WorkOrderStoreError> {
        let mut table = self.table.write().map_err(|_| Self::poisoned())?;

        let sequence = order.work_sequence();
        if table.by_sequence.contains_key(&sequence) {
            return Err(WorkOrderStoreError::DuplicateSequence(sequence));
        }
        if table.orders.contains_key(&order.work_order_id()) {
            return Err(WorkOrderStoreError::Concurrency(format!(
                "work order {} already exists",
                order.work_order_id()
            )));
        }

        table.by_sequence.insert(sequence, order.work_order_id());
        table.orders.insert(order.work_order_id(), order);
        Ok(())
    }

    fn get(&self, id: WorkOrderId) -> Result<Option<WorkOrder>, WorkOrderStoreError> {
        let table = self.table.read().map_err(|_| Self::poisoned())?;
        Ok(table.orders.get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<WorkOrder>, WorkOrderStoreError> {
        let table = self.table.read().map_err(|_| Self::poisoned())?;
        Ok(table.orders.values().cloned().collect())
    }

    fn update(
        &self,
        order: WorkOrder,
        expected_version: ExpectedVersion,
    ) -> Result<(), WorkOrderStoreError> {
        let mut table = self.table.write().map_err(|_| Self::poisoned())?;
        let id = order.work_order_id();

        let stored = table
            .orders
            .get(&id)
            .ok_or(WorkOrderStoreError::NotFound(id))?;
        if !expected_version.matches(stored.version()) {
            return Err(WorkOrderStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {}",
                stored.version()
            )));
        }
        if stored.work_sequence() != order.work_sequence() {
            return Err(WorkOrderStoreError::Concurrency(
                "work_sequence cannot change after creation".to_string(),
            ));
        }

        table.orders.insert(id, order);
        Ok(())
    }
}
