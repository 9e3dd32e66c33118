use std::collections::HashMap;
use std::sync::RwLock;

use turboshop_core::{Aggregate, AggregateRoot, ExpectedVersion, ItemId};
use turboshop_inventory::{InventoryItem, MovementFilter, StockMovement};

use super::r#trait::{LedgerStore, LedgerStoreError};

#[derive(Debug, Default)]
struct LedgerState {
    items: HashMap<ItemId, InventoryItem>,
    /// Append order. Never reordered or edited in place.
    movements: Vec<StockMovement>,
}

impl LedgerState {
    fn code_taken(&self, code: &str, except: Option<ItemId>) -> bool {
        self.items
            .values()
            .any(|i| i.code().eq_ignore_ascii_case(code) && Some(i.item_id()) != except)
    }
}

/// In-memory ledger store.
///
/// Items and movements sit behind one lock so the stock compare-and-swap and the
/// movement append commit together. Intended for tests/dev and the single-node
/// backend.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> LedgerStoreError {
        LedgerStoreError::Storage("lock poisoned".to_string())
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn insert_item(&self, item: InventoryItem) -> Result<(), LedgerStoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;

        if state.code_taken(item.code(), None) {
            return Err(LedgerStoreError::DuplicateCode(item.code().to_string()));
        }
        if state.items.contains_key(&item.item_id()) {
            return Err(LedgerStoreError::InvalidAppend(format!(
                "item {} already exists",
                item.item_id()
            )));
        }

        state.items.insert(item.item_id(), item);
        Ok(())
    }

    fn get_item(&self, id: ItemId) -> Result<Option<InventoryItem>, LedgerStoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.items.get(&id).cloned())
    }

    fn find_by_code(&self, code: &str) -> Result<Option<InventoryItem>, LedgerStoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state
            .items
            .values()
            .find(|i| i.code().eq_ignore_ascii_case(code))
            .cloned())
    }

    fn list_items(&self) -> Result<Vec<InventoryItem>, LedgerStoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.items.values().cloned().collect())
    }

    fn update_item(
        &self,
        item: InventoryItem,
        expected_version: ExpectedVersion,
    ) -> Result<(), LedgerStoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        let id = item.item_id();

        let stored = state
            .items
            .get(&id)
            .ok_or(LedgerStoreError::ItemNotFound(id))?;

        if !expected_version.matches(stored.version()) {
            return Err(LedgerStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {}",
                stored.version()
            )));
        }
        if stored.current_stock() != item.current_stock() {
            return Err(LedgerStoreError::Concurrency(
                "item details update carried a different current_stock".to_string(),
            ));
        }
        if state.code_taken(item.code(), Some(id)) {
            return Err(LedgerStoreError::DuplicateCode(item.code().to_string()));
        }

        state.items.insert(id, item);
        Ok(())
    }

    fn delete_item(&self, id: ItemId, cascade: bool) -> Result<usize, LedgerStoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;

        if !state.items.contains_key(&id) {
            return Err(LedgerStoreError::ItemNotFound(id));
        }

        let history = state.movements.iter().filter(|m| m.item_id == id).count();
        if history > 0 && !cascade {
            return Err(LedgerStoreError::HasMovements(id));
        }

        state.movements.retain(|m| m.item_id != id);
        state.items.remove(&id);
        Ok(history)
    }

    fn append_movement(&self, movement: StockMovement) -> Result<InventoryItem, LedgerStoreError> {
        if !movement.is_consistent() {
            return Err(LedgerStoreError::InvalidAppend(format!(
                "movement {} snapshot does not match its signed quantity",
                movement.id
            )));
        }

        let mut state = self.state.write().map_err(|_| Self::poisoned())?;

        if state.movements.iter().any(|m| m.id == movement.id) {
            return Err(LedgerStoreError::InvalidAppend(format!(
                "movement {} already recorded",
                movement.id
            )));
        }

        let item = state
            .items
            .get_mut(&movement.item_id)
            .ok_or(LedgerStoreError::ItemNotFound(movement.item_id))?;

        if item.current_stock() != movement.stock_before {
            return Err(LedgerStoreError::StaleStock {
                expected: movement.stock_before,
                actual: item.current_stock(),
            });
        }

        item.apply(&movement);
        let committed = item.clone();
        state.movements.push(movement);
        Ok(committed)
    }

    fn movements(&self, filter: &MovementFilter) -> Result<Vec<StockMovement>, LedgerStoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state
            .movements
            .iter()
            .rev()
            .filter(|m| filter.matches(m))
            .take(filter.effective_limit())
            .cloned()
            .collect())
    }
}
