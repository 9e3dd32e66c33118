//! Stock movement engine: the only writer of item stock.
//!
//! Every stock change goes through [`StockMovementEngine::record_movement`], which
//! decides the movement on a snapshot of the item and commits it with a
//! compare-and-swap on `current_stock`. A lost race re-reads the item and decides
//! again, so concurrent movements on one item serialize instead of losing updates.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use turboshop_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, ExpectedVersion, ItemId, MovementId,
};
use turboshop_inventory::{
    Category, Dashboard, InventoryCommand, InventoryItem, ItemFilter, ItemPatch, MovementFilter,
    MovementReason, MovementType, NegativeStockPolicy, NewItem, RecordMovement, StockMovement,
    StockStatus, compute_dashboard,
};

use crate::ledger_store::{LedgerStore, LedgerStoreError};

/// Notes attached to the movement that books an item's initial stock.
pub const OPENING_BALANCE_NOTE: &str = "opening balance";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    pub negative_stock: NegativeStockPolicy,
    /// Attempts per write before a lost compare-and-swap is reported as a conflict.
    pub max_cas_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            negative_stock: NegativeStockPolicy::Permit,
            max_cas_retries: 8,
        }
    }
}

/// Input of `record_movement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub item_id: ItemId,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub reason: MovementReason,
    pub reference: Option<String>,
    pub notes: String,
}

/// The committed movement plus what the caller should know about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementOutcome {
    #[serde(flatten)]
    pub movement: StockMovement,
    /// The movement left the item below zero (only possible under `Permit`).
    pub negative_stock: bool,
}

/// Item as served to readers, with its derived fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemView {
    #[serde(flatten)]
    pub item: InventoryItem,
    pub stock_status: StockStatus,
    pub total_movements: usize,
    pub last_movement: Option<DateTime<Utc>>,
}

/// Result of recomputing an item's stock from its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerAudit {
    pub item_id: ItemId,
    pub recorded_stock: i64,
    pub ledger_sum: i64,
    pub movement_count: usize,
    /// Movements whose `stock_after - stock_before` disagrees with their quantity.
    pub broken_snapshots: Vec<MovementId>,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.recorded_stock == self.ledger_sum && self.broken_snapshots.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct MovementStats {
    count: usize,
    last: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct StockMovementEngine<S> {
    store: S,
    config: LedgerConfig,
}

impl<S> StockMovementEngine<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> StockMovementEngine<S>
where
    S: LedgerStore,
{
    /// Create an item. A positive `initial_stock` is booked as an opening IN movement.
    pub fn create_item(&self, input: NewItem) -> DomainResult<ItemView> {
        let item = InventoryItem::create(ItemId::new(), &input, Utc::now())?;
        let id = item.item_id();
        self.store.insert_item(item)?;
        tracing::info!(item_id = %id, code = %input.code.trim(), "inventory item created");

        if input.initial_stock > 0 {
            self.record_movement(MovementRequest {
                item_id: id,
                movement_type: MovementType::In,
                quantity: input.initial_stock,
                reason: MovementReason::Correction,
                reference: None,
                notes: OPENING_BALANCE_NOTE.to_string(),
            })?;
        }

        self.get_item(id)
    }

    pub fn get_item(&self, id: ItemId) -> DomainResult<ItemView> {
        let item = self.load(id)?;
        let stats = self.stats_for(Some(id))?;
        Ok(Self::view(item, &stats))
    }

    /// Filtered listing, sorted by name.
    pub fn list_items(&self, filter: &ItemFilter) -> DomainResult<Vec<ItemView>> {
        let stats = self.stats_for(None)?;
        let mut items: Vec<InventoryItem> = self
            .store
            .list_items()?
            .into_iter()
            .filter(|i| filter.matches(i))
            .collect();
        items.sort_by(|a, b| {
            a.name()
                .to_lowercase()
                .cmp(&b.name().to_lowercase())
                .then_with(|| a.code().cmp(b.code()))
        });
        Ok(items.into_iter().map(|i| Self::view(i, &stats)).collect())
    }

    /// Edit item details. Stock is never touched here.
    pub fn update_item(&self, id: ItemId, patch: &ItemPatch) -> DomainResult<ItemView> {
        for attempt in 1..=self.config.max_cas_retries {
            let mut item = self.load(id)?;
            let expected = ExpectedVersion::Exact(item.version());
            item.apply_patch(patch, Utc::now())?;

            match self.store.update_item(item, expected) {
                Ok(()) => return self.get_item(id),
                Err(LedgerStoreError::Concurrency(msg)) => {
                    tracing::debug!(item_id = %id, attempt, %msg, "item update lost a race; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(DomainError::conflict(format!(
            "item {id} kept changing during update"
        )))
    }

    pub fn delete_item(&self, id: ItemId, cascade: bool) -> DomainResult<()> {
        let removed = self.store.delete_item(id, cascade)?;
        tracing::info!(item_id = %id, removed_movements = removed, "inventory item deleted");
        Ok(())
    }

    /// Validate and record one movement; append and stock update commit together.
    pub fn record_movement(&self, request: MovementRequest) -> DomainResult<MovementOutcome> {
        let movement_id = MovementId::new();

        for attempt in 1..=self.config.max_cas_retries {
            let item = self.load(request.item_id)?;
            let command = InventoryCommand::RecordMovement {
                movement: RecordMovement {
                    movement_id,
                    item_id: request.item_id,
                    movement_type: request.movement_type,
                    quantity: request.quantity,
                    reason: request.reason,
                    reference: request.reference.clone(),
                    notes: request.notes.clone(),
                    occurred_at: Utc::now(),
                },
                policy: self.config.negative_stock,
            };

            let movement = item
                .handle(&command)?
                .into_iter()
                .next()
                .ok_or_else(|| DomainError::invariant("movement command produced no movement"))?;

            match self.store.append_movement(movement.clone()) {
                Ok(_) => {
                    let negative_stock = movement.left_negative_stock();
                    if negative_stock {
                        tracing::warn!(
                            item_id = %movement.item_id,
                            stock_before = movement.stock_before,
                            stock_after = movement.stock_after,
                            "movement left item with negative stock"
                        );
                    } else {
                        tracing::info!(
                            item_id = %movement.item_id,
                            movement_type = %movement.movement_type,
                            quantity = movement.quantity,
                            stock_after = movement.stock_after,
                            "stock movement recorded"
                        );
                    }
                    return Ok(MovementOutcome {
                        movement,
                        negative_stock,
                    });
                }
                Err(LedgerStoreError::StaleStock { expected, actual }) => {
                    tracing::debug!(
                        item_id = %request.item_id,
                        attempt,
                        expected,
                        actual,
                        "stock compare-and-swap lost; retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DomainError::conflict(format!(
            "stock of item {} kept changing; gave up after {} attempts",
            request.item_id, self.config.max_cas_retries
        )))
    }

    /// Movement history, newest first.
    pub fn list_movements(&self, filter: &MovementFilter) -> DomainResult<Vec<StockMovement>> {
        Ok(self.store.movements(filter)?)
    }

    /// Recomputed on every call from current state.
    pub fn dashboard(&self) -> DomainResult<Dashboard> {
        let items = self.store.list_items()?;
        let movements = self.store.movements(&MovementFilter {
            limit: Some(usize::MAX),
            ..MovementFilter::default()
        })?;
        Ok(compute_dashboard(&items, &movements, Utc::now()))
    }

    /// Recompute the item's stock from its ledger and report any drift.
    pub fn verify_item(&self, id: ItemId) -> DomainResult<LedgerAudit> {
        let item = self.load(id)?;
        let movements = self.store.movements(&MovementFilter {
            limit: Some(usize::MAX),
            ..MovementFilter::for_item(id)
        })?;

        let audit = LedgerAudit {
            item_id: id,
            recorded_stock: item.current_stock(),
            ledger_sum: movements.iter().map(StockMovement::signed_quantity).sum(),
            movement_count: movements.len(),
            broken_snapshots: movements
                .iter()
                .filter(|m| !m.is_consistent())
                .map(|m| m.id)
                .collect(),
        };

        if !audit.is_consistent() {
            tracing::error!(
                item_id = %id,
                recorded_stock = audit.recorded_stock,
                ledger_sum = audit.ledger_sum,
                "ledger drift detected"
            );
        }
        Ok(audit)
    }

    /// Insert the reference items whose codes are not present yet.
    pub fn seed_default_items(&self) -> DomainResult<Vec<ItemView>> {
        let mut created = Vec::new();
        for input in default_items() {
            if self.store.find_by_code(&input.code)?.is_some() {
                continue;
            }
            created.push(self.create_item(input)?);
        }
        if !created.is_empty() {
            tracing::info!(count = created.len(), "default inventory items seeded");
        }
        Ok(created)
    }

    fn load(&self, id: ItemId) -> DomainResult<InventoryItem> {
        self.store
            .get_item(id)?
            .ok_or_else(|| DomainError::ItemNotFound(id.to_string()))
    }

    fn stats_for(&self, item_id: Option<ItemId>) -> DomainResult<HashMap<ItemId, MovementStats>> {
        let filter = MovementFilter {
            item_id,
            movement_type: None,
            limit: Some(usize::MAX),
        };
        let mut stats: HashMap<ItemId, MovementStats> = HashMap::new();
        for m in self.store.movements(&filter)? {
            let entry = stats.entry(m.item_id).or_default();
            entry.count += 1;
            entry.last = entry.last.max(Some(m.created_at));
        }
        Ok(stats)
    }

    fn view(item: InventoryItem, stats: &HashMap<ItemId, MovementStats>) -> ItemView {
        let s = stats.get(&item.item_id()).copied().unwrap_or_default();
        ItemView {
            stock_status: item.stock_status(),
            total_movements: s.count,
            last_movement: s.last,
            item,
        }
    }
}

/// The shop's reference stock list.
pub fn default_items() -> Vec<NewItem> {
    let item = |name: &str, code: &str, category, stock, min, unit: &str, price| NewItem {
        category,
        unit: unit.to_string(),
        initial_stock: stock,
        min_stock: min,
        purchase_price: price,
        ..NewItem::new(name, code)
    };

    vec![
        item("Geometria", "GEO-001", Category::TurboParts, 5, 2, "db", 8500),
        item("C.H.R.A", "CHRA-001", Category::TurboParts, 3, 1, "db", 45000),
        item("Aktuátor", "ACT-001", Category::TurboParts, 8, 3, "db", 12000),
        item("Javító készlet", "SET-001", Category::TurboParts, 15, 5, "db", 2500),
        item("Tisztítószer", "CLEAN-001", Category::Consumables, 2, 1, "liter", 1500),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger_store::InMemoryLedgerStore;

    fn test_engine(policy: NegativeStockPolicy) -> StockMovementEngine<InMemoryLedgerStore> {
        StockMovementEngine::new(
            InMemoryLedgerStore::new(),
            LedgerConfig {
                negative_stock: policy,
                ..LedgerConfig::default()
            },
        )
    }

    fn test_item(
        engine: &StockMovementEngine<InMemoryLedgerStore>,
        stock: i64,
        min: i64,
    ) -> ItemId {
        let input = NewItem {
            initial_stock: stock,
            min_stock: min,
            ..NewItem::new("Geometria", "GEO-001")
        };
        engine.create_item(input).unwrap().item.item_id()
    }

    fn out(item_id: ItemId, quantity: i64) -> MovementRequest {
        MovementRequest {
            item_id,
            movement_type: MovementType::Out,
            quantity,
            reason: MovementReason::Usage,
            reference: None,
            notes: String::new(),
        }
    }

    #[test]
    fn opening_stock_is_a_movement() {
        let engine = test_engine(NegativeStockPolicy::Permit);
        let id = test_item(&engine, 10, 5);

        let view = engine.get_item(id).unwrap();
        assert_eq!(view.item.current_stock(), 10);
        assert_eq!(view.total_movements, 1);

        let history = engine.list_movements(&MovementFilter::for_item(id)).unwrap();
        assert_eq!(history[0].notes, OPENING_BALANCE_NOTE);
        assert_eq!(history[0].reason, MovementReason::Correction);
    }

    #[test]
    fn out_movements_walk_status_to_critical() {
        let engine = test_engine(NegativeStockPolicy::Permit);
        let id = test_item(&engine, 10, 5);

        let first = engine.record_movement(out(id, 6)).unwrap();
        assert_eq!((first.movement.stock_before, first.movement.stock_after), (10, 4));
        assert_eq!(engine.get_item(id).unwrap().stock_status, StockStatus::Low);

        engine.record_movement(out(id, 4)).unwrap();
        let view = engine.get_item(id).unwrap();
        assert_eq!(view.item.current_stock(), 0);
        assert_eq!(view.stock_status, StockStatus::Critical);
        assert!(engine.verify_item(id).unwrap().is_consistent());
    }

    #[test]
    fn negative_stock_policy_is_honoured() {
        let permissive = test_engine(NegativeStockPolicy::Permit);
        let id = test_item(&permissive, 1, 0);
        let outcome = permissive.record_movement(out(id, 3)).unwrap();
        assert!(outcome.negative_stock);
        assert_eq!(permissive.get_item(id).unwrap().item.current_stock(), -2);

        let strict = test_engine(NegativeStockPolicy::Reject);
        let id = test_item(&strict, 1, 0);
        assert_eq!(
            strict.record_movement(out(id, 3)).unwrap_err(),
            DomainError::InsufficientStock {
                available: 1,
                requested: 3
            }
        );
        assert_eq!(strict.get_item(id).unwrap().total_movements, 1);
    }

    #[test]
    fn unknown_item_and_invalid_input_fail_without_writes() {
        let engine = test_engine(NegativeStockPolicy::Permit);
        assert!(matches!(
            engine.record_movement(out(ItemId::new(), 1)),
            Err(DomainError::ItemNotFound(_))
        ));

        let id = test_item(&engine, 0, 0);
        assert_eq!(
            engine.record_movement(out(id, 0)).unwrap_err(),
            DomainError::InvalidQuantity(0)
        );
        let wrong_reason = MovementRequest {
            reason: MovementReason::Purchase,
            ..out(id, 1)
        };
        assert!(matches!(
            engine.record_movement(wrong_reason),
            Err(DomainError::InvalidReason { .. })
        ));
        assert!(engine.list_movements(&MovementFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn update_item_keeps_stock_and_rejects_duplicate_codes() {
        let engine = test_engine(NegativeStockPolicy::Permit);
        let id = test_item(&engine, 4, 1);
        engine
            .create_item(NewItem::new("C.H.R.A", "CHRA-001"))
            .unwrap();

        let patch = ItemPatch {
            location: Some("Shelf B".into()),
            ..ItemPatch::default()
        };
        let view = engine.update_item(id, &patch).unwrap();
        assert_eq!(view.item.current_stock(), 4);

        let clash = ItemPatch {
            code: Some("CHRA-001".into()),
            ..ItemPatch::default()
        };
        assert!(matches!(
            engine.update_item(id, &clash),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn list_items_filters_and_sorts_by_name() {
        let engine = test_engine(NegativeStockPolicy::Permit);
        engine.seed_default_items().unwrap();
        assert!(engine.seed_default_items().unwrap().is_empty());

        let all = engine.list_items(&ItemFilter::default()).unwrap();
        let names: Vec<&str> = all.iter().map(|v| v.item.name()).collect();
        assert_eq!(
            names,
            vec!["Aktuátor", "C.H.R.A", "Geometria", "Javító készlet", "Tisztítószer"]
        );

        let consumables = ItemFilter {
            category: Some(Category::Consumables),
            ..ItemFilter::default()
        };
        assert_eq!(engine.list_items(&consumables).unwrap().len(), 1);
    }

    #[test]
    fn dashboard_reflects_latest_movements() {
        let engine = test_engine(NegativeStockPolicy::Permit);
        let id = test_item(&engine, 3, 1);

        let before = engine.dashboard().unwrap();
        assert_eq!(before.total_items, 1);
        assert_eq!(before.out_of_stock_items, 0);

        engine.record_movement(out(id, 3)).unwrap();
        let after = engine.dashboard().unwrap();
        assert_eq!(after.out_of_stock_items, 1);
        assert_eq!(after.low_stock_items, 1);
        assert_eq!(after.recent_movements, 2);
    }

    #[test]
    fn delete_item_refuses_history_without_cascade() {
        let engine = test_engine(NegativeStockPolicy::Permit);
        let id = test_item(&engine, 2, 0);
        assert!(matches!(
            engine.delete_item(id, false),
            Err(DomainError::Conflict(_))
        ));
        engine.delete_item(id, true).unwrap();
        assert!(engine.get_item(id).unwrap_err().is_not_found());
    }
}
