use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;

use turboshop_core::{DomainError, ExpectedVersion, WorkOrderId};
use turboshop_infra::{
    InMemoryClientStore, InMemoryLedgerStore, InMemoryWorkOrderStore, LedgerConfig,
    MovementRequest, SequencerConfig, StockMovementEngine, WorkOrderSequencer, WorkOrderStore,
    WorkOrderStoreError,
};
use turboshop_inventory::{
    MovementFilter, MovementReason, MovementType, NegativeStockPolicy, NewItem,
};
use turboshop_workshop::{NewClient, NewWorkOrder, WorkOrder};

const WRITERS: usize = 8;

#[test]
fn concurrent_work_order_creation_yields_unique_increasing_sequences() {
    let sequencer = Arc::new(WorkOrderSequencer::new(
        InMemoryWorkOrderStore::new(),
        InMemoryClientStore::new(),
        SequencerConfig {
            max_retries: (WRITERS as u32) * 2,
        },
    ));
    let client = sequencer
        .register_client(NewClient::new("Kovács Béla", "+36 30 123 4567"))
        .unwrap();

    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let sequencer = Arc::clone(&sequencer);
            thread::spawn(move || {
                (0..5)
                    .map(|_| {
                        sequencer
                            .create_work_order(NewWorkOrder::new(client.id, "5490-970-0071"))
                            .unwrap()
                            .order
                            .work_sequence()
                    })
                    .collect::<Vec<u64>>()
            })
        })
        .collect();

    let mut all = Vec::new();
    for h in handles {
        let per_thread = h.join().unwrap();
        assert!(per_thread.windows(2).all(|w| w[0] < w[1]));
        all.extend(per_thread);
    }

    let unique: HashSet<u64> = all.iter().copied().collect();
    assert_eq!(unique.len(), WRITERS * 5);
    let expected: HashSet<u64> = (1..=(WRITERS * 5) as u64).collect();
    assert_eq!(unique, expected);
}

/// A store whose unique constraint always fires.
struct AlwaysTaken;

impl WorkOrderStore for AlwaysTaken {
    fn max_sequence(&self) -> Result<u64, WorkOrderStoreError> {
        Ok(41)
    }

    fn insert(&self, order: WorkOrder) -> Result<(), WorkOrderStoreError> {
        Err(WorkOrderStoreError::DuplicateSequence(order.work_sequence()))
    }

    fn get(&self, _id: WorkOrderId) -> Result<Option<WorkOrder>, WorkOrderStoreError> {
        Ok(None)
    }

    fn list(&self) -> Result<Vec<WorkOrder>, WorkOrderStoreError> {
        Ok(Vec::new())
    }

    fn update(&self, order: WorkOrder, _: ExpectedVersion) -> Result<(), WorkOrderStoreError> {
        Err(WorkOrderStoreError::NotFound(order.work_order_id()))
    }
}

#[test]
fn exhausted_retries_surface_sequence_conflict() {
    let sequencer = WorkOrderSequencer::new(
        AlwaysTaken,
        InMemoryClientStore::new(),
        SequencerConfig { max_retries: 3 },
    );
    let client = sequencer
        .register_client(NewClient::new("Kovács Béla", "1"))
        .unwrap();

    let err = sequencer
        .create_work_order(NewWorkOrder::new(client.id, "X"))
        .unwrap_err();
    assert_eq!(err, DomainError::SequenceConflict { attempts: 3 });
}

#[test]
fn concurrent_movements_on_one_item_do_not_lose_updates() {
    let engine = Arc::new(StockMovementEngine::new(
        Arc::new(InMemoryLedgerStore::new()),
        LedgerConfig {
            negative_stock: NegativeStockPolicy::Permit,
            max_cas_retries: 10_000,
        },
    ));
    let item_id = engine
        .create_item(NewItem {
            initial_stock: 100,
            ..NewItem::new("Geometria", "GEO-001")
        })
        .unwrap()
        .item
        .item_id();

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..25 {
                    let (movement_type, reason) = if w % 2 == 0 {
                        (MovementType::In, MovementReason::Purchase)
                    } else {
                        (MovementType::Out, MovementReason::Usage)
                    };
                    engine
                        .record_movement(MovementRequest {
                            item_id,
                            movement_type,
                            quantity: 2,
                            reason,
                            reference: None,
                            notes: String::new(),
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let view = engine.get_item(item_id).unwrap();
    assert_eq!(view.item.current_stock(), 100);
    assert_eq!(view.total_movements, 1 + WRITERS * 25);

    let audit = engine.verify_item(item_id).unwrap();
    assert!(audit.is_consistent());

    // The history is a chain: each row starts where the previous one ended.
    let mut chain = engine
        .list_movements(&MovementFilter {
            limit: Some(usize::MAX),
            ..MovementFilter::for_item(item_id)
        })
        .unwrap();
    chain.reverse();
    assert!(chain.windows(2).all(|w| w[0].stock_after == w[1].stock_before));
}

fn arb_request() -> impl Strategy<Value = (bool, i64)> {
    (prop::bool::ANY, 1i64..50)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// Property: after any mix of accepted and rejected movements the recorded stock
    /// equals the opening stock plus the signed sum of the ledger.
    #[test]
    fn engine_keeps_stock_equal_to_ledger_sum(
        opening in 0i64..100,
        steps in prop::collection::vec(arb_request(), 0..30),
        reject_negative in prop::bool::ANY,
    ) {
        let policy = if reject_negative {
            NegativeStockPolicy::Reject
        } else {
            NegativeStockPolicy::Permit
        };
        let engine = StockMovementEngine::new(
            InMemoryLedgerStore::new(),
            LedgerConfig { negative_stock: policy, ..LedgerConfig::default() },
        );
        let item_id = engine
            .create_item(NewItem { initial_stock: opening, ..NewItem::new("Aktuátor", "ACT-001") })
            .unwrap()
            .item
            .item_id();

        for (is_in, quantity) in steps {
            let request = MovementRequest {
                item_id,
                movement_type: if is_in { MovementType::In } else { MovementType::Out },
                quantity,
                reason: MovementReason::Correction,
                reference: None,
                notes: String::new(),
            };
            match engine.record_movement(request) {
                Ok(_) => {}
                Err(DomainError::InsufficientStock { .. }) => prop_assert!(reject_negative),
                Err(other) => prop_assert!(false, "unexpected error {other:?}"),
            }
        }

        let audit = engine.verify_item(item_id).unwrap();
        prop_assert!(audit.is_consistent());
        if reject_negative {
            prop_assert!(audit.recorded_stock >= 0);
        }
    }
}
