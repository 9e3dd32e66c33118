use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use turboshop_infra::{
    InMemoryClientStore, InMemoryLedgerStore, InMemoryWorkOrderStore, LedgerConfig,
    MovementRequest, SequencerConfig, StockMovementEngine, WorkOrderSequencer,
};
use turboshop_inventory::{ItemFilter, MovementReason, MovementType, NewItem};
use turboshop_workshop::{NewClient, NewWorkOrder};

fn setup_engine(items: usize) -> StockMovementEngine<InMemoryLedgerStore> {
    let engine = StockMovementEngine::new(InMemoryLedgerStore::new(), LedgerConfig::default());
    for i in 0..items {
        let input = NewItem {
            initial_stock: 100,
            min_stock: 10,
            purchase_price: 1500,
            ..NewItem::new(format!("Item {i}"), format!("CODE-{i:05}"))
        };
        engine.create_item(input).unwrap();
    }
    engine
}

fn bench_record_movement(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_movement");
    group.sample_size(500);

    group.bench_function("in_out_pair", |b| {
        let engine = setup_engine(1);
        let item_id = engine.list_items(&ItemFilter::default()).unwrap()[0]
            .item
            .item_id();

        b.iter(|| {
            for (movement_type, reason) in [
                (MovementType::In, MovementReason::Purchase),
                (MovementType::Out, MovementReason::Usage),
            ] {
                engine
                    .record_movement(MovementRequest {
                        item_id,
                        movement_type,
                        quantity: black_box(3),
                        reason,
                        reference: None,
                        notes: String::new(),
                    })
                    .unwrap();
            }
        });
    });

    group.finish();
}

fn bench_dashboard(c: &mut Criterion) {
    let mut group = c.benchmark_group("dashboard");

    for items in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(items as u64));
        group.bench_with_input(BenchmarkId::new("items", items), &items, |b, &n| {
            let engine = setup_engine(n);
            b.iter(|| black_box(engine.dashboard().unwrap()));
        });
    }

    group.finish();
}

fn bench_work_order_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("work_order_creation");

    group.bench_function("sequential", |b| {
        let sequencer = WorkOrderSequencer::new(
            InMemoryWorkOrderStore::new(),
            InMemoryClientStore::new(),
            SequencerConfig::default(),
        );
        let client = sequencer
            .register_client(NewClient::new("Bench Client", "000"))
            .unwrap();

        b.iter(|| {
            black_box(
                sequencer
                    .create_work_order(NewWorkOrder::new(client.id, "5490-970-0071"))
                    .unwrap(),
            )
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_record_movement,
    bench_dashboard,
    bench_work_order_creation
);
criterion_main!(benches);
