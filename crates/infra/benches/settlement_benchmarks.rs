use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;

use stockbook_core::{AggregateId, Money};
use stockbook_events::{EventEnvelope, InMemoryEventBus};
use stockbook_finance::{DateWindow, ExpenseFigures, SaleFigures, summarize};
use stockbook_infra::PRODUCT_AGGREGATE_TYPE;
use stockbook_infra::command_dispatcher::CommandDispatcher;
use stockbook_infra::event_store::InMemoryEventStore;
use stockbook_infra::settlement::SettlementService;
use stockbook_inventory::{
    Product, ProductCommand, ProductId, PurchaseLot, RecordPurchase, RegisterProduct,
    plan_consumption,
};
use stockbook_sales::OrderStatus;

type Store = Arc<InMemoryEventStore>;
type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .to_utc()
}

/// A settlement service with one registered product holding `lots` lots of
/// `units_per_lot` units each.
fn seeded_settlement(lots: i64, units_per_lot: i64) -> (SettlementService<Store, Bus>, ProductId) {
    let store: Store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher = CommandDispatcher::new(store.clone(), bus.clone());

    let product_id = ProductId::new(AggregateId::new());
    let now = base_time();
    dispatcher
        .dispatch::<Product>(
            product_id.0,
            PRODUCT_AGGREGATE_TYPE,
            ProductCommand::RegisterProduct(RegisterProduct {
                product_id,
                name: "Widget".to_string(),
                description: None,
                price: Money::from_cents(5_000),
                occurred_at: now,
            }),
            |id| Product::empty(ProductId::new(id)),
        )
        .unwrap();

    for i in 0..lots {
        dispatcher
            .dispatch::<Product>(
                product_id.0,
                PRODUCT_AGGREGATE_TYPE,
                ProductCommand::RecordPurchase(RecordPurchase {
                    product_id,
                    quantity: units_per_lot,
                    unit_cost: Money::from_cents(300 + i),
                    incidental_expenses: Money::zero(),
                    supplier: None,
                    new_price: None,
                    occurred_at: now + Duration::minutes(i),
                }),
                |id| Product::empty(ProductId::new(id)),
            )
            .unwrap();
    }

    (SettlementService::new(store, bus), product_id)
}

fn bench_settlement(c: &mut Criterion) {
    let mut group = c.benchmark_group("settlement");

    group.bench_function("settle_across_8_lots", |b| {
        b.iter_batched(
            || seeded_settlement(8, 50),
            |(settlement, product_id)| {
                settlement
                    .settle(black_box(product_id), black_box(200), None, base_time())
                    .unwrap()
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_fifo_planner(c: &mut Criterion) {
    let now = base_time();
    let lots: Vec<PurchaseLot> = (0..1_000)
        .map(|i| PurchaseLot {
            purchased_at: now + Duration::minutes(i),
            quantity: 10,
            unit_cost: Money::from_cents(100 + i),
            incidental_expenses: Money::zero(),
            supplier: None,
            remaining: 10,
        })
        .collect();

    c.bench_function("fifo_plan_1000_lots", |b| {
        b.iter(|| plan_consumption(black_box(&lots), black_box(9_500)).unwrap());
    });
}

fn bench_summary(c: &mut Criterion) {
    let now = base_time();
    let sales: Vec<SaleFigures> = (0..10_000)
        .map(|i| SaleFigures {
            sale_date: now + Duration::minutes(i),
            status: OrderStatus::Completed,
            total_price: Money::from_cents(1_000 + i),
            total_cost: Money::from_cents(400 + i),
        })
        .collect();
    let expenses: Vec<ExpenseFigures> = (0..500)
        .map(|i| ExpenseFigures {
            incurred_at: now + Duration::hours(i),
            amount: Money::from_cents(50 + i),
        })
        .collect();
    let window = DateWindow::month(2024, 1).unwrap();

    c.bench_function("summarize_10k_sales", |b| {
        b.iter(|| summarize(black_box(&window), black_box(&sales), &[], black_box(&expenses)));
    });
}

criterion_group!(benches, bench_settlement, bench_fifo_planner, bench_summary);
criterion_main!(benches);
