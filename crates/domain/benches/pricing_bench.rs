use chrono::Utc;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::order::{ContactInfo, CustomerId, Money, NewOrderItem, RestaurantId};
use domain::{
    CartService, CreateDraftOrder, GeoPoint, Order, OrderStore, PricingEngine, haversine_meters,
};
use order_store::InMemoryDocumentStore;
use std::hint::black_box;

fn draft_cmd(lines: u32) -> CreateDraftOrder {
    let mut item = NewOrderItem::new("bun-cha", "Bun cha", Money::vnd(55_000), lines);
    for n in 0..3 {
        let topping_id = format!("extra-{n}");
        item = item.with_topping(topping_id.as_str(), "Extra", Money::vnd(5_000), 1);
    }
    CreateDraftOrder::marketplace(
        RestaurantId::new(),
        CustomerId::new(),
        ContactInfo::new("Minh", "0903000000")
            .located("1 Le Loi", GeoPoint::new(10.8231, 106.6297).unwrap()),
        ContactInfo::new("Bun Cha 36", "0284000000")
            .located("36 Hang Than", GeoPoint::new(10.7769, 106.7009).unwrap()),
        item,
    )
}

fn bench_haversine(c: &mut Criterion) {
    let a = GeoPoint::new(10.7769, 106.7009).unwrap();
    let b = GeoPoint::new(10.8231, 106.6297).unwrap();

    c.bench_function("pricing/haversine_meters", |bench| {
        bench.iter(|| haversine_meters(black_box(a), black_box(b)));
    });
}

fn bench_shipping_and_eta(c: &mut Criterion) {
    let engine = PricingEngine::default();
    let now = Utc::now();

    c.bench_function("pricing/shipping_fee_and_eta", |bench| {
        bench.iter(|| {
            let distance = black_box(8_700);
            (
                engine.shipping_fee(distance),
                engine.expected_delivery_time(now, distance),
            )
        });
    });
}

fn bench_reprice_on_add(c: &mut Criterion) {
    let engine = PricingEngine::default();

    c.bench_function("pricing/create_draft_and_add", |bench| {
        bench.iter(|| {
            let mut order = Order::create_draft(draft_cmd(2), &engine, Utc::now()).unwrap();
            for n in 0..10 {
                let menu_id = format!("side-{n}");
                let item = NewOrderItem::new(menu_id.as_str(), "Side", Money::vnd(12_000), 1);
                order.add_item(item, &engine, Utc::now()).unwrap();
            }
            black_box(order.grand_total())
        });
    });
}

fn bench_cart_service(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = CartService::new(
        OrderStore::new(InMemoryDocumentStore::new()),
        PricingEngine::default(),
    );

    c.bench_function("pricing/cart_service_create_draft", |bench| {
        bench.iter(|| {
            rt.block_on(async { service.create_draft_order(draft_cmd(1)).await.unwrap() });
        });
    });
}

criterion_group!(
    benches,
    bench_haversine,
    bench_shipping_and_eta,
    bench_reprice_on_add,
    bench_cart_service
);
criterion_main!(benches);
