use common::{Money, ProductId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{CartService, CheckoutRequest, CheckoutService, OrderService, OrderStatus};
use store::{InMemoryStore, ProductRecord};

async fn seed_products(store: &InMemoryStore, count: usize) -> Vec<ProductId> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let id = ProductId::new();
        store
            .insert_product(ProductRecord {
                id,
                price: Money::from_cents(100 * (i as i64 + 1)),
                stock: u32::MAX,
            })
            .await;
        ids.push(id);
    }
    ids
}

fn bench_add_item(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let carts = CartService::new(store.clone());
    let products = rt.block_on(seed_products(&store, 1));

    c.bench_function("cart/add_item", |b| {
        b.iter(|| {
            rt.block_on(async {
                carts.add_item(UserId::new(), products[0], 1).await.unwrap();
            });
        });
    });
}

fn bench_checkout(c: &mut Criterion, lines: usize) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let carts = CartService::new(store.clone());
    let checkout = CheckoutService::new(store.clone());
    let products = rt.block_on(seed_products(&store, lines));

    c.bench_function(&format!("checkout/{lines}_lines"), |b| {
        b.iter(|| {
            rt.block_on(async {
                let user = UserId::new();
                for product in &products {
                    carts.add_item(user, *product, 2).await.unwrap();
                }
                checkout
                    .checkout(user, CheckoutRequest::default())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_checkout_1(c: &mut Criterion) {
    bench_checkout(c, 1);
}

fn bench_checkout_10(c: &mut Criterion) {
    bench_checkout(c, 10);
}

fn bench_status_transition(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let carts = CartService::new(store.clone());
    let checkout = CheckoutService::new(store.clone());
    let orders = OrderService::new(store.clone());
    let products = rt.block_on(seed_products(&store, 1));

    c.bench_function("order/place_and_process", |b| {
        b.iter(|| {
            rt.block_on(async {
                let user = UserId::new();
                carts.add_item(user, products[0], 1).await.unwrap();
                let order = checkout
                    .checkout(user, CheckoutRequest::default())
                    .await
                    .unwrap();
                orders
                    .transition(order.id, OrderStatus::Processing)
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_add_item,
    bench_checkout_1,
    bench_checkout_10,
    bench_status_transition,
);
criterion_main!(benches);
