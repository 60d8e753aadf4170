use checkout::checkout::{CheckoutError, CheckoutItem, CheckoutRequest};
use checkout::lifecycle::CheckoutSystem;
use rust_decimal::Decimal;
use std::time::Duration;
use store_gateway::model::{
    OrderId, OrderStatus, Product, ProductCreate, ProductId, StockCreate, UserId, WarehouseId,
};
use store_gateway::{StoreClient, StoreGateway, UnitOfWork};

async fn add_product(store: &StoreClient, name: &str, price_cents: i64, quantity: u32) -> Product {
    let product = store
        .create_product(ProductCreate::new(name, Decimal::new(price_cents, 2)))
        .await
        .expect("Failed to create product");
    store
        .create_stock(StockCreate {
            product_id: product.id,
            warehouse_id: WarehouseId(1),
            quantity,
        })
        .await
        .expect("Failed to create stock");
    product
}

async fn quantity_of(store: &StoreClient, product_id: ProductId) -> u32 {
    store
        .stocks_for_product(product_id)
        .await
        .unwrap()
        .iter()
        .map(|stock| stock.quantity)
        .sum()
}

fn request(user: u64, items: &[(ProductId, u32)]) -> CheckoutRequest {
    CheckoutRequest::new(
        UserId(user),
        items
            .iter()
            .map(|(product_id, quantity)| CheckoutItem::new(*product_id, *quantity))
            .collect(),
    )
}

#[tokio::test]
async fn test_checkout_reserves_stock_and_persists_order() {
    let system = CheckoutSystem::new();
    let product = add_product(&system.store, "Widget", 1000, 5).await;

    let order = system
        .checkout
        .checkout(request(1, &[(product.id, 3)]))
        .await
        .expect("Checkout failed");

    assert_eq!(order.user_id, UserId(1));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].quantity, 3);
    assert_eq!(order.items[0].price, Decimal::new(1000, 2));
    assert_eq!(order.items[0].warehouse_id, WarehouseId(1));
    assert_eq!(order.total(), Decimal::new(3000, 2));
    assert_eq!(quantity_of(&system.store, product.id).await, 2);

    let stored = system.store.order_by_id(order.id).await.unwrap();
    assert_eq!(stored, order);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_insufficient_stock_leaves_quantity_unchanged() {
    let system = CheckoutSystem::new();
    let product = add_product(&system.store, "Widget", 1000, 2).await;

    let result = system
        .checkout
        .checkout(request(1, &[(product.id, 3)]))
        .await;

    assert_eq!(
        result,
        Err(CheckoutError::InsufficientStock("Widget".to_string()))
    );
    assert_eq!(quantity_of(&system.store, product.id).await, 2);
    assert!(system
        .store
        .order_by_id(OrderId(1))
        .await
        .unwrap_err()
        .is_not_found());

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_product_changes_nothing() {
    let system = CheckoutSystem::new();
    let product = add_product(&system.store, "Widget", 1000, 5).await;

    let result = system
        .checkout
        .checkout(request(1, &[(ProductId(999), 1)]))
        .await;

    assert_eq!(result, Err(CheckoutError::ProductNotFound(ProductId(999))));
    assert_eq!(quantity_of(&system.store, product.id).await, 5);
    assert!(system
        .store
        .order_by_id(OrderId(1))
        .await
        .unwrap_err()
        .is_not_found());

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failure_on_second_item_restores_first() {
    let system = CheckoutSystem::new();
    let first = add_product(&system.store, "Widget", 1000, 5).await;
    let second = add_product(&system.store, "Gadget", 2500, 1).await;

    let result = system
        .checkout
        .checkout(request(1, &[(first.id, 4), (second.id, 2)]))
        .await;

    assert_eq!(
        result,
        Err(CheckoutError::InsufficientStock("Gadget".to_string()))
    );
    assert_eq!(quantity_of(&system.store, first.id).await, 5);
    assert_eq!(quantity_of(&system.store, second.id).await, 1);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failure_at_any_item_leaves_no_trace() {
    let system = CheckoutSystem::new();
    let mut products = Vec::new();
    for (i, name) in ["A", "B", "C", "D"].iter().enumerate() {
        products.push(add_product(&system.store, name, 100 * (i as i64 + 1), 3).await);
    }

    // Item k asks for more than exists; items before it would succeed on their own.
    for k in 0..products.len() {
        let items: Vec<(ProductId, u32)> = products
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id, if i == k { 4 } else { 2 }))
            .collect();
        let result = system.checkout.checkout(request(1, &items)).await;
        assert!(matches!(result, Err(CheckoutError::InsufficientStock(_))));

        for product in &products {
            assert_eq!(quantity_of(&system.store, product.id).await, 3);
        }
    }
    assert!(system
        .store
        .order_by_id(OrderId(1))
        .await
        .unwrap_err()
        .is_not_found());

    system.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_for_last_units() {
    let system = CheckoutSystem::new();
    let product = add_product(&system.store, "Widget", 1000, 5).await;

    let first = system.checkout.clone();
    let second = system.checkout.clone();
    let pid = product.id;
    let (a, b) = tokio::join!(
        tokio::spawn(async move { first.checkout(request(1, &[(pid, 4)])).await }),
        tokio::spawn(async move { second.checkout(request(2, &[(pid, 4)])).await }),
    );
    let results = [a.unwrap(), b.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(CheckoutError::InsufficientStock(_)))));
    assert_eq!(quantity_of(&system.store, product.id).await, 1);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_price_change_does_not_rewrite_orders() {
    let system = CheckoutSystem::new();
    let product = add_product(&system.store, "Widget", 1000, 5).await;

    let order = system
        .checkout
        .checkout(request(1, &[(product.id, 1)]))
        .await
        .unwrap();
    system
        .store
        .set_price(product.id, Decimal::new(1500, 2))
        .await
        .unwrap();

    let stored = system.store.order_by_id(order.id).await.unwrap();
    assert_eq!(stored.items[0].price, Decimal::new(1000, 2));

    let next = system
        .checkout
        .checkout(request(1, &[(product.id, 1)]))
        .await
        .unwrap();
    assert_eq!(next.items[0].price, Decimal::new(1500, 2));

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_items_spread_over_warehouses() {
    let system = CheckoutSystem::new();
    let product = add_product(&system.store, "Widget", 1000, 1).await;
    system
        .store
        .create_stock(StockCreate {
            product_id: product.id,
            warehouse_id: WarehouseId(2),
            quantity: 6,
        })
        .await
        .unwrap();

    let order = system
        .checkout
        .checkout(request(1, &[(product.id, 1), (product.id, 5)]))
        .await
        .unwrap();

    let warehouses: Vec<WarehouseId> = order.items.iter().map(|i| i.warehouse_id).collect();
    assert_eq!(warehouses, vec![WarehouseId(1), WarehouseId(2)]);

    let stocks = system.store.stocks_for_product(product.id).await.unwrap();
    assert_eq!(stocks[0].quantity, 0);
    assert_eq!(stocks[1].quantity, 1);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_empty_request_is_storage_error() {
    let system = CheckoutSystem::new();

    let result = system.checkout.checkout(request(1, &[])).await;

    assert!(matches!(result, Err(CheckoutError::Storage(_))));
    system.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_checkout_mid_flight_rolls_back() {
    let system = CheckoutSystem::new();
    let reserved = add_product(&system.store, "Widget", 1000, 5).await;
    let contended = add_product(&system.store, "Gadget", 2500, 3).await;

    // An outside unit holds the second product, so the checkout stalls on its second
    // item with the first row locked and its decrement staged.
    let mut blocker = system.store.begin().await.unwrap();
    system
        .store
        .stock_for_update(&mut blocker, contended.id, 1)
        .await
        .unwrap();

    let service = system.checkout.clone();
    let items = [(reserved.id, 2), (contended.id, 1)];
    let task = tokio::spawn(async move { service.checkout(request(1, &items)).await });

    // Wait until the checkout holds the first row: another unit cannot lock it.
    let mut observer = system.store.begin().await.unwrap();
    let mut held = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let attempt = tokio::time::timeout(
            Duration::from_millis(20),
            system.store.stock_for_update(&mut observer, reserved.id, 1),
        )
        .await;
        match attempt {
            Err(_) => {
                held = true;
                break;
            }
            // Got there first; give the row back and try again.
            Ok(result) => {
                result.unwrap();
                observer.rollback().await.unwrap();
                observer = system.store.begin().await.unwrap();
            }
        }
    }
    observer.rollback().await.unwrap();
    assert!(held, "Checkout never locked the first row");
    assert!(!task.is_finished());

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    blocker.rollback().await.unwrap();

    assert_eq!(quantity_of(&system.store, reserved.id).await, 5);
    assert_eq!(quantity_of(&system.store, contended.id).await, 3);
    assert!(system
        .store
        .order_by_id(OrderId(1))
        .await
        .unwrap_err()
        .is_not_found());

    let order = tokio::time::timeout(
        Duration::from_secs(1),
        system
            .checkout
            .checkout(request(2, &[(reserved.id, 5), (contended.id, 3)])),
    )
    .await
    .expect("Row lock or admission lock leaked by the cancelled checkout")
    .unwrap();
    assert_eq!(order.items.len(), 2);
    assert_eq!(quantity_of(&system.store, reserved.id).await, 0);
    assert_eq!(quantity_of(&system.store, contended.id).await, 0);

    system.shutdown().await.unwrap();
}
