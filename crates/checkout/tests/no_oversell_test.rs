//! Concurrent checkouts against one stock row never reserve more than it holds.

use checkout::checkout::{CheckoutError, CheckoutItem, CheckoutRequest};
use checkout::lifecycle::CheckoutSystem;
use proptest::prelude::*;
use rust_decimal::Decimal;
use store_gateway::model::{ProductCreate, StockCreate, UserId, WarehouseId};
use store_gateway::StoreGateway;

/// Runs every request concurrently and returns the reserved total and the final quantity.
async fn run_checkouts(initial: u32, quantities: Vec<u32>) -> (u32, u32) {
    let system = CheckoutSystem::new();
    let product = system
        .store
        .create_product(ProductCreate::new("Widget", Decimal::ONE))
        .await
        .unwrap();
    system
        .store
        .create_stock(StockCreate {
            product_id: product.id,
            warehouse_id: WarehouseId(1),
            quantity: initial,
        })
        .await
        .unwrap();

    let tasks: Vec<_> = quantities
        .into_iter()
        .enumerate()
        .map(|(user, quantity)| {
            let service = system.checkout.clone();
            let request = CheckoutRequest::new(
                UserId(user as u64),
                vec![CheckoutItem::new(product.id, quantity)],
            );
            tokio::spawn(async move { (quantity, service.checkout(request).await) })
        })
        .collect();

    let mut reserved = 0;
    for task in tasks {
        match task.await.unwrap() {
            (quantity, Ok(_)) => reserved += quantity,
            (_, Err(CheckoutError::InsufficientStock(_))) => {}
            (_, Err(e)) => panic!("Unexpected checkout error: {e}"),
        }
    }
    let remaining = system.store.stocks_for_product(product.id).await.unwrap()[0].quantity;
    system.shutdown().await.unwrap();
    (reserved, remaining)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_no_oversell(initial in 0u32..20, quantities in prop::collection::vec(1u32..8, 1..10)) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        let (reserved, remaining) = runtime.block_on(run_checkouts(initial, quantities));

        prop_assert!(reserved <= initial);
        prop_assert_eq!(remaining, initial - reserved);
    }
}
