//! # Checkout Orchestrator
//!
//! [`CheckoutService`] turns a [`CheckoutRequest`] into a persisted [`Order`] inside one
//! unit of work:
//!
//! 1. take the admission lock (shared by every clone of the service)
//! 2. `begin`
//! 3. for each item, in request order: look up the product, lock a stock row with
//!    enough quantity, snapshot the price into a line item, write the decremented row
//! 4. `create_order` with all line items
//! 5. `commit`
//!
//! Any failure rolls the unit back before the error is returned, so a rejected checkout
//! leaves no decrement and no order behind. A panic or a dropped future rolls back
//! through the unit's `Drop`.
//!
//! The service is generic over [`StoreGateway`], so the same flow runs on the in-memory
//! store, on PostgreSQL and on [`MockStore`](store_gateway::mock::MockStore).

mod error;
mod phase;
mod request;

pub use error::CheckoutError;
pub use phase::CheckoutPhase;
pub use request::{CheckoutItem, CheckoutRequest, RequestError};

use std::sync::Arc;
use store_gateway::model::{Order, OrderCreate, OrderItemCreate};
use store_gateway::{GatewayError, StoreGateway, UnitOfWork};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Runs checkouts against a [`StoreGateway`]. Clones share one admission lock.
#[derive(Clone)]
pub struct CheckoutService<G> {
    gateway: G,
    admission: Arc<Mutex<()>>,
}

impl<G: StoreGateway> CheckoutService<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            admission: Arc::new(Mutex::new(())),
        }
    }

    /// The gateway checkouts run against. Useful for read-backs.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Reserves stock for every item and persists the order, or changes nothing.
    ///
    /// Checkouts through clones of one service run one at a time.
    #[instrument(
        skip(self, request),
        fields(user_id = %request.user_id, items = request.items.len())
    )]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<Order, CheckoutError> {
        let _admission = self.admission.lock().await;
        info!(phase = %CheckoutPhase::Started, "Checkout started");

        let mut unit = match self.gateway.begin().await {
            Ok(unit) => unit,
            Err(e) => {
                warn!(phase = %CheckoutPhase::Aborted, error = %e, "Failed to begin unit of work");
                return Err(e.into());
            }
        };

        let order = match self.reserve_and_persist(&mut unit, &request).await {
            Ok(order) => order,
            Err(e) => {
                if let Err(rollback_err) = unit.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                warn!(phase = %CheckoutPhase::Aborted, error = %e, "Checkout aborted");
                return Err(e);
            }
        };

        if let Err(e) = unit.commit().await {
            warn!(phase = %CheckoutPhase::Aborted, error = %e, "Commit failed");
            return Err(e.into());
        }
        info!(
            phase = %CheckoutPhase::Committed,
            order_id = %order.id,
            total = %order.total(),
            "Checkout committed"
        );
        Ok(order)
    }

    async fn reserve_and_persist(
        &self,
        unit: &mut G::Unit,
        request: &CheckoutRequest,
    ) -> Result<Order, CheckoutError> {
        let order = OrderCreate::pending(request.user_id);
        let mut items = Vec::with_capacity(request.items.len());

        for item in &request.items {
            debug!(
                phase = %CheckoutPhase::Validating,
                product_id = %item.product_id,
                quantity = item.quantity,
                "Validating item"
            );
            let product = self
                .gateway
                .product_by_id(item.product_id)
                .await
                .map_err(|e| match e {
                    GatewayError::NotFound(_) => CheckoutError::ProductNotFound(item.product_id),
                    other => other.into(),
                })?;

            // Not found covers both a missing row and too little quantity.
            let mut stock = self
                .gateway
                .stock_for_update(unit, item.product_id, item.quantity)
                .await
                .map_err(|e| match e {
                    GatewayError::NotFound(_) => {
                        CheckoutError::InsufficientStock(product.name.clone())
                    }
                    other => other.into(),
                })?;

            items.push(OrderItemCreate {
                warehouse_id: stock.warehouse_id,
                product_id: product.id,
                quantity: item.quantity,
                price: product.price,
            });

            stock.quantity = stock
                .quantity
                .checked_sub(item.quantity)
                .ok_or_else(|| CheckoutError::InsufficientStock(product.name.clone()))?;
            self.gateway.update_stock(unit, &stock).await?;
            debug!(
                phase = %CheckoutPhase::Reserved,
                stock_id = %stock.id,
                remaining = stock.quantity,
                "Stock reserved"
            );
        }

        info!(phase = %CheckoutPhase::Persisting, items = items.len(), "Persisting order");
        Ok(self.gateway.create_order(unit, order, items).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use store_gateway::mock::{MockStore, UnitEvent};
    use store_gateway::model::{
        OrderId, OrderItem, OrderItemId, OrderStatus, Product, ProductId, Stock, StockId,
        UserId, WarehouseId,
    };

    fn widget() -> Product {
        Product {
            id: ProductId(1),
            name: "Widget".to_string(),
            price: Decimal::new(1000, 2),
        }
    }

    fn widget_stock(quantity: u32) -> Stock {
        Stock {
            id: StockId(1),
            product_id: ProductId(1),
            warehouse_id: WarehouseId(1),
            quantity,
        }
    }

    fn placed_order(quantity: u32) -> Order {
        Order {
            id: OrderId(1),
            user_id: UserId(1),
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            items: vec![OrderItem {
                id: OrderItemId(1),
                order_id: OrderId(1),
                warehouse_id: WarehouseId(1),
                product_id: ProductId(1),
                quantity,
                price: Decimal::new(1000, 2),
            }],
        }
    }

    fn one_widget(quantity: u32) -> CheckoutRequest {
        CheckoutRequest::new(UserId(1), vec![CheckoutItem::new(ProductId(1), quantity)])
    }

    /// Scripts begin, product lookup and locked read for a single widget line.
    fn script_reservation(mock: &mut MockStore, available: u32) {
        mock.expect_begin().return_ok(());
        mock.expect_product(ProductId(1)).return_ok(widget());
        mock.expect_stock_for_update(ProductId(1))
            .return_ok(widget_stock(available));
    }

    #[tokio::test]
    async fn test_checkout_commits_on_success() {
        let mut mock = MockStore::new();
        script_reservation(&mut mock, 5);
        mock.expect_update_stock().return_ok(());
        mock.expect_create_order().return_ok(placed_order(2));

        let service = CheckoutService::new(mock.clone());
        let order = service.checkout(one_widget(2)).await.unwrap();

        assert_eq!(order.id, OrderId(1));
        assert_eq!(mock.unit_events(), vec![UnitEvent::Committed]);
        mock.verify();
    }

    #[tokio::test]
    async fn test_unknown_product_rolls_back() {
        let mut mock = MockStore::new();
        mock.expect_begin().return_ok(());
        mock.expect_product(ProductId(1))
            .return_err(GatewayError::NotFound("product_1".into()));

        let service = CheckoutService::new(mock.clone());
        let result = service.checkout(one_widget(1)).await;

        assert_eq!(result, Err(CheckoutError::ProductNotFound(ProductId(1))));
        assert_eq!(mock.unit_events(), vec![UnitEvent::RolledBack]);
        mock.verify();
    }

    #[tokio::test]
    async fn test_missing_stock_is_insufficient_stock() {
        let mut mock = MockStore::new();
        mock.expect_begin().return_ok(());
        mock.expect_product(ProductId(1)).return_ok(widget());
        mock.expect_stock_for_update(ProductId(1))
            .return_err(GatewayError::NotFound("stock".into()));

        let service = CheckoutService::new(mock.clone());
        let result = service.checkout(one_widget(3)).await;

        assert_eq!(
            result,
            Err(CheckoutError::InsufficientStock("Widget".to_string()))
        );
        assert_eq!(mock.unit_events(), vec![UnitEvent::RolledBack]);
    }

    #[tokio::test]
    async fn test_update_failure_rolls_back() {
        let mut mock = MockStore::new();
        script_reservation(&mut mock, 5);
        mock.expect_update_stock()
            .return_err(GatewayError::Storage("deadlock detected".into()));

        let service = CheckoutService::new(mock.clone());
        let result = service.checkout(one_widget(2)).await;

        assert!(matches!(result, Err(CheckoutError::Storage(msg)) if msg.contains("deadlock")));
        assert_eq!(mock.unit_events(), vec![UnitEvent::RolledBack]);
        mock.verify();
    }

    #[tokio::test]
    async fn test_create_order_failure_rolls_back() {
        let mut mock = MockStore::new();
        script_reservation(&mut mock, 5);
        mock.expect_update_stock().return_ok(());
        mock.expect_create_order()
            .return_err(GatewayError::Storage("foreign key violation".into()));

        let service = CheckoutService::new(mock.clone());
        let result = service.checkout(one_widget(2)).await;

        assert!(matches!(result, Err(CheckoutError::Storage(_))));
        assert_eq!(mock.unit_events(), vec![UnitEvent::RolledBack]);
    }

    #[tokio::test]
    async fn test_rollback_failure_keeps_original_error() {
        let mut mock = MockStore::new();
        script_reservation(&mut mock, 5);
        mock.expect_update_stock()
            .return_err(GatewayError::Storage("write failed".into()));
        mock.expect_rollback()
            .return_err(GatewayError::Storage("connection reset".into()));

        let service = CheckoutService::new(mock.clone());
        let result = service.checkout(one_widget(2)).await;

        assert_eq!(
            result,
            Err(CheckoutError::Storage("write failed".to_string()))
        );
        mock.verify();
    }

    #[tokio::test]
    async fn test_commit_failure_is_storage_error() {
        let mut mock = MockStore::new();
        script_reservation(&mut mock, 5);
        mock.expect_update_stock().return_ok(());
        mock.expect_create_order().return_ok(placed_order(2));
        mock.expect_commit()
            .return_err(GatewayError::Storage("serialization failure".into()));

        let service = CheckoutService::new(mock.clone());
        let result = service.checkout(one_widget(2)).await;

        assert!(matches!(result, Err(CheckoutError::Storage(msg)) if msg.contains("serialization")));
        assert!(!mock.unit_events().contains(&UnitEvent::Committed));
        mock.verify();
    }

    #[tokio::test]
    async fn test_begin_failure_touches_nothing() {
        let mut mock = MockStore::new();
        mock.expect_begin().return_err(GatewayError::StoreClosed);

        let service = CheckoutService::new(mock.clone());
        let result = service.checkout(one_widget(1)).await;

        assert!(matches!(result, Err(CheckoutError::Storage(_))));
        assert!(mock.unit_events().is_empty());
        mock.verify();
    }

    #[tokio::test]
    async fn test_panic_inside_unit_rolls_back_on_drop() {
        let mut mock = MockStore::new();
        mock.expect_begin().return_ok(());
        mock.expect_panic("storage driver crashed");

        let service = CheckoutService::new(mock.clone());
        let join = tokio::spawn(async move { service.checkout(one_widget(1)).await }).await;

        assert!(join.unwrap_err().is_panic());
        assert_eq!(mock.unit_events(), vec![UnitEvent::DroppedOpen]);
    }

    #[tokio::test]
    async fn test_admission_lock_is_released_after_panic() {
        let mut mock = MockStore::new();
        mock.expect_begin().return_ok(());
        mock.expect_panic("first checkout crashed");
        script_reservation(&mut mock, 5);
        mock.expect_update_stock().return_ok(());
        mock.expect_create_order().return_ok(placed_order(1));

        let service = CheckoutService::new(mock.clone());
        let crashing = service.clone();
        let join = tokio::spawn(async move { crashing.checkout(one_widget(1)).await }).await;
        assert!(join.is_err());

        let order = service.checkout(one_widget(1)).await.unwrap();
        assert_eq!(order.items[0].quantity, 1);
        assert_eq!(
            mock.unit_events(),
            vec![UnitEvent::DroppedOpen, UnitEvent::Committed]
        );
    }
}
