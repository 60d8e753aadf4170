//! # Gateway Contract
//!
//! [`StoreGateway`] is the seam between the checkout flow and persistence. The
//! operations that must be atomic take a `&mut Self::Unit`, the backend's
//! [`UnitOfWork`] handle.
//!
//! ## Unit of work as a scoped handle
//!
//! A unit of work is opened by [`StoreGateway::begin`] and closed exactly once, by
//! [`UnitOfWork::commit`] or [`UnitOfWork::rollback`]. Both consume the handle, so a
//! closed unit cannot be used again. A handle that is dropped while still open (early
//! return, panic unwinding, a cancelled future) rolls back.
//!
//! ```rust,ignore
//! let mut unit = gateway.begin().await?;
//! let mut stock = gateway.stock_for_update(&mut unit, product_id, 3).await?;
//! stock.quantity -= 3;
//! gateway.update_stock(&mut unit, &stock).await?;
//! unit.commit().await?;
//! ```

use crate::error::GatewayError;
use crate::model::{Order, OrderCreate, OrderId, OrderItemCreate, Product, ProductId, Stock};
use async_trait::async_trait;

/// A transactional context. Writes made through it become visible to others only on
/// [`commit`](UnitOfWork::commit).
#[async_trait]
pub trait UnitOfWork: Send + Sized {
    /// Makes every write of this unit durable and releases its row locks.
    async fn commit(self) -> Result<(), GatewayError>;

    /// Discards every write of this unit and releases its row locks.
    async fn rollback(self) -> Result<(), GatewayError>;
}

/// Persistence operations used by checkout.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// The backend's unit-of-work handle.
    type Unit: UnitOfWork;

    /// Opens a unit of work.
    async fn begin(&self) -> Result<Self::Unit, GatewayError>;

    /// Reads a product by identifier. `NotFound` when it does not exist.
    async fn product_by_id(&self, id: ProductId) -> Result<Product, GatewayError>;

    /// Reads and exclusively locks the first stock row of `product_id` holding at least
    /// `min_quantity`. The lock lives until `unit` ends; concurrent units asking for the
    /// same product wait for it.
    ///
    /// Returns `NotFound` when the product has no stock row *or* no row holds enough.
    async fn stock_for_update(
        &self,
        unit: &mut Self::Unit,
        product_id: ProductId,
        min_quantity: u32,
    ) -> Result<Stock, GatewayError>;

    /// Writes the full state of `stock` within `unit`.
    async fn update_stock(&self, unit: &mut Self::Unit, stock: &Stock) -> Result<(), GatewayError>;

    /// Inserts the order, then its items with the newly assigned order reference.
    async fn create_order(
        &self,
        unit: &mut Self::Unit,
        order: OrderCreate,
        items: Vec<OrderItemCreate>,
    ) -> Result<Order, GatewayError>;

    /// Committed stock rows of a product, ordered by identifier. Takes no locks.
    async fn stocks_for_product(&self, product_id: ProductId) -> Result<Vec<Stock>, GatewayError>;

    /// A committed order with its items. `NotFound` when it does not exist.
    async fn order_by_id(&self, id: OrderId) -> Result<Order, GatewayError>;
}
