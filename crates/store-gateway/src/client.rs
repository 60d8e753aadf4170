//! # Store Client
//!
//! [`StoreClient`] is the cloneable handle to a running [`StoreActor`](crate::StoreActor).
//! It implements [`StoreGateway`], so the checkout flow talks to the in-memory store
//! the same way it talks to PostgreSQL. [`MemoryUnit`] is its unit-of-work handle.

use crate::error::GatewayError;
use crate::gateway::{StoreGateway, UnitOfWork};
use crate::message::{Response, StoreRequest, UnitId};
use crate::model::{
    Order, OrderCreate, OrderId, OrderItemCreate, Product, ProductCreate, ProductId, Stock,
    StockCreate,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, warn};

/// Sends one request and waits for its reply.
async fn call<T>(
    sender: &mpsc::UnboundedSender<StoreRequest>,
    build: impl FnOnce(Response<T>) -> StoreRequest,
) -> Result<T, GatewayError> {
    let (respond_to, response) = oneshot::channel();
    sender
        .send(build(respond_to))
        .map_err(|_| GatewayError::StoreClosed)?;
    response.await.map_err(|_| GatewayError::StoreDropped)?
}

/// A type-safe client for the in-memory store.
///
/// * **Cloneable** – holds only a sender, so cloning is inexpensive.
/// * **Shutdown** – the store task ends once every client and every open
///   [`MemoryUnit`] has been dropped.
#[derive(Clone, Debug)]
pub struct StoreClient {
    sender: mpsc::UnboundedSender<StoreRequest>,
}

impl StoreClient {
    pub fn new(sender: mpsc::UnboundedSender<StoreRequest>) -> Self {
        Self { sender }
    }

    /// Inserts a catalog product.
    #[instrument(skip(self))]
    pub async fn create_product(&self, params: ProductCreate) -> Result<Product, GatewayError> {
        debug!("Sending request");
        call(&self.sender, |respond_to| StoreRequest::CreateProduct {
            params,
            respond_to,
        })
        .await
    }

    /// Inserts a stock row. The product must exist.
    #[instrument(skip(self))]
    pub async fn create_stock(&self, params: StockCreate) -> Result<Stock, GatewayError> {
        debug!("Sending request");
        call(&self.sender, |respond_to| StoreRequest::CreateStock {
            params,
            respond_to,
        })
        .await
    }

    /// Changes a product's catalog price. Orders already placed keep their price.
    #[instrument(skip(self))]
    pub async fn set_price(&self, id: ProductId, price: Decimal) -> Result<Product, GatewayError> {
        debug!("Sending request");
        call(&self.sender, |respond_to| StoreRequest::SetPrice {
            id,
            price,
            respond_to,
        })
        .await
    }
}

#[async_trait]
impl StoreGateway for StoreClient {
    type Unit = MemoryUnit;

    #[instrument(skip(self))]
    async fn begin(&self) -> Result<MemoryUnit, GatewayError> {
        let id = call(&self.sender, |respond_to| StoreRequest::Begin { respond_to }).await?;
        debug!(unit = %id, "Unit of work opened");
        Ok(MemoryUnit {
            id,
            sender: self.sender.clone(),
            open: true,
        })
    }

    #[instrument(skip(self))]
    async fn product_by_id(&self, id: ProductId) -> Result<Product, GatewayError> {
        call(&self.sender, |respond_to| StoreRequest::GetProduct { id, respond_to }).await
    }

    #[instrument(skip(self, unit), fields(unit = %unit.id))]
    async fn stock_for_update(
        &self,
        unit: &mut MemoryUnit,
        product_id: ProductId,
        min_quantity: u32,
    ) -> Result<Stock, GatewayError> {
        let unit = unit.id;
        call(&self.sender, |respond_to| StoreRequest::LockStock {
            unit,
            product_id,
            min_quantity,
            respond_to,
        })
        .await
    }

    #[instrument(skip(self, unit, stock), fields(unit = %unit.id, stock_id = %stock.id))]
    async fn update_stock(&self, unit: &mut MemoryUnit, stock: &Stock) -> Result<(), GatewayError> {
        let unit = unit.id;
        let stock = stock.clone();
        call(&self.sender, |respond_to| StoreRequest::UpdateStock {
            unit,
            stock,
            respond_to,
        })
        .await
    }

    #[instrument(skip(self, unit, order, items), fields(unit = %unit.id, items = items.len()))]
    async fn create_order(
        &self,
        unit: &mut MemoryUnit,
        order: OrderCreate,
        items: Vec<OrderItemCreate>,
    ) -> Result<Order, GatewayError> {
        let unit = unit.id;
        call(&self.sender, |respond_to| StoreRequest::CreateOrder {
            unit,
            order,
            items,
            respond_to,
        })
        .await
    }

    #[instrument(skip(self))]
    async fn stocks_for_product(&self, product_id: ProductId) -> Result<Vec<Stock>, GatewayError> {
        call(&self.sender, |respond_to| StoreRequest::StocksForProduct {
            product_id,
            respond_to,
        })
        .await
    }

    #[instrument(skip(self))]
    async fn order_by_id(&self, id: OrderId) -> Result<Order, GatewayError> {
        call(&self.sender, |respond_to| StoreRequest::GetOrder { id, respond_to }).await
    }
}

/// Unit-of-work handle for the in-memory store.
///
/// Dropping a handle that was neither committed nor rolled back sends a rollback, so
/// an early return or a panic never leaves row locks behind.
#[derive(Debug)]
pub struct MemoryUnit {
    id: UnitId,
    sender: mpsc::UnboundedSender<StoreRequest>,
    open: bool,
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn commit(self) -> Result<(), GatewayError> {
        let mut unit = self;
        let id = unit.id;
        let result = call(&unit.sender, |respond_to| StoreRequest::Commit {
            unit: id,
            respond_to,
        })
        .await;
        // Only now: a commit future dropped before it ran must still roll back.
        unit.open = false;
        result
    }

    async fn rollback(self) -> Result<(), GatewayError> {
        let mut unit = self;
        let id = unit.id;
        let result = call(&unit.sender, |respond_to| StoreRequest::Rollback {
            unit: id,
            respond_to: Some(respond_to),
        })
        .await;
        unit.open = false;
        result
    }
}

impl Drop for MemoryUnit {
    fn drop(&mut self) {
        if self.open {
            warn!(unit = %self.id, "Unit of work dropped while open, rolling back");
            let _ = self.sender.send(StoreRequest::Rollback {
                unit: self.id,
                respond_to: None,
            });
        }
    }
}
