//! # Store Messages
//!
//! Requests sent from a [`StoreClient`](crate::StoreClient) (or a
//! [`MemoryUnit`](crate::MemoryUnit)) to the [`StoreActor`](crate::StoreActor). Each
//! request carries a oneshot `respond_to` channel for its reply.

use crate::error::GatewayError;
use crate::model::{
    Order, OrderCreate, OrderId, OrderItemCreate, Product, ProductCreate, ProductId, Stock,
    StockCreate,
};
use rust_decimal::Decimal;
use std::fmt::Display;
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by the store.
pub type Response<T> = oneshot::Sender<Result<T, GatewayError>>;

/// Identifier of an open unit of work inside the in-memory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(pub u64);

impl Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unit_{}", self.0)
    }
}

/// Everything the store actor can be asked to do.
///
/// The first group seeds and adjusts the catalog outside any unit of work. The unit of
/// work group mirrors [`StoreGateway`](crate::StoreGateway). The last group are pure
/// reads of committed state.
#[derive(Debug)]
pub enum StoreRequest {
    CreateProduct {
        params: ProductCreate,
        respond_to: Response<Product>,
    },
    CreateStock {
        params: StockCreate,
        respond_to: Response<Stock>,
    },
    SetPrice {
        id: ProductId,
        price: Decimal,
        respond_to: Response<Product>,
    },

    Begin {
        respond_to: Response<UnitId>,
    },
    LockStock {
        unit: UnitId,
        product_id: ProductId,
        min_quantity: u32,
        respond_to: Response<Stock>,
    },
    UpdateStock {
        unit: UnitId,
        stock: Stock,
        respond_to: Response<()>,
    },
    CreateOrder {
        unit: UnitId,
        order: OrderCreate,
        items: Vec<OrderItemCreate>,
        respond_to: Response<Order>,
    },
    Commit {
        unit: UnitId,
        respond_to: Response<()>,
    },
    /// `respond_to` is `None` when the rollback comes from a dropped handle.
    Rollback {
        unit: UnitId,
        respond_to: Option<Response<()>>,
    },

    GetProduct {
        id: ProductId,
        respond_to: Response<Product>,
    },
    StocksForProduct {
        product_id: ProductId,
        respond_to: Response<Vec<Stock>>,
    },
    GetOrder {
        id: OrderId,
        respond_to: Response<Order>,
    },
}
