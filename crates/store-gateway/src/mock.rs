//! # Mock Store & Testing Guide
//!
//! [`MockStore`] implements [`StoreGateway`] from a script of expectations instead of
//! real tables. Use it to reach failure paths that are awkward to provoke with the
//! in-memory store: a stock update that fails, an order insert that hits a constraint,
//! a commit that loses its connection, or a panic in the middle of a unit of work.
//!
//! | | MockStore | StoreActor |
//! |---|---|---|
//! | **State** | None (scripted replies) | Real tables and row locks |
//! | **Error injection** | `return_err`, `expect_panic` | Only what the data allows |
//! | **Use case** | Failure handling around the gateway | Behaviour of the store itself, end to end |
//!
//! Expectations are consumed in order. A call that does not match the next expectation
//! panics, as does a call with no expectation left. Commit and rollback succeed without
//! being scripted unless an [`expect_commit`](MockStore::expect_commit) or
//! [`expect_rollback`](MockStore::expect_rollback) is next in line; every commit,
//! rollback and open drop is recorded in [`unit_events`](MockStore::unit_events).
//!
//! ```rust
//! use store_gateway::mock::{MockStore, UnitEvent};
//! use store_gateway::model::ProductId;
//! use store_gateway::{GatewayError, StoreGateway, UnitOfWork};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut mock = MockStore::new();
//!     mock.expect_begin().return_ok(());
//!     mock.expect_product(ProductId(1))
//!         .return_err(GatewayError::Storage("connection reset".into()));
//!
//!     let unit = mock.begin().await.unwrap();
//!     assert!(mock.product_by_id(ProductId(1)).await.is_err());
//!     unit.rollback().await.unwrap();
//!
//!     mock.verify();
//!     assert_eq!(mock.unit_events(), vec![UnitEvent::RolledBack]);
//! }
//! ```

use crate::error::GatewayError;
use crate::gateway::{StoreGateway, UnitOfWork};
use crate::model::{Order, OrderCreate, OrderId, OrderItemCreate, Product, ProductId, Stock};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A scripted reply.
enum Expectation {
    Begin {
        response: Result<(), GatewayError>,
    },
    Product {
        id: ProductId,
        response: Result<Product, GatewayError>,
    },
    LockStock {
        product_id: ProductId,
        response: Result<Stock, GatewayError>,
    },
    UpdateStock {
        response: Result<(), GatewayError>,
    },
    CreateOrder {
        response: Result<Order, GatewayError>,
    },
    Commit {
        response: Result<(), GatewayError>,
    },
    Rollback {
        response: Result<(), GatewayError>,
    },
    Stocks {
        product_id: ProductId,
        response: Result<Vec<Stock>, GatewayError>,
    },
    Order {
        id: OrderId,
        response: Result<Order, GatewayError>,
    },
    Panic {
        message: String,
    },
}

type Script = Arc<Mutex<VecDeque<Expectation>>>;

/// What happened to a unit of work handed out by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitEvent {
    Committed,
    RolledBack,
    /// The handle was dropped while still open (early return or panic).
    DroppedOpen,
}

/// A scripted [`StoreGateway`].
#[derive(Clone, Default)]
pub struct MockStore {
    expectations: Script,
    events: Arc<Mutex<Vec<UnitEvent>>>,
}

impl MockStore {
    /// Creates a mock with no expectations.
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self, call: &str) -> Expectation {
        let next = self.expectations.lock().unwrap().pop_front();
        match next {
            Some(Expectation::Panic { message }) => panic!("{message}"),
            Some(expectation) => expectation,
            None => panic!("Unexpected {call}: no expectations left"),
        }
    }

    fn builder<T: 'static>(
        &self,
        wrap: impl FnOnce(Result<T, GatewayError>) -> Expectation + Send + 'static,
    ) -> ExpectationBuilder<T> {
        ExpectationBuilder {
            expectations: self.expectations.clone(),
            wrap: Box::new(wrap),
        }
    }

    /// Expects a `begin`.
    pub fn expect_begin(&mut self) -> ExpectationBuilder<()> {
        self.builder(|response| Expectation::Begin { response })
    }

    /// Expects a `product_by_id` for `id`.
    pub fn expect_product(&mut self, id: ProductId) -> ExpectationBuilder<Product> {
        self.builder(move |response| Expectation::Product { id, response })
    }

    /// Expects a `stock_for_update` for `product_id`.
    pub fn expect_stock_for_update(&mut self, product_id: ProductId) -> ExpectationBuilder<Stock> {
        self.builder(move |response| Expectation::LockStock {
            product_id,
            response,
        })
    }

    /// Expects an `update_stock`.
    pub fn expect_update_stock(&mut self) -> ExpectationBuilder<()> {
        self.builder(|response| Expectation::UpdateStock { response })
    }

    /// Expects a `create_order`.
    pub fn expect_create_order(&mut self) -> ExpectationBuilder<Order> {
        self.builder(|response| Expectation::CreateOrder { response })
    }

    /// Scripts the reply of the next commit.
    pub fn expect_commit(&mut self) -> ExpectationBuilder<()> {
        self.builder(|response| Expectation::Commit { response })
    }

    /// Scripts the reply of the next rollback.
    pub fn expect_rollback(&mut self) -> ExpectationBuilder<()> {
        self.builder(|response| Expectation::Rollback { response })
    }

    /// Expects a `stocks_for_product` for `product_id`.
    pub fn expect_stocks(&mut self, product_id: ProductId) -> ExpectationBuilder<Vec<Stock>> {
        self.builder(move |response| Expectation::Stocks {
            product_id,
            response,
        })
    }

    /// Expects an `order_by_id` for `id`.
    pub fn expect_order(&mut self, id: OrderId) -> ExpectationBuilder<Order> {
        self.builder(move |response| Expectation::Order { id, response })
    }

    /// The next gateway call, whichever it is, panics with `message`.
    pub fn expect_panic(&mut self, message: impl Into<String>) {
        self.expectations
            .lock()
            .unwrap()
            .push_back(Expectation::Panic {
                message: message.into(),
            });
    }

    /// Commits, rollbacks and open drops seen so far, in order.
    pub fn unit_events(&self) -> Vec<UnitEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let exps = self.expectations.lock().unwrap();
        if !exps.is_empty() {
            panic!("Not all expectations were met. {} remaining", exps.len());
        }
    }
}

/// Fluent builder returned by the `expect_*` methods.
pub struct ExpectationBuilder<T> {
    expectations: Script,
    wrap: Box<dyn FnOnce(Result<T, GatewayError>) -> Expectation + Send>,
}

impl<T> ExpectationBuilder<T> {
    /// Sets the expectation to return a successful result.
    pub fn return_ok(self, value: T) {
        let expectation = (self.wrap)(Ok(value));
        self.expectations.lock().unwrap().push_back(expectation);
    }

    /// Sets the expectation to return an error.
    pub fn return_err(self, error: GatewayError) {
        let expectation = (self.wrap)(Err(error));
        self.expectations.lock().unwrap().push_back(expectation);
    }
}

#[async_trait]
impl StoreGateway for MockStore {
    type Unit = MockUnit;

    async fn begin(&self) -> Result<MockUnit, GatewayError> {
        match self.next("begin") {
            Expectation::Begin { response } => response.map(|()| MockUnit {
                expectations: self.expectations.clone(),
                events: self.events.clone(),
                open: true,
            }),
            _ => panic!("Expectation mismatch: begin"),
        }
    }

    async fn product_by_id(&self, id: ProductId) -> Result<Product, GatewayError> {
        match self.next("product_by_id") {
            Expectation::Product {
                id: expected,
                response,
            } => {
                assert_eq!(id, expected, "product_by_id called with the wrong id");
                response
            }
            _ => panic!("Expectation mismatch: product_by_id({id})"),
        }
    }

    async fn stock_for_update(
        &self,
        _unit: &mut MockUnit,
        product_id: ProductId,
        _min_quantity: u32,
    ) -> Result<Stock, GatewayError> {
        match self.next("stock_for_update") {
            Expectation::LockStock {
                product_id: expected,
                response,
            } => {
                assert_eq!(product_id, expected, "stock_for_update called with the wrong product");
                response
            }
            _ => panic!("Expectation mismatch: stock_for_update({product_id})"),
        }
    }

    async fn update_stock(&self, _unit: &mut MockUnit, stock: &Stock) -> Result<(), GatewayError> {
        match self.next("update_stock") {
            Expectation::UpdateStock { response } => response,
            _ => panic!("Expectation mismatch: update_stock({})", stock.id),
        }
    }

    async fn create_order(
        &self,
        _unit: &mut MockUnit,
        _order: OrderCreate,
        _items: Vec<OrderItemCreate>,
    ) -> Result<Order, GatewayError> {
        match self.next("create_order") {
            Expectation::CreateOrder { response } => response,
            _ => panic!("Expectation mismatch: create_order"),
        }
    }

    async fn stocks_for_product(&self, product_id: ProductId) -> Result<Vec<Stock>, GatewayError> {
        match self.next("stocks_for_product") {
            Expectation::Stocks {
                product_id: expected,
                response,
            } => {
                assert_eq!(product_id, expected, "stocks_for_product called with the wrong product");
                response
            }
            _ => panic!("Expectation mismatch: stocks_for_product({product_id})"),
        }
    }

    async fn order_by_id(&self, id: OrderId) -> Result<Order, GatewayError> {
        match self.next("order_by_id") {
            Expectation::Order {
                id: expected,
                response,
            } => {
                assert_eq!(id, expected, "order_by_id called with the wrong id");
                response
            }
            _ => panic!("Expectation mismatch: order_by_id({id})"),
        }
    }
}

/// Unit-of-work handle handed out by [`MockStore`].
pub struct MockUnit {
    expectations: Script,
    events: Arc<Mutex<Vec<UnitEvent>>>,
    open: bool,
}

impl MockUnit {
    /// Pops a scripted commit/rollback reply if one is next in line.
    fn scripted(&self, commit: bool) -> Result<(), GatewayError> {
        let mut exps = self.expectations.lock().unwrap();
        match exps.front() {
            Some(Expectation::Commit { .. }) if commit => {}
            Some(Expectation::Rollback { .. }) if !commit => {}
            _ => return Ok(()),
        }
        match exps.pop_front() {
            Some(Expectation::Commit { response }) | Some(Expectation::Rollback { response }) => {
                response
            }
            _ => Ok(()),
        }
    }

    fn record(&self, event: UnitEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl UnitOfWork for MockUnit {
    async fn commit(self) -> Result<(), GatewayError> {
        let mut unit = self;
        unit.open = false;
        let result = unit.scripted(true);
        if result.is_ok() {
            unit.record(UnitEvent::Committed);
        }
        result
    }

    async fn rollback(self) -> Result<(), GatewayError> {
        let mut unit = self;
        unit.open = false;
        unit.record(UnitEvent::RolledBack);
        unit.scripted(false)
    }
}

impl Drop for MockUnit {
    fn drop(&mut self) {
        if self.open {
            // Poisoned by the panic that caused the drop; record anyway.
            let mut events = self
                .events
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            events.push(UnitEvent::DroppedOpen);
        }
    }
}
