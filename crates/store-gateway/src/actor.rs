//! # In-Memory Store
//!
//! This module defines the [`StoreActor`], a single Tokio task that owns the four
//! checkout tables and a row-lock table. It is the "server" half of the in-memory
//! backend; [`StoreClient`] is the handle the rest of the system holds.
//!
//! Requests are processed one at a time, so the tables themselves need no `Mutex`.
//! Row locks are bookkeeping inside the task: a lock request that cannot be granted
//! yet is parked in a FIFO wait queue and answered when the holding unit of work
//! commits or rolls back.

use crate::client::StoreClient;
use crate::error::GatewayError;
use crate::message::{Response, StoreRequest, UnitId};
use crate::model::{
    Order, OrderCreate, OrderId, OrderItem, OrderItemCreate, OrderItemId, Product,
    ProductCreate, ProductId, Stock, StockCreate, StockId,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Committed state. `BTreeMap` keeps scans in identifier order.
#[derive(Default)]
struct Tables {
    products: BTreeMap<ProductId, Product>,
    stocks: BTreeMap<StockId, Stock>,
    orders: BTreeMap<OrderId, Order>,
    order_items: BTreeMap<OrderItemId, OrderItem>,
}

/// Uncommitted writes of one open unit of work.
#[derive(Default)]
struct UnitState {
    stock_writes: BTreeMap<StockId, Stock>,
    orders: Vec<Order>,
}

/// A request that is blocked on a row lock held by another unit.
enum Pending {
    Lock {
        unit: UnitId,
        product_id: ProductId,
        min_quantity: u32,
        respond_to: Response<Stock>,
    },
    Update {
        unit: UnitId,
        stock: Stock,
        respond_to: Response<()>,
    },
}

impl Pending {
    fn unit(&self) -> UnitId {
        match self {
            Pending::Lock { unit, .. } | Pending::Update { unit, .. } => *unit,
        }
    }

    fn waits_for(&self) -> WaitsFor {
        match self {
            Pending::Lock { product_id, .. } => WaitsFor::Product(*product_id),
            Pending::Update { stock, .. } => WaitsFor::Row(stock.id),
        }
    }

    fn fail(self, error: GatewayError) {
        match self {
            Pending::Lock { respond_to, .. } => {
                let _ = respond_to.send(Err(error));
            }
            Pending::Update { respond_to, .. } => {
                let _ = respond_to.send(Err(error));
            }
        }
    }
}

/// The rows a parked request is blocked on.
#[derive(Clone, Copy)]
enum WaitsFor {
    /// Every stock row of the product.
    Product(ProductId),
    Row(StockId),
}

/// Monotonic identifier sources. Like database sequences, values handed out to a
/// unit that later rolls back are not reused.
struct Sequences {
    unit: u64,
    product: u64,
    stock: u64,
    order: u64,
    order_item: u64,
}

impl Default for Sequences {
    fn default() -> Self {
        Self {
            unit: 1,
            product: 1,
            stock: 1,
            order: 1,
            order_item: 1,
        }
    }
}

fn bump(counter: &mut u64) -> u64 {
    let id = *counter;
    *counter += 1;
    id
}

fn unit_not_open(unit: UnitId) -> GatewayError {
    GatewayError::Storage(format!("{unit} is not open"))
}

/// The in-memory store task.
///
/// # Usage Pattern
///
/// ```rust
/// use store_gateway::{StoreActor, StoreGateway, UnitOfWork};
/// use store_gateway::model::{ProductCreate, StockCreate, WarehouseId};
/// use rust_decimal::Decimal;
///
/// #[tokio::main]
/// async fn main() {
///     let (actor, store) = StoreActor::new();
///     tokio::spawn(actor.run());
///
///     let product = store
///         .create_product(ProductCreate::new("Widget", Decimal::new(1000, 2)))
///         .await
///         .unwrap();
///     store
///         .create_stock(StockCreate {
///             product_id: product.id,
///             warehouse_id: WarehouseId(1),
///             quantity: 5,
///         })
///         .await
///         .unwrap();
///
///     let mut unit = store.begin().await.unwrap();
///     let mut stock = store.stock_for_update(&mut unit, product.id, 3).await.unwrap();
///     stock.quantity -= 3;
///     store.update_stock(&mut unit, &stock).await.unwrap();
///     unit.commit().await.unwrap();
///
///     let stocks = store.stocks_for_product(product.id).await.unwrap();
///     assert_eq!(stocks[0].quantity, 2);
/// }
/// ```
///
/// # Lock semantics
///
/// * `LockStock` waits while *any* stock row of the product is held by another unit,
///   then picks the lowest-id row whose quantity, as this unit sees it, satisfies the
///   minimum. That row is locked; if none qualifies the answer is `NotFound`.
/// * `UpdateStock` locks the row if the unit does not hold it yet, waiting if another
///   unit does.
/// * `Commit` applies the unit's writes, `Rollback` discards them. Both release the
///   unit's locks and re-run the wait queue in arrival order.
/// * A request whose wait would close a cycle (unit 1 waits on unit 2, which waits on
///   unit 1) is answered at once with a `Storage` deadlock error instead of parking.
///   The other units keep waiting; the victim's caller is expected to roll back.
pub struct StoreActor {
    receiver: mpsc::UnboundedReceiver<StoreRequest>,
    tables: Tables,
    units: HashMap<UnitId, UnitState>,
    row_locks: HashMap<StockId, UnitId>,
    waiting: VecDeque<Pending>,
    sequences: Sequences,
}

impl StoreActor {
    /// Creates an empty store and the client used to reach it.
    ///
    /// The channel is unbounded so a [`MemoryUnit`](crate::MemoryUnit) dropped outside
    /// of an async context can still deliver its rollback.
    pub fn new() -> (Self, StoreClient) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let actor = Self {
            receiver,
            tables: Tables::default(),
            units: HashMap::new(),
            row_locks: HashMap::new(),
            waiting: VecDeque::new(),
            sequences: Sequences::default(),
        };
        (actor, StoreClient::new(sender))
    }

    /// Processes requests until every client (and every open unit handle) is dropped.
    pub async fn run(mut self) {
        info!("Store started");

        while let Some(msg) = self.receiver.recv().await {
            self.handle(msg);
        }

        if !self.units.is_empty() {
            warn!(open_units = self.units.len(), "Discarding open units of work");
        }
        info!(
            products = self.tables.products.len(),
            stocks = self.tables.stocks.len(),
            orders = self.tables.orders.len(),
            "Shutdown"
        );
    }

    fn handle(&mut self, msg: StoreRequest) {
        match msg {
            StoreRequest::CreateProduct { params, respond_to } => {
                debug!(?params, "CreateProduct");
                let id = ProductId(bump(&mut self.sequences.product));
                let product = Product {
                    id,
                    name: params.name,
                    price: params.price,
                };
                self.tables.products.insert(id, product.clone());
                info!(%id, size = self.tables.products.len(), "Product created");
                let _ = respond_to.send(Ok(product));
            }
            StoreRequest::CreateStock { params, respond_to } => {
                debug!(?params, "CreateStock");
                let _ = respond_to.send(self.create_stock(params));
            }
            StoreRequest::SetPrice {
                id,
                price,
                respond_to,
            } => {
                let result = match self.tables.products.get_mut(&id) {
                    Some(product) => {
                        product.price = price;
                        info!(%id, %price, "Price changed");
                        Ok(product.clone())
                    }
                    None => Err(GatewayError::NotFound(id.to_string())),
                };
                let _ = respond_to.send(result);
            }
            StoreRequest::Begin { respond_to } => {
                let unit = UnitId(bump(&mut self.sequences.unit));
                self.units.insert(unit, UnitState::default());
                debug!(%unit, open = self.units.len(), "Begin");
                let _ = respond_to.send(Ok(unit));
            }
            StoreRequest::LockStock {
                unit,
                product_id,
                min_quantity,
                respond_to,
            } => match self.try_lock_stock(unit, product_id, min_quantity) {
                Some(result) => {
                    let _ = respond_to.send(result);
                }
                None => {
                    debug!(%unit, %product_id, "Waiting for row lock");
                    self.waiting.push_back(Pending::Lock {
                        unit,
                        product_id,
                        min_quantity,
                        respond_to,
                    });
                    self.break_deadlocks();
                }
            },
            StoreRequest::UpdateStock {
                unit,
                stock,
                respond_to,
            } => match self.try_update_stock(unit, &stock) {
                Some(result) => {
                    let _ = respond_to.send(result);
                }
                None => {
                    debug!(%unit, stock_id = %stock.id, "Waiting for row lock");
                    self.waiting.push_back(Pending::Update {
                        unit,
                        stock,
                        respond_to,
                    });
                    self.break_deadlocks();
                }
            },
            StoreRequest::CreateOrder {
                unit,
                order,
                items,
                respond_to,
            } => {
                let _ = respond_to.send(self.stage_order(unit, order, items));
            }
            StoreRequest::Commit { unit, respond_to } => {
                let result = self.commit(unit);
                let _ = respond_to.send(result);
                self.wake_waiters();
            }
            StoreRequest::Rollback { unit, respond_to } => {
                let result = self.rollback(unit);
                if let Some(respond_to) = respond_to {
                    let _ = respond_to.send(result);
                }
                self.wake_waiters();
            }
            StoreRequest::GetProduct { id, respond_to } => {
                let result = self
                    .tables
                    .products
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| GatewayError::NotFound(id.to_string()));
                debug!(%id, found = result.is_ok(), "GetProduct");
                let _ = respond_to.send(result);
            }
            StoreRequest::StocksForProduct {
                product_id,
                respond_to,
            } => {
                let stocks = self
                    .tables
                    .stocks
                    .values()
                    .filter(|stock| stock.product_id == product_id)
                    .cloned()
                    .collect();
                let _ = respond_to.send(Ok(stocks));
            }
            StoreRequest::GetOrder { id, respond_to } => {
                let _ = respond_to.send(self.committed_order(id));
            }
        }
    }

    fn create_stock(&mut self, params: StockCreate) -> Result<Stock, GatewayError> {
        if !self.tables.products.contains_key(&params.product_id) {
            return Err(GatewayError::Storage(format!(
                "stock references unknown {}",
                params.product_id
            )));
        }
        let id = StockId(bump(&mut self.sequences.stock));
        let stock = Stock {
            id,
            product_id: params.product_id,
            warehouse_id: params.warehouse_id,
            quantity: params.quantity,
        };
        self.tables.stocks.insert(id, stock.clone());
        info!(%id, product_id = %stock.product_id, quantity = stock.quantity, "Stock created");
        Ok(stock)
    }

    fn held_by_other(&self, id: StockId, unit: UnitId) -> bool {
        matches!(self.row_locks.get(&id), Some(owner) if *owner != unit)
    }

    /// `None` means the request has to wait for another unit.
    fn try_lock_stock(
        &mut self,
        unit: UnitId,
        product_id: ProductId,
        min_quantity: u32,
    ) -> Option<Result<Stock, GatewayError>> {
        let Some(state) = self.units.get(&unit) else {
            return Some(Err(unit_not_open(unit)));
        };

        let rows: Vec<StockId> = self
            .tables
            .stocks
            .values()
            .filter(|stock| stock.product_id == product_id)
            .map(|stock| stock.id)
            .collect();
        if rows.iter().any(|id| self.held_by_other(*id, unit)) {
            return None;
        }

        let found = rows
            .iter()
            .filter_map(|id| {
                state
                    .stock_writes
                    .get(id)
                    .or_else(|| self.tables.stocks.get(id))
            })
            .find(|stock| stock.quantity >= min_quantity)
            .cloned();

        match found {
            Some(stock) => {
                self.row_locks.insert(stock.id, unit);
                debug!(%unit, stock_id = %stock.id, quantity = stock.quantity, "Row locked");
                Some(Ok(stock))
            }
            None => {
                debug!(%unit, %product_id, min_quantity, "No qualifying stock row");
                Some(Err(GatewayError::NotFound(format!(
                    "stock of {product_id} with quantity >= {min_quantity}"
                ))))
            }
        }
    }

    fn try_update_stock(&mut self, unit: UnitId, stock: &Stock) -> Option<Result<(), GatewayError>> {
        if !self.units.contains_key(&unit) {
            return Some(Err(unit_not_open(unit)));
        }
        if !self.tables.stocks.contains_key(&stock.id) {
            return Some(Err(GatewayError::NotFound(stock.id.to_string())));
        }
        if self.held_by_other(stock.id, unit) {
            return None;
        }

        self.row_locks.insert(stock.id, unit);
        if let Some(state) = self.units.get_mut(&unit) {
            state.stock_writes.insert(stock.id, stock.clone());
        }
        debug!(%unit, stock_id = %stock.id, quantity = stock.quantity, "Stock staged");
        Some(Ok(()))
    }

    fn stage_order(
        &mut self,
        unit: UnitId,
        order: OrderCreate,
        items: Vec<OrderItemCreate>,
    ) -> Result<Order, GatewayError> {
        if !self.units.contains_key(&unit) {
            return Err(unit_not_open(unit));
        }
        if items.is_empty() {
            return Err(GatewayError::Storage("order has no items".to_string()));
        }
        if let Some(item) = items
            .iter()
            .find(|item| !self.tables.products.contains_key(&item.product_id))
        {
            return Err(GatewayError::Storage(format!(
                "order item references unknown {}",
                item.product_id
            )));
        }

        let order_id = OrderId(bump(&mut self.sequences.order));
        let sequences = &mut self.sequences;
        let items = items
            .into_iter()
            .map(|item| OrderItem {
                id: OrderItemId(bump(&mut sequences.order_item)),
                order_id,
                warehouse_id: item.warehouse_id,
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
            })
            .collect();
        let order = Order {
            id: order_id,
            user_id: order.user_id,
            status: order.status,
            created_at: order.created_at,
            items,
        };

        if let Some(state) = self.units.get_mut(&unit) {
            state.orders.push(order.clone());
        }
        debug!(%unit, %order_id, items = order.items.len(), "Order staged");
        Ok(order)
    }

    fn commit(&mut self, unit: UnitId) -> Result<(), GatewayError> {
        let Some(state) = self.units.remove(&unit) else {
            warn!(%unit, "Commit of a unit that is not open");
            return Err(unit_not_open(unit));
        };

        let writes = state.stock_writes.len();
        let orders = state.orders.len();
        self.tables.stocks.extend(state.stock_writes);
        for mut order in state.orders {
            for item in order.items.drain(..) {
                self.tables.order_items.insert(item.id, item);
            }
            self.tables.orders.insert(order.id, order);
        }
        self.release(unit);

        info!(%unit, writes, orders, "Committed");
        Ok(())
    }

    fn rollback(&mut self, unit: UnitId) -> Result<(), GatewayError> {
        self.waiting.retain(|pending| pending.unit() != unit);
        if self.units.remove(&unit).is_none() {
            warn!(%unit, "Rollback of a unit that is not open");
            return Err(unit_not_open(unit));
        }
        self.release(unit);

        info!(%unit, "Rolled back");
        Ok(())
    }

    fn release(&mut self, unit: UnitId) {
        self.row_locks.retain(|_, owner| *owner != unit);
    }

    /// Retries parked requests in arrival order. One pass is enough: granting a
    /// request only ever takes locks, it never frees one.
    fn wake_waiters(&mut self) {
        let mut still_waiting = VecDeque::new();

        while let Some(pending) = self.waiting.pop_front() {
            match pending {
                Pending::Lock {
                    unit,
                    product_id,
                    min_quantity,
                    respond_to,
                } => {
                    if respond_to.is_closed() {
                        continue;
                    }
                    match self.try_lock_stock(unit, product_id, min_quantity) {
                        Some(result) => {
                            let _ = respond_to.send(result);
                        }
                        None => still_waiting.push_back(Pending::Lock {
                            unit,
                            product_id,
                            min_quantity,
                            respond_to,
                        }),
                    }
                }
                Pending::Update {
                    unit,
                    stock,
                    respond_to,
                } => {
                    if respond_to.is_closed() {
                        continue;
                    }
                    match self.try_update_stock(unit, &stock) {
                        Some(result) => {
                            let _ = respond_to.send(result);
                        }
                        None => still_waiting.push_back(Pending::Update {
                            unit,
                            stock,
                            respond_to,
                        }),
                    }
                }
            }
        }

        self.waiting = still_waiting;
        // Re-parked requests may now wait on a different owner.
        self.break_deadlocks();
    }

    /// Other units holding a row that `unit` waits for.
    fn blockers(&self, unit: UnitId, waits_for: WaitsFor) -> Vec<UnitId> {
        let held: Vec<UnitId> = match waits_for {
            WaitsFor::Product(product_id) => self
                .tables
                .stocks
                .values()
                .filter(|stock| stock.product_id == product_id)
                .filter_map(|stock| self.row_locks.get(&stock.id).copied())
                .collect(),
            WaitsFor::Row(id) => self.row_locks.get(&id).copied().into_iter().collect(),
        };

        let mut owners = Vec::new();
        for owner in held {
            if owner != unit && !owners.contains(&owner) {
                owners.push(owner);
            }
        }
        owners
    }

    /// Walks the wait-for graph from the owners `unit` waits on, looking for `unit`.
    fn in_wait_cycle(&self, unit: UnitId, waits_for: WaitsFor) -> bool {
        let mut stack = self.blockers(unit, waits_for);
        let mut seen = HashSet::new();

        while let Some(owner) = stack.pop() {
            if owner == unit {
                return true;
            }
            if !seen.insert(owner) {
                continue;
            }
            for pending in self.waiting.iter().filter(|pending| pending.unit() == owner) {
                stack.extend(self.blockers(owner, pending.waits_for()));
            }
        }
        false
    }

    /// Fails the newest parked request of every wait cycle.
    fn break_deadlocks(&mut self) {
        loop {
            let victim = (0..self.waiting.len()).rev().find(|&index| {
                let pending = &self.waiting[index];
                self.in_wait_cycle(pending.unit(), pending.waits_for())
            });
            let Some(pending) = victim.and_then(|index| self.waiting.remove(index)) else {
                return;
            };

            let unit = pending.unit();
            warn!(%unit, "Deadlock detected, failing lock request");
            pending.fail(GatewayError::Storage(format!(
                "deadlock detected: {unit} waits on a unit that is waiting on it"
            )));
        }
    }

    fn committed_order(&self, id: OrderId) -> Result<Order, GatewayError> {
        let mut order = self
            .tables
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        order.items = self
            .tables
            .order_items
            .values()
            .filter(|item| item.order_id == id)
            .cloned()
            .collect();
        Ok(order)
    }
}
