use super::{ProductId, WarehouseId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

typed_id!(
    /// Identifier of the user placing an order. Users live in another service.
    UserId,
    "user"
);

typed_id!(
    /// Type-safe identifier for Orders.
    OrderId,
    "order"
);

typed_id!(
    /// Type-safe identifier for order line items.
    OrderItemId,
    "order_item"
);

/// Lifecycle status of an order. Checkout only ever creates `Pending` orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
        }
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

/// A persisted order together with the line items inserted alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Sum of `price * quantity` over all line items.
    pub fn total(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.price * Decimal::from(item.quantity))
            .sum()
    }
}

/// One line of an order. `price` is the unit price captured at checkout time, so
/// later catalog price changes never reach historical orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Decimal,
}

/// Payload for inserting an order. The store assigns the identifier.
#[derive(Debug, Clone)]
pub struct OrderCreate {
    pub user_id: UserId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl OrderCreate {
    /// A fresh `pending` order for `user_id`, stamped with the current time.
    pub fn pending(user_id: UserId) -> Self {
        Self {
            user_id,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Payload for one line item. The order reference is filled in by the store once the
/// order row has its identifier.
#[derive(Debug, Clone)]
pub struct OrderItemCreate {
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Decimal,
}
