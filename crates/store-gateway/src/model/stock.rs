use super::ProductId;
use serde::{Deserialize, Serialize};

typed_id!(
    /// Type-safe identifier for stock rows.
    StockId,
    "stock"
);

typed_id!(
    /// Warehouse holding a stock row. Warehouses themselves are not modelled here.
    WarehouseId,
    "warehouse"
);

/// Available quantity of one product in one warehouse.
///
/// `quantity` is unsigned, so a reservation that would drive it below zero has to be
/// rejected before the row is written (see `u32::checked_sub` in the checkout flow).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub id: StockId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: u32,
}

/// Payload for inserting a stock row.
#[derive(Debug, Clone)]
pub struct StockCreate {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: u32,
}
