use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

typed_id!(
    /// Type-safe identifier for Products.
    ProductId,
    "product"
);

/// Catalog entry. Reference data for pricing and validation; checkouts never write it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
}

/// Payload for inserting a product into the catalog.
#[derive(Debug, Clone)]
pub struct ProductCreate {
    pub name: String,
    pub price: Decimal,
}

impl ProductCreate {
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            name: name.into(),
            price,
        }
    }
}
