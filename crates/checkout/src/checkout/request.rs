//! Inbound checkout payload.
//!
//! ```json
//! { "userID": 1, "items": [{ "productID": 2, "quantity": 3 }] }
//! ```

use serde::{Deserialize, Serialize};
use store_gateway::model::{ProductId, UserId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(rename = "userID")]
    pub user_id: UserId,
    pub items: Vec<CheckoutItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    #[serde(rename = "productID")]
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A payload that is well-formed JSON but not a valid checkout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Checkout request has no items")]
    NoItems,

    #[error("Quantity for {0} must be at least 1")]
    ZeroQuantity(ProductId),
}

impl CheckoutRequest {
    pub fn new(user_id: UserId, items: Vec<CheckoutItem>) -> Self {
        Self { user_id, items }
    }

    /// Checks the shape of the request before any storage is touched.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.items.is_empty() {
            return Err(RequestError::NoItems);
        }
        if let Some(item) = self.items.iter().find(|item| item.quantity == 0) {
            return Err(RequestError::ZeroQuantity(item.product_id));
        }
        Ok(())
    }
}

impl CheckoutItem {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_wire_names() {
        let json = r#"{"userID": 7, "items": [{"productID": 2, "quantity": 3}]}"#;
        let request: CheckoutRequest = serde_json::from_str(json).unwrap();
        assert_eq!(
            request,
            CheckoutRequest::new(UserId(7), vec![CheckoutItem::new(ProductId(2), 3)])
        );
        assert_eq!(request.validate(), Ok(()));
    }

    #[test]
    fn test_rejects_empty_and_zero_quantity() {
        let empty = CheckoutRequest::new(UserId(1), vec![]);
        assert_eq!(empty.validate(), Err(RequestError::NoItems));

        let zero = CheckoutRequest::new(
            UserId(1),
            vec![
                CheckoutItem::new(ProductId(1), 2),
                CheckoutItem::new(ProductId(5), 0),
            ],
        );
        assert_eq!(zero.validate(), Err(RequestError::ZeroQuantity(ProductId(5))));
    }

    #[test]
    fn test_negative_quantity_is_a_parse_error() {
        let json = r#"{"userID": 1, "items": [{"productID": 2, "quantity": -1}]}"#;
        assert!(serde_json::from_str::<CheckoutRequest>(json).is_err());
    }
}
