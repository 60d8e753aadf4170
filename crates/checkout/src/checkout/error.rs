use store_gateway::model::ProductId;
use store_gateway::GatewayError;
use thiserror::Error;

/// Why a checkout did not produce an order.
///
/// Every variant is returned only after the unit of work has been rolled back.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckoutError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Carries the product name, not its identifier.
    #[error("Insufficient stock for product: {0}")]
    InsufficientStock(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<GatewayError> for CheckoutError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Storage(msg) => CheckoutError::Storage(msg),
            other => CheckoutError::Storage(other.to_string()),
        }
    }
}
