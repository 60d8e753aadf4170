//! # Gateway Errors
//!
//! Every backend (the in-memory store task, PostgreSQL, the mock) reports failures
//! through this one type so the checkout flow can map them without knowing which
//! backend it talks to.

/// Errors surfaced by a [`StoreGateway`](crate::StoreGateway) or a
/// [`UnitOfWork`](crate::UnitOfWork).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// No row matched. For stock lookups this covers both "no stock row" and
    /// "not enough quantity"; callers cannot tell the two apart.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Any other persistence failure: constraint violation, closed unit of work,
    /// driver error.
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Store closed")]
    StoreClosed,
    #[error("Store dropped response channel")]
    StoreDropped,
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }
}
