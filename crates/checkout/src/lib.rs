//! # Checkout
//!
//! Order checkout with stock reservation, on top of the
//! [`store_gateway`] persistence contract.
//!
//! - **[checkout]**: the [`CheckoutService`](checkout::CheckoutService) orchestrator, its
//!   request payload and its errors.
//! - **[lifecycle]**: [`CheckoutSystem`](lifecycle::CheckoutSystem), which runs the
//!   in-memory store, and the environment config of the binary.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use checkout::checkout::{CheckoutItem, CheckoutRequest};
//! use checkout::lifecycle::CheckoutSystem;
//! use rust_decimal::Decimal;
//! use store_gateway::model::{ProductCreate, StockCreate, UserId, WarehouseId};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let system = CheckoutSystem::new();
//! let product = system
//!     .store
//!     .create_product(ProductCreate::new("Keyboard", Decimal::new(4999, 2)))
//!     .await?;
//! system
//!     .store
//!     .create_stock(StockCreate { product_id: product.id, warehouse_id: WarehouseId(1), quantity: 3 })
//!     .await?;
//!
//! let request = CheckoutRequest::new(UserId(1), vec![CheckoutItem::new(product.id, 2)]);
//! let order = system.checkout.checkout(request).await?;
//! assert_eq!(order.items[0].price, Decimal::new(4999, 2));
//!
//! system.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod checkout;
pub mod lifecycle;
