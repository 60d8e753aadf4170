//! # System Lifecycle
//!
//! [`CheckoutSystem`] wires the in-memory store task to a [`CheckoutService`] and shuts
//! both down again. [`SystemConfig`] reads the environment the demo binary runs in.
//!
//! ## Shutdown
//!
//! The store task stops when the last [`StoreClient`](store_gateway::StoreClient) is
//! dropped: `recv()` returns `None`, the task logs its final table sizes and returns.
//! [`CheckoutSystem::shutdown`] drops its own clients and awaits the task, so any
//! client cloned out of the system must be dropped first or shutdown waits for it.
//!
//! [`CheckoutService`]: crate::checkout::CheckoutService

mod config;
mod system;

pub use config::{Backend, ConfigError, SystemConfig};
pub use system::CheckoutSystem;
