//! # Store Gateway
//!
//! The persistence side of order checkout: the [`StoreGateway`] / [`UnitOfWork`]
//! contract, the row types it moves, and the backends that implement it.
//!
//! ## Architecture Overview
//!
//! 1. **Contract** ([`gateway`]) - what checkout needs from storage: a unit of work, a
//!    product lookup, a locked stock read, a stock write and an order insert.
//! 2. **In-memory backend** ([`actor`], [`client`], [`message`]) - a single Tokio task
//!    owns the tables and the row-lock table; [`StoreClient`] sends it requests over a
//!    channel and gets replies on oneshot channels.
//! 3. **PostgreSQL backend** (`postgres` feature) - the same contract over `sqlx`,
//!    with `SELECT ... FOR UPDATE` for the locked read.
//! 4. **Mock** ([`mock`]) - a scripted gateway for failure-path tests.
//!
//! ## Concurrency Model
//!
//! - The store task handles one request at a time, so its tables need no locks.
//! - Row locks belong to units of work. A request for a row held by another unit is
//!   parked and answered when that unit commits or rolls back.
//! - A unit-of-work handle dropped while open rolls back, so locks are never leaked by
//!   an early return, a cancelled future or a panic.
//!
//! ## Testing
//!
//! Use the real [`StoreActor`] when the behaviour of the data matters, and
//! [`MockStore`](mock::MockStore) when you need a failure the data cannot produce.

pub mod actor;
pub mod client;
pub mod error;
pub mod gateway;
pub mod message;
pub mod mock;
pub mod model;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod tracing;

// Re-export core types for convenience
pub use actor::StoreActor;
pub use client::{MemoryUnit, StoreClient};
pub use error::GatewayError;
pub use gateway::{StoreGateway, UnitOfWork};
pub use message::{Response, StoreRequest, UnitId};
#[cfg(feature = "postgres")]
pub use postgres::{PgGateway, PgUnit};
