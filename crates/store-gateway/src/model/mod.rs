//! Row types for the four checkout tables plus their creation payloads.
//!
//! Identifiers are newtypes over `u64` so a [`StockId`] can never be passed where a
//! [`ProductId`] is expected.

/// Declares a `u64` identifier newtype with the conversions every row id needs.
macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }
    };
}

pub mod order;
pub mod product;
pub mod stock;

pub use order::*;
pub use product::*;
pub use stock::*;
