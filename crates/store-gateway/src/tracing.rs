//! # Observability & Tracing
//!
//! [`setup_tracing`] installs the process-wide `tracing` subscriber used by the store,
//! the checkout flow and the demo binary.
//!
//! - **Filtering** via `RUST_LOG` (defaults to `info`)
//! - **Compact** output for development, **JSON** output for log shippers
//! - Module paths are hidden (`with_target(false)`); structured fields such as `unit`,
//!   `product_id` and `phase` carry the context instead
//!
//! ```bash
//! RUST_LOG=info cargo run -p checkout          # outcomes only
//! RUST_LOG=debug cargo run -p checkout         # every store request and row lock
//! CHECKOUT_LOG_FORMAT=json cargo run -p checkout
//! ```
//!
//! A checkout at `info` level reads:
//!
//! ```text
//! INFO checkout{user_id=user_1 items=1}: Checkout started phase=started
//! INFO checkout{user_id=user_1 items=1}: Committed unit=unit_1 writes=1 orders=1
//! INFO checkout{user_id=user_1 items=1}: Checkout committed phase=committed order_id=order_1
//! ```

use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Output format of the subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Initializes the tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn setup_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = match format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("compact".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("pretty".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_setup_tracing_twice_is_harmless() {
        setup_tracing(LogFormat::Compact);
        setup_tracing(LogFormat::Json);
    }
}
