use std::str::FromStr;
use store_gateway::tracing::LogFormat;
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Which store the binary runs against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown backend '{0}', expected 'memory' or 'postgres'")]
    UnknownBackend(String),

    #[error("DATABASE_URL must be set for the postgres backend")]
    MissingDatabaseUrl,

    #[error("Invalid CHECKOUT_DB_MAX_CONNECTIONS '{0}'")]
    InvalidMaxConnections(String),

    #[error("Invalid CHECKOUT_LOG_FORMAT: {0}")]
    InvalidLogFormat(String),
}

/// Settings of the checkout binary.
///
/// | Variable | Default |
/// |----------|---------|
/// | `CHECKOUT_BACKEND` | `memory` |
/// | `DATABASE_URL` | required for `postgres` |
/// | `CHECKOUT_DB_MAX_CONNECTIONS` | `5` |
/// | `CHECKOUT_LOG_FORMAT` | `compact` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemConfig {
    pub backend: Backend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub log_format: LogFormat,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            log_format: LogFormat::Compact,
        }
    }
}

impl SystemConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = match lookup("CHECKOUT_BACKEND") {
            Some(value) => value.parse()?,
            None => Backend::default(),
        };
        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        if backend == Backend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        let max_connections = match lookup("CHECKOUT_DB_MAX_CONNECTIONS") {
            Some(value) => value
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidMaxConnections(value))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        let log_format = match lookup("CHECKOUT_LOG_FORMAT") {
            Some(value) => value.parse().map_err(ConfigError::InvalidLogFormat)?,
            None => LogFormat::default(),
        };

        Ok(Self {
            backend,
            database_url,
            max_connections,
            log_format,
        })
    }
}
