//! Database settings loaded from environment variables.

pub mod constants;

use std::env;
use std::fmt;
use std::time::Duration;

use sqlx::any::AnyPoolOptions;

use self::constants::{DEFAULT_ACQUIRE_TIMEOUT_SECS, DEFAULT_DATABASE_URL, DEFAULT_MAX_CONNECTIONS};
use crate::{CoordinatorConfig, SqlxDatastore, TransactionError, TransactionResult};

#[derive(Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub unit_timeout: Option<Duration>,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("unit_timeout", &self.unit_timeout)
            .finish()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            unit_timeout: None,
        }
    }
}

impl DatabaseConfig {
    /// Load configuration from environment variables (and `.env`, if present).
    ///
    /// Missing or unparsable values fall back to the defaults in [`constants`].
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let max_connections = match parse_var::<u32>("DATABASE_MAX_CONNECTIONS") {
            Some(0) | None => defaults.max_connections,
            Some(n) => n,
        };

        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections,
            acquire_timeout: parse_var("DATABASE_ACQUIRE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
            unit_timeout: parse_var("UNIT_OF_WORK_TIMEOUT_SECS").map(Duration::from_secs),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            unit_timeout: self.unit_timeout,
        }
    }

    /// Build the connection pool. The URL scheme selects the driver
    /// (`postgres://` or `sqlite:`).
    pub async fn connect(&self) -> TransactionResult<SqlxDatastore> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.database_url)
            .await
            .map_err(TransactionError::ConnectFailed)?;
        tracing::info!(max_connections = self.max_connections, "database pool ready");
        Ok(SqlxDatastore::new(pool))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable configuration value");
            None
        }
    }
}
