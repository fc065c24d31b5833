//! Store configuration.

use std::time::Duration;

/// Configuration for the flow node instance store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database URL (`sqlite://path.db` or `sqlite::memory:`).
    pub database_url: String,

    /// Maximum number of connections in the pool.
    pub max_connections: u32,

    /// Connection acquire timeout.
    pub acquire_timeout: Duration,

    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://procflow.db".to_string(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let database_url = std::env::var("PROCFLOW_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://procflow.db".to_string());

        let max_connections = std::env::var("PROCFLOW_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let busy_timeout = std::env::var("PROCFLOW_DB_BUSY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        Self {
            database_url,
            max_connections,
            busy_timeout,
            ..Default::default()
        }
    }

    /// Configuration for a fresh in-memory database.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }
}
