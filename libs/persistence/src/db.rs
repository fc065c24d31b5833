//! Connection management and schema setup.
//!
//! The provider wraps an SQLx SQLite pool. It hands out the same pool for
//! repeated `connect` calls, so a store that is initialized twice reuses
//! its connection instead of opening a second one.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS flow_node_instances (
    instance_id TEXT PRIMARY KEY,
    flow_node_id TEXT NOT NULL,
    flow_node_type TEXT NOT NULL,
    event_type TEXT,
    correlation_id TEXT NOT NULL,
    process_model_id TEXT NOT NULL,
    process_instance_id TEXT NOT NULL,
    parent_process_instance_id TEXT,
    owner_identity TEXT NOT NULL,
    state TEXT NOT NULL,
    error TEXT,
    previous_instance_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_instances_flow_node ON flow_node_instances(flow_node_id);
CREATE INDEX IF NOT EXISTS idx_instances_correlation ON flow_node_instances(correlation_id);
CREATE INDEX IF NOT EXISTS idx_instances_process_model ON flow_node_instances(process_model_id);
CREATE INDEX IF NOT EXISTS idx_instances_process_instance ON flow_node_instances(process_instance_id);
CREATE INDEX IF NOT EXISTS idx_instances_state ON flow_node_instances(state);

CREATE TABLE IF NOT EXISTS process_tokens (
    token_id INTEGER PRIMARY KEY AUTOINCREMENT,
    instance_id TEXT NOT NULL REFERENCES flow_node_instances(instance_id) ON DELETE CASCADE,
    token_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tokens_instance ON process_tokens(instance_id);
"#;

/// Ensure both relations and their indexes exist.
pub(crate) async fn ensure_schema(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(StoreError::Schema)?;
    debug!("database schema ensured");
    Ok(())
}

/// Supplies the live connection pool for the store.
#[derive(Clone)]
pub struct ConnectionProvider {
    config: StoreConfig,
    pool: Arc<Mutex<Option<SqlitePool>>>,
}

impl ConnectionProvider {
    /// Create a provider for the given configuration. No connection is
    /// opened until [`connect`](Self::connect) is called.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            pool: Arc::new(Mutex::new(None)),
        }
    }

    /// Open the connection pool, or return the already open one.
    pub async fn connect(&self) -> StoreResult<SqlitePool> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            debug!("reusing open database pool");
            return Ok(pool.clone());
        }

        info!(
            database_url = %self.config.database_url,
            max_connections = self.config.max_connections,
            "Connecting to database"
        );

        let options = SqliteConnectOptions::from_str(&self.config.database_url)
            .map_err(StoreError::Connect)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(self.config.busy_timeout)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(self.config.acquire_timeout);

        // An in-memory database lives and dies with its single connection.
        if self.config.is_in_memory() {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(StoreError::Connect)?;

        info!("Database connection pool established");

        *guard = Some(pool.clone());
        Ok(pool)
    }

    /// Close the pool and drop the cached handle.
    pub async fn disconnect(&self) -> StoreResult<()> {
        let pool = self.pool.lock().await.take();
        if let Some(pool) = pool {
            pool.close().await;
            info!("Database connection pool closed");
        }
        Ok(())
    }

    /// The currently open pool. Fails if `connect` has not run yet, or if
    /// the provider was disconnected.
    pub(crate) async fn current(&self) -> StoreResult<SqlitePool> {
        self.pool
            .lock()
            .await
            .clone()
            .ok_or(StoreError::NotInitialized)
    }

    /// Check if the database is reachable.
    pub async fn health_check(&self) -> StoreResult<()> {
        let pool = self.current().await?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(StoreError::Query)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_reuses_pool() {
        let provider = ConnectionProvider::new(StoreConfig::in_memory());
        let first = provider.connect().await.unwrap();
        sqlx::raw_sql("CREATE TABLE reuse_probe (id INTEGER)")
            .execute(&first)
            .await
            .unwrap();

        // A second connect must hand back the same database, not a fresh one.
        let second = provider.connect().await.unwrap();
        sqlx::query("SELECT count(*) FROM reuse_probe")
            .fetch_one(&second)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let provider = ConnectionProvider::new(StoreConfig::in_memory());
        let pool = provider.connect().await.unwrap();
        ensure_schema(&pool).await.unwrap();
        ensure_schema(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_health_check_requires_connection() {
        let provider = ConnectionProvider::new(StoreConfig::in_memory());
        assert!(matches!(
            provider.health_check().await,
            Err(StoreError::NotInitialized)
        ));

        provider.connect().await.unwrap();
        provider.health_check().await.unwrap();

        provider.disconnect().await.unwrap();
        assert!(matches!(
            provider.health_check().await,
            Err(StoreError::NotInitialized)
        ));
    }
}
