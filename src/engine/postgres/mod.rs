//! `PostgreSQL` Tenant Engine
//!
//! This module implements the `TenantDatabase` trait on top of a shared
//! `deadpool-postgres` pool.
//!
//! # Features
//! - One schema per project (`project_{id}`) with its own migration ledger
//! - Schema introspection via `information_schema`
//! - Policy-checked statement execution with JSON-safe result values
//! - Atomic migration application and ledger bookkeeping
//!
//! # Implementation Notes
//! - A connection is borrowed from the pool for one call and returned afterwards
//! - Tenant SQL runs inside a transaction whose `search_path` and
//!   `statement_timeout` are set with `set_config(..., true)`, so both revert on
//!   commit or rollback and never leak to the next borrower
//! - Readonly executions additionally run in a `READ ONLY` transaction
//! - Connection errors are logged without the connection string

mod executor;
mod introspect;
mod ledger;
mod namespace;
mod values;

use std::time::Duration;

use deadpool_postgres::{Config, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info};

use crate::config::Settings;
use crate::engine::{
    ConnectionInfo, MigrationRecord, NamespaceInfo, QueryResult, TableDescriptor, TenantDatabase,
    TenantNamespace,
};
use crate::error::{Result, SchemataError};
use crate::identifier::quote_ident;

/// `PostgreSQL` tenant engine
///
/// Cloning is cheap: clones share the same pool.
#[derive(Clone)]
pub struct PostgresEngine {
    pool: Pool,
    statement_timeout: Duration,
}

impl std::fmt::Debug for PostgresEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("PostgresEngine")
            .field("pool_size", &status.size)
            .field("pool_max_size", &status.max_size)
            .field("statement_timeout", &self.statement_timeout)
            .finish()
    }
}

impl PostgresEngine {
    /// Build the pool and validate one connection
    ///
    /// # Errors
    /// * `ConfigError` if the database URL cannot be parsed
    /// * `ConnectionFailed` if no connection can be established
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let engine = Self::from_pool(build_pool(settings)?, settings.statement_timeout());
        let info = engine.validate_connection().await?;

        info!(
            version = %info.database_version,
            database = %info.connected_database,
            user = %info.user,
            pool_max_size = settings.pool_max_size,
            "connected to PostgreSQL"
        );

        Ok(engine)
    }

    /// Wrap an existing pool
    #[must_use]
    pub const fn from_pool(pool: Pool, statement_timeout: Duration) -> Self {
        Self { pool, statement_timeout }
    }

    /// Query server version, database and user over a pooled connection
    pub async fn validate_connection(&self) -> Result<ConnectionInfo> {
        let client = self.acquire().await?;

        let row = client
            .query_one("SELECT version(), current_database()::text, current_user::text", &[])
            .await
            .map_err(|e| {
                SchemataError::connection_failed(format!("Failed to query server information: {e}"))
            })?;

        let server_info: String = row.try_get(0)?;

        // "PostgreSQL 15.3 on x86_64..." -> "15.3"
        let database_version =
            server_info.split_whitespace().nth(1).unwrap_or("unknown").to_string();

        Ok(ConnectionInfo {
            database_version,
            server_info,
            connected_database: row.try_get(1)?,
            user: row.try_get(2)?,
        })
    }

    /// Close the pool; outstanding connections are dropped as they are returned
    pub fn close(&self) {
        self.pool.close();
        info!("connection pool closed");
    }

    /// Statement timeout applied to tenant SQL
    #[must_use]
    pub const fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }

    async fn acquire(&self) -> Result<Object> {
        let client = self.pool.get().await?;
        let status = self.pool.status();
        debug!(available = status.available, size = status.size, "acquired pooled connection");
        Ok(client)
    }
}

fn build_pool(settings: &Settings) -> Result<Pool> {
    let mut cfg = Config::new();
    cfg.url = Some(settings.database_url.clone());
    cfg.manager = Some(ManagerConfig { recycling_method: RecyclingMethod::Fast });
    cfg.pool = Some(PoolConfig::new(settings.pool_max_size));

    // Never echo the URL: it may carry a password.
    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| SchemataError::config_error(format!("Invalid database configuration: {e}")))
}

/// Pin `search_path` and `statement_timeout` to the current transaction
async fn scope_transaction(
    tx: &tokio_postgres::Transaction<'_>,
    ns: &TenantNamespace,
    timeout: Duration,
) -> Result<()> {
    let search_path = quote_ident(ns.name());
    let timeout = format!("{}ms", timeout.as_millis());

    tx.execute(
        "SELECT set_config('search_path', $1, true), set_config('statement_timeout', $2, true)",
        &[&search_path, &timeout],
    )
    .await?;

    Ok(())
}

impl TenantDatabase for PostgresEngine {
    async fn create_namespace(&self, project_id: u64) -> Result<NamespaceInfo> {
        self.create_schema(&TenantNamespace::for_project(project_id)).await
    }

    async fn drop_namespace(&self, project_id: u64) -> Result<()> {
        self.drop_schema(&TenantNamespace::for_project(project_id)).await
    }

    async fn list_tables(&self, project_id: u64) -> Result<Vec<TableDescriptor>> {
        self.describe_tables(&TenantNamespace::for_project(project_id)).await
    }

    async fn get_table_data(
        &self,
        project_id: u64,
        table: &str,
        limit: i64,
        offset: i64,
    ) -> QueryResult {
        self.table_page(&TenantNamespace::for_project(project_id), table, limit, offset).await.into()
    }

    async fn execute(&self, project_id: u64, sql: &str, readonly: bool) -> QueryResult {
        self.run(&TenantNamespace::for_project(project_id), sql, readonly).await.into()
    }

    async fn apply_migration(&self, project_id: u64, sql: &str, description: &str) -> QueryResult {
        self.apply(&TenantNamespace::for_project(project_id), sql, description).await.into()
    }

    async fn list_migrations(&self, project_id: u64) -> Result<Vec<MigrationRecord>> {
        self.history(&TenantNamespace::for_project(project_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogSettings;

    fn settings(url: &str) -> Settings {
        Settings {
            database_url: url.to_string(),
            pool_max_size: 2,
            statement_timeout_secs: 5,
            log: LogSettings::default(),
        }
    }

    #[tokio::test]
    async fn test_build_pool_is_lazy() {
        // No connection is attempted until the first checkout.
        let pool = build_pool(&settings("postgres://nobody@127.0.0.1:1/none")).unwrap();
        assert_eq!(pool.status().max_size, 2);
        assert_eq!(pool.status().size, 0);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_failure() {
        let err = PostgresEngine::connect(&settings("postgres://nobody@127.0.0.1:1/none"))
            .await
            .unwrap_err();
        assert!(matches!(err, SchemataError::ConnectionFailed(_)));
        assert!(!err.message().contains("nobody@"));
    }

    #[tokio::test]
    async fn test_debug_hides_url() {
        let pool = build_pool(&settings("postgres://secret:pw@127.0.0.1:1/none")).unwrap();
        let engine = PostgresEngine::from_pool(pool, Duration::from_secs(5));
        let debug = format!("{engine:?}");
        assert!(debug.contains("PostgresEngine"));
        assert!(!debug.contains("secret"));
    }
}
