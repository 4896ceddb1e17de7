//! Tenant Engine Trait and Core Types
//!
//! This module defines the data model shared by every surface (library, CLI, MCP)
//! and the `TenantDatabase` trait that the PostgreSQL engine implements.
//!
//! # Connection Scope
//! Every trait method acquires a connection for the duration of that call only.
//! No connection or transaction is held across calls; the only shared state is
//! the pool owned by the engine.
//!
//! # Failure Semantics
//! - Namespace lifecycle methods return `Err` on failure.
//! - `execute`, `get_table_data` and `apply_migration` never fail: errors are
//!   folded into [`QueryResult::error`].
//! - `list_tables` and `list_migrations` degrade to best-effort values where noted.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemataError};
use crate::identifier::namespace_name;

pub mod postgres;
pub mod render;

/// Page size used when a caller does not pass a limit
pub const DEFAULT_PAGE_LIMIT: i64 = 100;

/// One project's isolated namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantNamespace {
    project_id: u64,
    name: String,
}

impl TenantNamespace {
    /// Namespace for a project (`project_{id}`)
    #[must_use]
    pub fn for_project(project_id: u64) -> Self {
        Self { project_id, name: namespace_name(project_id) }
    }

    #[must_use]
    pub const fn project_id(&self) -> u64 {
        self.project_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for TenantNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Returned by namespace creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub project_id: u64,
    pub namespace_name: String,
}

impl From<&TenantNamespace> for NamespaceInfo {
    fn from(ns: &TenantNamespace) -> Self {
        Self { project_id: ns.project_id(), namespace_name: ns.name().to_string() }
    }
}

/// Connection information returned after pool validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Database server version string
    pub database_version: String,

    /// Full server version banner
    pub server_info: String,

    /// Name of the connected database
    pub connected_database: String,

    /// Connected user name
    pub user: String,
}

/// Snapshot of one table's shape, recomputed on every introspection call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name
    pub name: String,

    /// Columns in ordinal order
    pub columns: Vec<ColumnDescriptor>,

    /// Best-effort row count (0 when counting failed)
    pub row_count: i64,
}

/// Column information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name
    pub name: String,

    /// Catalog data type name
    #[serde(rename = "type")]
    pub data_type: String,

    /// Whether column allows NULL values
    pub nullable: bool,

    /// Default expression (if any)
    pub default: Option<String>,

    /// Whether the column is part of the primary key
    pub is_primary: bool,
}

/// Result of one SQL execution
///
/// Either a success (columns/rows/affected_rows) or a failure (`error` only).
/// Failures never carry partial rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in result set
    pub columns: Vec<String>,

    /// Result rows, values in column order
    pub rows: Vec<Vec<serde_json::Value>>,

    /// Rows affected by a write, or rows returned by a query
    pub affected_rows: u64,

    /// Set when the statement did not commit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    /// Successful row-returning result
    #[must_use]
    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        let affected_rows = rows.len() as u64;
        Self { columns, rows, affected_rows, error: None }
    }

    /// Successful write result
    #[must_use]
    pub fn affected(affected_rows: u64) -> Self {
        Self { affected_rows, ..Self::default() }
    }

    /// Empty, error-free result
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Failed result; all other fields are empty
    #[must_use]
    pub fn failure(err: &SchemataError) -> Self {
        Self { error: Some(err.message()), ..Self::default() }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl From<Result<QueryResult>> for QueryResult {
    fn from(result: Result<QueryResult>) -> Self {
        result.unwrap_or_else(|err| Self::failure(&err))
    }
}

/// One applied migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: i32,
    pub description: String,
    pub sql: String,

    /// `None` when the stored timestamp is NULL or infinite
    pub applied_at: Option<chrono::NaiveDateTime>,
}

/// Tenant database operations
///
/// All engines implement this trait. Implementations hold a connection pool
/// and are cheap to clone.
pub trait TenantDatabase: Send + Sync {
    /// Create the namespace and its migration ledger (idempotent)
    ///
    /// Schema and ledger are created in one transaction.
    fn create_namespace(
        &self,
        project_id: u64,
    ) -> impl std::future::Future<Output = Result<NamespaceInfo>> + Send;

    /// Drop the namespace and everything in it
    ///
    /// Irreversible. No confirmation happens at this layer.
    fn drop_namespace(&self, project_id: u64) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Describe every user table in the namespace
    ///
    /// Internal tables are excluded. A missing namespace yields an empty list.
    fn list_tables(
        &self,
        project_id: u64,
    ) -> impl std::future::Future<Output = Result<Vec<TableDescriptor>>> + Send;

    /// Page through a table's rows
    ///
    /// `table` must pass identifier validation; otherwise an error result is
    /// returned without touching the database.
    fn get_table_data(
        &self,
        project_id: u64,
        table: &str,
        limit: i64,
        offset: i64,
    ) -> impl std::future::Future<Output = QueryResult> + Send;

    /// Execute a statement inside the tenant namespace under the execution policy
    fn execute(
        &self,
        project_id: u64,
        sql: &str,
        readonly: bool,
    ) -> impl std::future::Future<Output = QueryResult> + Send;

    /// Apply a migration and record it in the ledger in one transaction
    fn apply_migration(
        &self,
        project_id: u64,
        sql: &str,
        description: &str,
    ) -> impl std::future::Future<Output = QueryResult> + Send;

    /// Applied migrations, newest first
    ///
    /// A namespace without a ledger has no history and yields an empty list.
    fn list_migrations(
        &self,
        project_id: u64,
    ) -> impl std::future::Future<Output = Result<Vec<MigrationRecord>>> + Send;

    /// Current schema rendered as `CREATE TABLE` statements
    ///
    /// Lossy: see [`render::schema_as_sql`].
    fn schema_as_sql(
        &self,
        project_id: u64,
    ) -> impl std::future::Future<Output = Result<String>> + Send {
        async move {
            let tables = self.list_tables(project_id).await?;
            Ok(render::schema_as_sql(&tables))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_namespace() {
        let ns = TenantNamespace::for_project(42);
        assert_eq!(ns.name(), "project_42");
        assert_eq!(ns.project_id(), 42);
        assert_eq!(ns.to_string(), "project_42");

        let info = NamespaceInfo::from(&ns);
        assert_eq!(info.namespace_name, "project_42");
        assert_eq!(info.project_id, 42);
    }

    #[test]
    fn test_query_result_failure_is_empty() {
        let result = QueryResult::failure(&SchemataError::validation("Invalid table name"));
        assert!(result.is_error());
        assert!(result.columns.is_empty());
        assert!(result.rows.is_empty());
        assert_eq!(result.affected_rows, 0);
        assert_eq!(result.error.as_deref(), Some("Validation error: Invalid table name"));
    }

    #[test]
    fn test_query_result_with_rows_counts_rows() {
        let result = QueryResult::with_rows(
            vec!["id".to_string()],
            vec![vec![serde_json::json!(1)], vec![serde_json::json!(2)]],
        );
        assert!(!result.is_error());
        assert_eq!(result.affected_rows, 2);
    }

    #[test]
    fn test_query_result_from_result() {
        let ok: QueryResult = Ok(QueryResult::affected(3)).into();
        assert_eq!(ok.affected_rows, 3);

        let failed: QueryResult = Err(SchemataError::execution("boom")).into();
        assert_eq!(failed.error.as_deref(), Some("Execution failed: boom"));
    }

    #[test]
    fn test_query_result_serialization() {
        let json = serde_json::to_value(QueryResult::affected(1)).unwrap();
        assert_eq!(json["affected_rows"], 1);
        assert!(json.get("error").is_none());

        let json = serde_json::to_value(QueryResult::failure(&SchemataError::execution("x"))).unwrap();
        assert_eq!(json["error"], "Execution failed: x");
        assert_eq!(json["rows"], serde_json::json!([]));
    }

    #[test]
    fn test_column_descriptor_type_field_name() {
        let col = ColumnDescriptor {
            name: "id".to_string(),
            data_type: "integer".to_string(),
            nullable: false,
            default: None,
            is_primary: true,
        };
        let json = serde_json::to_value(&col).unwrap();
        assert_eq!(json["type"], "integer");
        assert_eq!(json["is_primary"], true);
    }
}
