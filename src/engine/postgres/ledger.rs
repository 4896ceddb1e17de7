//! Migration ledger
//!
//! Each namespace carries an internal `_migrations` table. A migration and its
//! ledger row are written in the same transaction: either both persist or neither.

use tracing::{error, info, instrument, warn};

use super::{scope_transaction, PostgresEngine};
use crate::capability::{validate_statement, ExecutionMode};
use crate::engine::{MigrationRecord, QueryResult, TenantNamespace};
use crate::error::{Result, SchemataError};
use crate::identifier::quote_ident;

/// Ledger table name; the leading underscore hides it from table listings
pub const LEDGER_TABLE: &str = "_migrations";

/// `CREATE TABLE IF NOT EXISTS` for a namespace's ledger
pub(super) fn ledger_ddl(ns: &TenantNamespace) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {}.{} (\
            id SERIAL PRIMARY KEY, \
            description TEXT NOT NULL, \
            sql TEXT NOT NULL, \
            applied_at TIMESTAMP DEFAULT NOW()\
        )",
        quote_ident(ns.name()),
        quote_ident(LEDGER_TABLE)
    )
}

impl PostgresEngine {
    #[instrument(
        skip_all,
        fields(project_id = ns.project_id(), namespace = %ns, description = %description)
    )]
    pub(super) async fn apply(
        &self,
        ns: &TenantNamespace,
        sql: &str,
        description: &str,
    ) -> Result<QueryResult> {
        let statement = validate_statement(sql, ExecutionMode::ReadWrite).inspect_err(|err| {
            error!(error = %err, "migration rejected");
        })?;

        let record = format!(
            "INSERT INTO {}.{} (description, sql) VALUES ($1, $2)",
            quote_ident(ns.name()),
            quote_ident(LEDGER_TABLE)
        );

        let mut client = self.acquire().await?;
        let tx = client.transaction().await?;
        scope_transaction(&tx, ns, self.statement_timeout).await?;

        // Migrations may hold several statements, so they go through the simple protocol.
        if let Err(err) = tx.batch_execute(statement).await {
            let err = SchemataError::from(err);
            error!(error = %err, "migration failed, rolled back");
            return Err(err);
        }

        tx.execute(record.as_str(), &[&description, &statement]).await?;
        tx.commit().await?;

        info!("migration applied");
        Ok(QueryResult::empty())
    }

    /// Ledger rows, newest first
    ///
    /// A missing ledger or namespace is reported as an empty history.
    #[instrument(skip_all, fields(project_id = ns.project_id(), namespace = %ns))]
    pub(super) async fn history(&self, ns: &TenantNamespace) -> Result<Vec<MigrationRecord>> {
        let client = self.acquire().await?;

        let query = format!(
            "SELECT id, description, sql, \
                    CASE WHEN isfinite(applied_at) THEN applied_at END AS applied_at \
             FROM {}.{} ORDER BY id DESC",
            quote_ident(ns.name()),
            quote_ident(LEDGER_TABLE)
        );

        let rows = match client.query(query.as_str(), &[]).await {
            Ok(rows) => rows,
            Err(err) => {
                let err = SchemataError::from(err);
                warn!(error = %err, "migration ledger unreadable, reporting empty history");
                return Ok(Vec::new());
            }
        };

        rows.iter()
            .map(|row| {
                Ok(MigrationRecord {
                    id: row.try_get("id")?,
                    description: row.try_get("description")?,
                    sql: row.try_get("sql")?,
                    applied_at: row.try_get("applied_at")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_ddl_is_namespace_qualified() {
        let ddl = ledger_ddl(&TenantNamespace::for_project(7));
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"project_7\".\"_migrations\" ("));
        assert!(ddl.contains("id SERIAL PRIMARY KEY"));
        assert!(ddl.contains("applied_at TIMESTAMP DEFAULT NOW()"));
    }
}
