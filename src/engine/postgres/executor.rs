//! Tenant statement execution

use tracing::{debug, instrument, warn};

use super::values::row_to_json;
use super::{scope_transaction, PostgresEngine};
use crate::capability::{validate_statement, ExecutionMode};
use crate::engine::{QueryResult, TenantNamespace};
use crate::error::{Result, SchemataError};
use crate::identifier::{is_safe_identifier, quote_ident};

impl PostgresEngine {
    #[instrument(skip_all, fields(project_id = ns.project_id(), namespace = %ns, readonly = readonly))]
    pub(super) async fn run(
        &self,
        ns: &TenantNamespace,
        sql: &str,
        readonly: bool,
    ) -> Result<QueryResult> {
        let mode = ExecutionMode::from_readonly(readonly);
        let statement = validate_statement(sql, mode).inspect_err(|err| {
            debug!(error = %err, "statement rejected");
        })?;

        self.run_scoped(ns, statement, mode).await.inspect_err(|err| {
            debug!(error = %err, "statement failed, rolled back");
        })
    }

    /// Read one page of a table
    #[instrument(
        skip_all,
        fields(project_id = ns.project_id(), namespace = %ns, table = %table, limit = limit, offset = offset)
    )]
    pub(super) async fn table_page(
        &self,
        ns: &TenantNamespace,
        table: &str,
        limit: i64,
        offset: i64,
    ) -> Result<QueryResult> {
        if !is_safe_identifier(table) {
            warn!("unsafe table name rejected");
            return Err(SchemataError::validation("Invalid table name"));
        }
        if limit < 0 || offset < 0 {
            return Err(SchemataError::validation("limit and offset must be non-negative"));
        }

        let sql = format!(
            "SELECT * FROM {}.{} LIMIT $1 OFFSET $2",
            quote_ident(ns.name()),
            quote_ident(table)
        );

        let mut client = self.acquire().await?;
        let tx = client.build_transaction().read_only(true).start().await?;
        scope_transaction(&tx, ns, self.statement_timeout).await?;

        let stmt = tx.prepare(&sql).await?;
        let columns = stmt.columns().iter().map(|c| c.name().to_string()).collect();
        let rows = tx.query(&stmt, &[&limit, &offset]).await?;
        let rows = rows.iter().map(row_to_json).collect::<Result<Vec<_>>>()?;

        tx.commit().await?;
        Ok(QueryResult::with_rows(columns, rows))
    }

    /// Prepare and run one validated statement in a scoped transaction
    ///
    /// Row-returning statements (including `INSERT ... RETURNING`) yield their
    /// rows; everything else yields the affected row count. The transaction is
    /// committed only after all rows have been converted.
    async fn run_scoped(
        &self,
        ns: &TenantNamespace,
        statement: &str,
        mode: ExecutionMode,
    ) -> Result<QueryResult> {
        let mut client = self.acquire().await?;
        let tx = client.build_transaction().read_only(mode.is_readonly()).start().await?;
        scope_transaction(&tx, ns, self.statement_timeout).await?;

        let stmt = tx.prepare(statement).await?;

        let result = if stmt.columns().is_empty() {
            QueryResult::affected(tx.execute(&stmt, &[]).await?)
        } else {
            let columns = stmt.columns().iter().map(|c| c.name().to_string()).collect();
            let rows = tx.query(&stmt, &[]).await?;
            let rows = rows.iter().map(row_to_json).collect::<Result<Vec<_>>>()?;
            QueryResult::with_rows(columns, rows)
        };

        tx.commit().await?;
        debug!(affected_rows = result.affected_rows, "statement committed");
        Ok(result)
    }
}
