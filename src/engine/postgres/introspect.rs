//! Schema introspection via `information_schema`

use deadpool_postgres::Object;
use tracing::{debug, instrument, warn};

use super::PostgresEngine;
use crate::engine::{ColumnDescriptor, TableDescriptor, TenantNamespace};
use crate::error::Result;
use crate::identifier::{is_internal, quote_ident};

const LIST_TABLES_SQL: &str = "
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = $1
      AND table_type = 'BASE TABLE'
    ORDER BY table_name";

const LIST_COLUMNS_SQL: &str = "
    SELECT
        c.column_name::text,
        c.data_type::text,
        c.is_nullable::text,
        c.column_default::text,
        pk.column_name IS NOT NULL AS is_primary
    FROM information_schema.columns c
    LEFT JOIN (
        SELECT kcu.column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON tc.constraint_name = kcu.constraint_name
         AND tc.table_schema = kcu.table_schema
         AND tc.table_name = kcu.table_name
        WHERE tc.constraint_type = 'PRIMARY KEY'
          AND tc.table_schema = $1
          AND tc.table_name = $2
    ) pk ON c.column_name = pk.column_name
    WHERE c.table_schema = $1
      AND c.table_name = $2
    ORDER BY c.ordinal_position";

impl PostgresEngine {
    /// Every user table with its columns and a best-effort row count
    ///
    /// Tables are ordered by name. Internal tables (leading `_`) are skipped.
    #[instrument(skip_all, fields(project_id = ns.project_id(), namespace = %ns))]
    pub(super) async fn describe_tables(&self, ns: &TenantNamespace) -> Result<Vec<TableDescriptor>> {
        // No transaction here: a failed count must not abort the remaining catalog reads.
        let client = self.acquire().await?;

        let names: Vec<String> = client
            .query(LIST_TABLES_SQL, &[&ns.name()])
            .await?
            .iter()
            .map(|row| row.try_get(0))
            .collect::<std::result::Result<_, _>>()?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names.into_iter().filter(|name| !is_internal(name)) {
            let columns = list_columns(&client, ns, &name).await?;
            let row_count = count_rows(&client, ns, &name).await;
            tables.push(TableDescriptor { name, columns, row_count });
        }

        debug!(tables = tables.len(), "introspected namespace");
        Ok(tables)
    }
}

async fn list_columns(
    client: &Object,
    ns: &TenantNamespace,
    table: &str,
) -> Result<Vec<ColumnDescriptor>> {
    let rows = client.query(LIST_COLUMNS_SQL, &[&ns.name(), &table]).await?;

    rows.iter()
        .map(|row| {
            let is_nullable: String = row.try_get(2)?;
            Ok(ColumnDescriptor {
                name: row.try_get(0)?,
                data_type: row.try_get(1)?,
                nullable: is_nullable == "YES",
                default: row.try_get(3)?,
                is_primary: row.try_get(4)?,
            })
        })
        .collect()
}

/// `COUNT(*)` for one table; 0 when the count fails
async fn count_rows(client: &Object, ns: &TenantNamespace, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {}.{}", quote_ident(ns.name()), quote_ident(table));

    match client.query_one(sql.as_str(), &[]).await.and_then(|row| row.try_get::<_, i64>(0)) {
        Ok(count) => count,
        Err(err) => {
            warn!(table, error = %err, "row count failed, reporting 0");
            0
        }
    }
}
