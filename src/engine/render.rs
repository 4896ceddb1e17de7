//! Schema-as-SQL Rendering
//!
//! Turns introspected [`TableDescriptor`]s back into `CREATE TABLE` text. The output
//! is compact context for a completion model that writes migrations. It is not a
//! faithful dump.
//!
//! # Known Limitations
//! Foreign keys, indexes, unique and check constraints, sequences ownership and
//! comments are not reconstructed. Types come from `information_schema.columns.data_type`,
//! so arrays render as `ARRAY` and enums as `USER-DEFINED`. A composite primary key
//! marks every key column `PRIMARY KEY`, which PostgreSQL would reject. Do not
//! replay this text against a database.

use crate::engine::{ColumnDescriptor, TableDescriptor};

/// Render tables as `CREATE TABLE` statements separated by a blank line
///
/// Per column, clauses are appended in a fixed order: `PRIMARY KEY`, `NOT NULL`,
/// `DEFAULT <expr>`.
#[must_use]
pub fn schema_as_sql(tables: &[TableDescriptor]) -> String {
    tables.iter().map(render_table).collect::<Vec<_>>().join("\n\n")
}

fn render_table(table: &TableDescriptor) -> String {
    let lines: Vec<String> = table.columns.iter().map(render_column).collect();
    format!("CREATE TABLE {} (\n{}\n);", table.name, lines.join(",\n"))
}

fn render_column(col: &ColumnDescriptor) -> String {
    let mut def = format!("  {} {}", col.name, col.data_type);
    if col.is_primary {
        def.push_str(" PRIMARY KEY");
    }
    if !col.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = col.default.as_deref().filter(|d| !d.is_empty()) {
        def.push_str(" DEFAULT ");
        def.push_str(default);
    }
    def
}
