//! Statement Policy for Tenant SQL
//!
//! This module decides whether a submitted statement may reach the database at all.
//! It runs before any connection is acquired.
//!
//! # Validation Strategy
//! - Empty statements are rejected as validation errors
//! - A fixed deny-list of destructive patterns aimed at tenant-management objects is
//!   matched case-insensitively anywhere in the text
//! - Readonly mode only admits statements that begin with `SELECT`
//!
//! This is a textual heuristic, not a SQL parser. It can reject a harmless statement
//! that mentions a pattern inside a string literal, and it cannot see through
//! dynamically constructed SQL (`EXECUTE format(...)`). Running tenant SQL under a
//! role whose privileges are scoped to its own schema is the real boundary.

use crate::error::{Result, SchemataError};

/// Destructive patterns, already normalized (uppercase, single spaces)
pub const DENY_LIST: &[&str] = &[
    "DROP DATABASE",
    "DROP SCHEMA PROJECT_",
    "DROP SCHEMA IF EXISTS PROJECT_",
    "TRUNCATE PROJECT_",
];

/// How a statement is going to be executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Any statement not caught by the deny-list
    #[default]
    ReadWrite,
    /// `SELECT` statements only
    ReadOnly,
}

impl ExecutionMode {
    /// Mode from a `readonly` flag
    #[must_use]
    pub const fn from_readonly(readonly: bool) -> Self {
        if readonly {
            Self::ReadOnly
        } else {
            Self::ReadWrite
        }
    }

    #[must_use]
    pub const fn is_readonly(self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

/// Validate a statement against the execution policy
///
/// Returns the trimmed statement that should be sent to the database.
///
/// # Errors
/// * `Validation` if the statement is empty
/// * `PolicyViolation` if a deny-list pattern matches, or a non-`SELECT` statement is
///   submitted in readonly mode
pub fn validate_statement(sql: &str, mode: ExecutionMode) -> Result<&str> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(SchemataError::validation("Query cannot be empty"));
    }

    let normalized = normalize(trimmed);

    if let Some(pattern) = DENY_LIST.iter().find(|pattern| normalized.contains(*pattern)) {
        return Err(SchemataError::policy_violation(format!("Forbidden operation: {pattern}")));
    }

    if mode.is_readonly() && !normalized.starts_with("SELECT") {
        return Err(SchemataError::policy_violation("Only SELECT allowed in readonly mode"));
    }

    Ok(trimmed)
}

/// Uppercase and collapse whitespace runs so `drop   schema` matches `DROP SCHEMA`
fn normalize(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}
