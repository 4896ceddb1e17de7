//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout Schemata.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `Validation`: Unsafe identifiers, empty statements, malformed arguments
//! - `PolicyViolation`: Deny-listed statements and readonly write attempts
//! - `Execution`: Any database-level failure (syntax, constraint, timeout, permission)
//! - `NotFound`: Missing tenant namespace or table
//! - `ConnectionFailed`: Pool or connection acquisition errors
//! - `Fatal`: Namespace create/drop failures, which always propagate
//! - `ConfigError`: Configuration file or environment errors
//!
//! # Propagation
//! Routine tenant SQL (`execute`, `get_table_data`, `apply_migration`) never returns
//! these errors to callers; they are folded into a `QueryResult` carrying an `error`
//! message. Administrative namespace operations return them as `Err`.

use thiserror::Error;

/// Main error type for Schemata operations
#[derive(Error, Debug)]
pub enum SchemataError {
    /// Input rejected before reaching the database
    #[error("Validation error: {0}")]
    Validation(String),

    /// Statement blocked by the execution policy
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// Database-level execution failure
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Namespace or relation does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Could not obtain a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Administrative namespace operation failed
    #[error("Namespace operation failed: {0}")]
    Fatal(String),

    /// Configuration error (file not found, invalid JSON, missing URL, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SchemataError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling by callers.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::PolicyViolation(_) => "POLICY_VIOLATION",
            Self::Execution(_) => "EXECUTION_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::Fatal(_) => "FATAL",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Get human-readable error message
    ///
    /// Never contains the connection string or credentials.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a policy violation error
    pub fn policy_violation(message: impl Into<String>) -> Self {
        Self::PolicyViolation(message.into())
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a fatal namespace error
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Promote an error raised during namespace administration to `Fatal`
    ///
    /// Connection errors keep their category so callers can tell a retryable
    /// outage from a failed DDL statement.
    #[must_use]
    pub fn into_fatal(self) -> Self {
        match self {
            Self::Execution(msg) | Self::NotFound(msg) => Self::Fatal(msg),
            other => other,
        }
    }
}

impl From<tokio_postgres::Error> for SchemataError {
    fn from(err: tokio_postgres::Error) -> Self {
        use tokio_postgres::error::SqlState;

        match err.as_db_error() {
            Some(db) => {
                let code = db.code();
                let message = db.message().to_string();
                if *code == SqlState::UNDEFINED_TABLE || *code == SqlState::INVALID_SCHEMA_NAME {
                    Self::NotFound(message)
                } else {
                    Self::Execution(message)
                }
            }
            None if err.is_closed() => Self::ConnectionFailed(err.to_string()),
            None => Self::Execution(err.to_string()),
        }
    }
}

impl From<deadpool_postgres::PoolError> for SchemataError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::ConnectionFailed(format!("Could not acquire connection from pool: {err}"))
    }
}

/// Result type alias for Schemata operations
pub type Result<T> = std::result::Result<T, SchemataError>;
