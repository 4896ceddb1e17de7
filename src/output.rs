//! JSON Output Envelope Types
//!
//! This module defines the structured JSON output format for every CLI command.
//! All commands print either a `SuccessEnvelope` or an `ErrorEnvelope`.
//!
//! # Output Contract
//! - Success: `{"ok": true, "project_id": 42, "command": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "project_id": 42, "command": "...", "error": {"code": "...", "message": "..."}}`
//!
//! A `QueryResult` carrying an `error` is reported as an error envelope with code
//! [`QUERY_FAILED`], so callers only need to inspect `ok`.

use serde::{Deserialize, Serialize};

use crate::engine::QueryResult;
use crate::error::SchemataError;

/// Error code for a statement that reached the engine and failed there
pub const QUERY_FAILED: &str = "QUERY_FAILED";

/// Success envelope for command results
///
/// Generic over the data type to support different command return values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Project the command ran against (absent for project-independent commands)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<u64>,

    /// Command that was executed (create, tables, query, migrate, ...)
    pub command: String,

    /// Command-specific data
    pub data: T,

    /// Execution metadata
    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    /// Create a new success envelope
    pub fn new(project_id: Option<u64>, command: impl Into<String>, data: T, meta: Metadata) -> Self {
        Self { ok: true, project_id, command: command.into(), data, meta }
    }
}

/// Error envelope for command failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<u64>,

    /// Command that was attempted
    pub command: String,

    /// Error information
    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    /// Create a new error envelope
    pub fn new(project_id: Option<u64>, command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, project_id, command: command.into(), error }
    }

    /// Create error envelope from `SchemataError`
    pub fn from_error(project_id: Option<u64>, command: impl Into<String>, err: &SchemataError) -> Self {
        Self::new(project_id, command, ErrorInfo::new(err.error_code(), err.message()))
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "POLICY_VIOLATION", "QUERY_FAILED")
    pub code: String,

    /// Human-readable error message (never contains credentials)
    pub message: String,
}

impl ErrorInfo {
    /// Create a new error info
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Execution time in milliseconds
    pub execution_ms: u64,

    /// Number of rows returned (row-returning commands only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_returned: Option<usize>,
}

impl Metadata {
    /// Create new metadata with just execution time
    #[must_use]
    pub const fn new(execution_ms: u64) -> Self {
        Self { execution_ms, rows_returned: None }
    }

    /// Create new metadata with execution time and row count
    #[must_use]
    pub const fn with_rows(execution_ms: u64, rows_returned: usize) -> Self {
        Self { execution_ms, rows_returned: Some(rows_returned) }
    }
}

/// Wrap a `QueryResult` in the matching envelope
///
/// # Errors
/// Returns the error envelope (code [`QUERY_FAILED`]) when the result carries an error.
pub fn query_envelope(
    project_id: u64,
    command: &str,
    result: QueryResult,
    execution_ms: u64,
) -> std::result::Result<SuccessEnvelope<QueryResult>, ErrorEnvelope> {
    match result.error {
        Some(message) => {
            Err(ErrorEnvelope::new(Some(project_id), command, ErrorInfo::new(QUERY_FAILED, message)))
        }
        None => {
            let meta = Metadata::with_rows(execution_ms, result.rows.len());
            Ok(SuccessEnvelope::new(Some(project_id), command, result, meta))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_serialization() {
        let envelope = SuccessEnvelope::new(
            Some(42),
            "query",
            serde_json::json!({"result": "test"}),
            Metadata::with_rows(7, 10),
        );

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""ok":true"#));
        assert!(json.contains(r#""project_id":42"#));
        assert!(json.contains(r#""command":"query"#));
        assert!(json.contains(r#""execution_ms":7"#));
        assert!(json.contains(r#""rows_returned":10"#));
    }

    #[test]
    fn test_error_envelope_from_schemata_error() {
        let err = SchemataError::policy_violation("Only SELECT allowed in readonly mode");
        let envelope = ErrorEnvelope::from_error(Some(3), "query", &err);

        assert!(!envelope.ok);
        assert_eq!(envelope.project_id, Some(3));
        assert_eq!(envelope.error.code, "POLICY_VIOLATION");
        assert!(envelope.error.message.contains("Only SELECT allowed"));
    }

    #[test]
    fn test_project_id_omitted_when_absent() {
        let envelope = ErrorEnvelope::new(None, "mcp", ErrorInfo::new("CONFIG_ERROR", "x"));
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(!json.contains("project_id"));
    }

    #[test]
    fn test_metadata_without_rows() {
        let json = serde_json::to_string(&Metadata::new(100)).unwrap();
        assert!(json.contains(r#""execution_ms":100"#));
        assert!(!json.contains("rows_returned"));
    }

    #[test]
    fn test_query_envelope_success() {
        let result = QueryResult::with_rows(
            vec!["id".to_string()],
            vec![vec![serde_json::json!(1)], vec![serde_json::json!(2)]],
        );
        let envelope = query_envelope(1, "query", result, 5).unwrap();
        assert!(envelope.ok);
        assert_eq!(envelope.meta.rows_returned, Some(2));
        assert_eq!(envelope.data.affected_rows, 2);
    }

    #[test]
    fn test_query_envelope_failure_uses_query_failed() {
        let result = QueryResult::failure(&SchemataError::execution("relation \"nope\" does not exist"));
        let envelope = query_envelope(1, "query", result, 5).unwrap_err();
        assert_eq!(envelope.error.code, QUERY_FAILED);
        assert!(envelope.error.message.contains("nope"));
    }
}
