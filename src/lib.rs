//! Schemata - Tenant Database Isolation and SQL Execution
//!
//! Schemata gives every project its own PostgreSQL schema (`project_{id}`) inside one
//! shared database, runs caller-supplied SQL inside that schema under a statement
//! policy, introspects the schema, and keeps a per-project ledger of applied
//! migrations.
//!
//! # Core Principles
//! - Isolation by namespace: unqualified names always resolve inside the project schema
//! - Caller identifiers are validated before they reach SQL text
//! - Routine SQL failures are data (`QueryResult::error`), not panics or `Err`
//! - Session settings never outlive the call that set them
//!
//! # Architecture
//! The library provides the core functionality for both the CLI and MCP interfaces.
//! Both are thin wrappers over the [`TenantDatabase`] trait.
//!
//! # Module Organization
//! - [`identifier`] - SQL identifier validation and quoting
//! - [`capability`] - Statement policy (deny-list, readonly gate)
//! - [`engine`] - Tenant engine trait, data model and the PostgreSQL engine
//! - [`completion`] - Migration proposals from a completion model
//! - [`config`] - Layered settings resolution
//! - [`logging`] - `tracing` subscriber setup
//! - [`output`] - JSON output envelope types
//! - [`error`] - Error types and handling
//! - [`mcp`] - MCP server

pub mod capability;
pub mod completion;
pub mod config;
pub mod engine;
pub mod error;
pub mod identifier;
pub mod logging;
pub mod mcp;
pub mod output;

pub use capability::{validate_statement, ExecutionMode};
pub use config::{LogFormat, LogSettings, Settings, SettingsLayer};
pub use engine::postgres::PostgresEngine;
pub use engine::{
    ColumnDescriptor, ConnectionInfo, MigrationRecord, NamespaceInfo, QueryResult,
    TableDescriptor, TenantDatabase, TenantNamespace,
};
pub use error::{Result, SchemataError};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
