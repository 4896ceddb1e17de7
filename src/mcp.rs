//! MCP (Model Context Protocol) Server
//!
//! This module implements an MCP server using manual JSON-RPC 2.0 over stdio.
//!
//! # Architecture
//!
//! - **Transport**: JSON-RPC 2.0 over stdio (line-based)
//! - **Engine**: the caller hands in any [`TenantDatabase`]; the server owns no
//!   connections of its own
//! - **Schemas**: tool input schemas are derived with `schemars` from the same
//!   structs the arguments are deserialized into
//!
//! # MCP Tools
//!
//! - `create_namespace` / `drop_namespace` - Namespace lifecycle
//! - `list_tables` / `schema_sql` - Introspection
//! - `get_table_data` / `execute` - Tenant SQL
//! - `apply_migration` / `list_migrations` - Migration ledger
//!
//! # Error Reporting
//!
//! Malformed requests and unknown tools are JSON-RPC errors. A tool that ran and
//! failed (policy violation, SQL error, missing namespace) returns a normal
//! result with `isError: true` and the error text as content.
//!
//! # Usage
//!
//! Start the MCP server with: `schemata mcp`

use anyhow::{anyhow, Result};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::engine::{QueryResult, TenantDatabase, DEFAULT_PAGE_LIMIT};
use crate::error::SchemataError;

const PROTOCOL_VERSION: &str = "2024-11-05";

// ============================================================================
// JSON-RPC 2.0 Structures
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn result(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(result), error: None }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message, data: None }),
        }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

// ============================================================================
// MCP Tool Result Structures
// ============================================================================

/// Text content block for MCP tool results
#[derive(Debug, Serialize)]
struct TextContent {
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}

impl TextContent {
    fn new(text: String) -> Self {
        Self { content_type: "text".to_string(), text }
    }
}

/// MCP tool call result
#[derive(Debug, Serialize)]
struct CallToolResult {
    content: Vec<TextContent>,
    #[serde(rename = "isError")]
    is_error: bool,
}

impl CallToolResult {
    /// Successful tool result carrying pretty-printed JSON
    fn success(data: impl Serialize) -> Result<Value> {
        let json_text = serde_json::to_string_pretty(&data)?;
        let result = Self { content: vec![TextContent::new(json_text)], is_error: false };
        Ok(serde_json::to_value(result)?)
    }

    /// Tool ran and failed
    fn failure(message: String) -> Result<Value> {
        let result = Self { content: vec![TextContent::new(message)], is_error: true };
        Ok(serde_json::to_value(result)?)
    }

    fn from_result(result: crate::error::Result<impl Serialize>) -> Result<Value> {
        match result {
            Ok(data) => Self::success(data),
            Err(err) => Self::failure(err.message()),
        }
    }

    fn from_query(result: QueryResult) -> Result<Value> {
        match result.error {
            Some(message) => Self::failure(message),
            None => Self::success(result),
        }
    }
}

// ============================================================================
// Tool Arguments
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct ProjectArgs {
    /// Project identifier; the namespace is `project_{project_id}`
    project_id: u64,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct DropNamespaceArgs {
    /// Project identifier
    project_id: u64,

    /// Must be `true`. Dropping deletes every table and row in the namespace.
    confirm: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct TableDataArgs {
    /// Project identifier
    project_id: u64,

    /// Table name (letters, digits and underscores only)
    table: String,

    /// Maximum rows to return (default 100)
    #[serde(default = "default_limit")]
    limit: i64,

    /// Rows to skip (default 0)
    #[serde(default)]
    offset: i64,
}

const fn default_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct ExecuteArgs {
    /// Project identifier
    project_id: u64,

    /// A single SQL statement; unqualified names resolve inside the project namespace
    sql: String,

    /// Only allow SELECT statements (default false)
    #[serde(default)]
    readonly: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct ApplyMigrationArgs {
    /// Project identifier
    project_id: u64,

    /// Migration SQL; may contain several statements
    sql: String,

    /// Human-readable description recorded in the ledger
    description: String,
}

/// One advertised tool
struct ToolDef {
    name: &'static str,
    description: &'static str,
    input_schema: fn() -> Value,
}

fn input_schema<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();
    if let Some(map) = schema.as_object_mut() {
        map.remove("$schema");
        map.remove("title");
    }
    schema
}

const TOOLS: &[ToolDef] = &[
    ToolDef {
        name: "create_namespace",
        description: "Create the isolated namespace for a project, including its migration ledger. Idempotent: calling it for an existing project changes nothing.",
        input_schema: input_schema::<ProjectArgs>,
    },
    ToolDef {
        name: "drop_namespace",
        description: "IRREVERSIBLE: drop a project's namespace and every table and row in it. Only call this when the user explicitly asked for it, and pass confirm=true.",
        input_schema: input_schema::<DropNamespaceArgs>,
    },
    ToolDef {
        name: "list_tables",
        description: "List the user tables of a project with their columns (name, type, nullable, default, primary key) and row counts. Internal tables are hidden.",
        input_schema: input_schema::<ProjectArgs>,
    },
    ToolDef {
        name: "get_table_data",
        description: "Read one page of rows from a project table. Use small limits first on tables of unknown size.",
        input_schema: input_schema::<TableDataArgs>,
    },
    ToolDef {
        name: "execute",
        description: "Execute one SQL statement inside a project's namespace. Set readonly=true for exploration; destructive operations on namespaces or databases are always refused.",
        input_schema: input_schema::<ExecuteArgs>,
    },
    ToolDef {
        name: "apply_migration",
        description: "Apply migration SQL to a project and record it in the migration ledger. The SQL and the ledger entry commit together or not at all.",
        input_schema: input_schema::<ApplyMigrationArgs>,
    },
    ToolDef {
        name: "list_migrations",
        description: "List the migrations applied to a project, newest first.",
        input_schema: input_schema::<ProjectArgs>,
    },
    ToolDef {
        name: "schema_sql",
        description: "Render a project's current schema as CREATE TABLE statements. Approximate: constraints other than primary keys, NOT NULL and defaults are omitted.",
        input_schema: input_schema::<ProjectArgs>,
    },
];

// ============================================================================
// MCP Server
// ============================================================================

/// MCP server bound to one engine
pub struct McpServer<D> {
    db: D,
}

impl<D: TenantDatabase> McpServer<D> {
    pub const fn new(db: D) -> Self {
        Self { db }
    }

    /// Serve requests from stdin until EOF
    ///
    /// # Errors
    /// Returns an error if stdio communication fails.
    pub async fn serve_stdio(&self) -> Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.serve(stdin, tokio::io::stdout()).await
    }

    /// Serve line-delimited JSON-RPC from `reader`, answering on `writer`
    ///
    /// # Protocol
    /// - Each request is a single line of JSON
    /// - Each response is a single line of JSON
    /// - Notifications (no `id`) get no response
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("MCP server ready");
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(&line).await {
                let mut response_json = serde_json::to_string(&response)?;
                response_json.push('\n');
                writer.write_all(response_json.as_bytes()).await?;
                writer.flush().await?;
            }
        }

        info!("MCP input closed");
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "unparsable JSON-RPC message");
                return Some(JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {e}")));
            }
        };

        if request.id.is_none() {
            debug!(method = %request.method, "notification ignored");
            return None;
        }

        Some(self.handle_request(request).await)
    }

    /// Route a JSON-RPC request by method name
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id;
        let result = match request.method.as_str() {
            "initialize" => Ok(handle_initialize()),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => Ok(handle_list_tools()),
            "tools/call" => self.handle_call_tool(request.params).await,
            other => {
                return JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Unknown method: {other}"))
            }
        };

        match result {
            Ok(value) => JsonRpcResponse::result(id, value),
            Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
        }
    }

    /// Route a tool call to its implementation
    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params = params.ok_or_else(|| anyhow!("Missing params"))?;
        let name = params["name"].as_str().ok_or_else(|| anyhow!("Missing tool name"))?;
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| serde_json::json!({}));

        debug!(tool = name, "tool call");

        match name {
            "create_namespace" => {
                let args: ProjectArgs = parse_args(name, arguments)?;
                CallToolResult::from_result(self.db.create_namespace(args.project_id).await)
            }
            "drop_namespace" => {
                let args: DropNamespaceArgs = parse_args(name, arguments)?;
                if !args.confirm {
                    return CallToolResult::failure(
                        SchemataError::validation("drop_namespace requires confirm=true").message(),
                    );
                }
                let dropped = self.db.drop_namespace(args.project_id).await;
                CallToolResult::from_result(
                    dropped.map(|()| serde_json::json!({ "dropped": args.project_id })),
                )
            }
            "list_tables" => {
                let args: ProjectArgs = parse_args(name, arguments)?;
                CallToolResult::from_result(self.db.list_tables(args.project_id).await)
            }
            "get_table_data" => {
                let args: TableDataArgs = parse_args(name, arguments)?;
                CallToolResult::from_query(
                    self.db.get_table_data(args.project_id, &args.table, args.limit, args.offset).await,
                )
            }
            "execute" => {
                let args: ExecuteArgs = parse_args(name, arguments)?;
                CallToolResult::from_query(self.db.execute(args.project_id, &args.sql, args.readonly).await)
            }
            "apply_migration" => {
                let args: ApplyMigrationArgs = parse_args(name, arguments)?;
                CallToolResult::from_query(
                    self.db.apply_migration(args.project_id, &args.sql, &args.description).await,
                )
            }
            "list_migrations" => {
                let args: ProjectArgs = parse_args(name, arguments)?;
                CallToolResult::from_result(self.db.list_migrations(args.project_id).await)
            }
            "schema_sql" => {
                let args: ProjectArgs = parse_args(name, arguments)?;
                CallToolResult::from_result(
                    self.db.schema_as_sql(args.project_id).await.map(|sql| serde_json::json!({ "sql": sql })),
                )
            }
            _ => Err(anyhow!("Unknown tool: {name}")),
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T> {
    serde_json::from_value(arguments).map_err(|e| anyhow!("Invalid arguments for {tool}: {e}"))
}

// ============================================================================
// MCP Protocol Handlers
// ============================================================================

/// Server capabilities and metadata
fn handle_initialize() -> Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": "schemata",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// Available tools with their input schemas
fn handle_list_tools() -> Value {
    let tools: Vec<Value> = TOOLS
        .iter()
        .map(|tool| {
            serde_json::json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": (tool.input_schema)(),
            })
        })
        .collect();

    serde_json::json!({ "tools": tools })
}
