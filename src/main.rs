//! Schemata CLI Entry Point
//!
//! One subcommand per tenant operation, plus `mcp` to serve the same operations
//! to AI agents over stdio.
//!
//! All output to stdout is JSON-only: exactly one envelope per command (or the
//! JSON-RPC stream in `mcp` mode). Logs and prompts go to stderr. The process
//! exits with status 1 whenever the envelope has `"ok": false`.

use std::io::Read;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::error;

use schemata::config::{self, LogFormat, LogLayer, SettingsLayer};
use schemata::engine::postgres::PostgresEngine;
use schemata::engine::{QueryResult, TenantDatabase, DEFAULT_PAGE_LIMIT};
use schemata::mcp::McpServer;
use schemata::output::{query_envelope, ErrorEnvelope, Metadata, SuccessEnvelope};
use schemata::{logging, Result, SchemataError};

/// Schemata - per-project PostgreSQL namespaces with policy-checked SQL
#[derive(Parser)]
#[command(name = "schemata")]
#[command(about = "Isolated PostgreSQL schemas per project, with guarded SQL and a migration ledger")]
#[command(version)]
struct Cli {
    /// PostgreSQL connection URL (overrides DATABASE_URL and config files)
    #[arg(long, global = true, value_name = "URL")]
    database_url: Option<String>,

    /// Maximum pooled connections
    #[arg(long, global = true, value_name = "N")]
    pool_size: Option<usize>,

    /// Statement timeout for tenant SQL in seconds (0 disables)
    #[arg(long, global = true, value_name = "SECS")]
    statement_timeout: Option<u64>,

    /// Log output format on stderr
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project namespace and its migration ledger (idempotent)
    Create { project_id: u64 },

    /// Drop a project namespace and all of its data
    Drop {
        project_id: u64,

        /// Skip the interactive confirmation
        #[arg(long)]
        yes: bool,
    },

    /// List tables with columns and row counts
    Tables { project_id: u64 },

    /// Read one page of a table
    Data {
        project_id: u64,
        table: String,

        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT, allow_negative_numbers = true)]
        limit: i64,

        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i64,
    },

    /// Execute one SQL statement inside the project namespace ("-" reads stdin)
    Query {
        project_id: u64,
        sql: String,

        /// Only allow SELECT statements
        #[arg(long)]
        readonly: bool,
    },

    /// Apply a migration and record it in the ledger ("-" reads stdin)
    Migrate {
        project_id: u64,
        sql: String,

        /// Description recorded in the ledger
        #[arg(long, short)]
        description: String,
    },

    /// List applied migrations, newest first
    Migrations { project_id: u64 },

    /// Print the schema as CREATE TABLE statements
    Schema { project_id: u64 },

    /// Start MCP server (JSON-RPC over stdio, for AI agent integration)
    Mcp,

    /// Save the global flags to a config file for later runs
    Config {
        /// Write the user config file instead of ./.schemata/config.json
        #[arg(long)]
        global: bool,

        /// Store the name of a variable holding the URL instead of the URL itself
        #[arg(long, value_name = "VAR")]
        database_url_env: Option<String>,
    },
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Drop { .. } => "drop",
            Self::Tables { .. } => "tables",
            Self::Data { .. } => "data",
            Self::Query { .. } => "query",
            Self::Migrate { .. } => "migrate",
            Self::Migrations { .. } => "migrations",
            Self::Schema { .. } => "schema",
            Self::Mcp => "mcp",
            Self::Config { .. } => "config",
        }
    }

    const fn project_id(&self) -> Option<u64> {
        match self {
            Self::Create { project_id }
            | Self::Drop { project_id, .. }
            | Self::Tables { project_id }
            | Self::Data { project_id, .. }
            | Self::Query { project_id, .. }
            | Self::Migrate { project_id, .. }
            | Self::Migrations { project_id }
            | Self::Schema { project_id } => Some(*project_id),
            Self::Mcp | Self::Config { .. } => None,
        }
    }
}

impl Cli {
    fn overrides(&self) -> SettingsLayer {
        SettingsLayer {
            database_url: self.database_url.clone(),
            database_url_env: None,
            pool_max_size: self.pool_size,
            statement_timeout_secs: self.statement_timeout,
            log: LogLayer { level: None, format: self.log_format },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.name();
    let project_id = cli.command.project_id();

    if let Commands::Config { global, database_url_env } = &cli.command {
        let layer = SettingsLayer { database_url_env: database_url_env.clone(), ..cli.overrides() };
        return save_config(*global, layer);
    }

    let settings = match config::resolve_from_process(cli.overrides()) {
        Ok(settings) => settings,
        Err(err) => return fail(project_id, command, &err),
    };

    if let Err(err) = logging::init(&settings.log) {
        return fail(project_id, command, &err);
    }

    let db = match PostgresEngine::connect(&settings).await {
        Ok(db) => db,
        Err(err) => return fail(project_id, command, &err),
    };

    let code = run(&db, cli.command).await;
    db.close();
    code
}

async fn run(db: &PostgresEngine, command: Commands) -> ExitCode {
    let name = command.name();
    let started = Instant::now();

    match command {
        Commands::Create { project_id } => {
            respond(project_id, name, db.create_namespace(project_id).await, started)
        }
        Commands::Drop { project_id, yes } => {
            if let Err(err) = confirm_drop(project_id, yes) {
                return fail(Some(project_id), name, &err);
            }
            let dropped = db.drop_namespace(project_id).await;
            respond(project_id, name, dropped.map(|()| serde_json::json!({ "dropped": true })), started)
        }
        Commands::Tables { project_id } => {
            respond(project_id, name, db.list_tables(project_id).await, started)
        }
        Commands::Data { project_id, table, limit, offset } => {
            let result = db.get_table_data(project_id, &table, limit, offset).await;
            respond_query(project_id, name, result, started)
        }
        Commands::Query { project_id, sql, readonly } => match read_sql_arg(sql) {
            Ok(sql) => respond_query(project_id, name, db.execute(project_id, &sql, readonly).await, started),
            Err(err) => fail(Some(project_id), name, &err),
        },
        Commands::Migrate { project_id, sql, description } => match read_sql_arg(sql) {
            Ok(sql) => {
                let result = db.apply_migration(project_id, &sql, &description).await;
                respond_query(project_id, name, result, started)
            }
            Err(err) => fail(Some(project_id), name, &err),
        },
        Commands::Migrations { project_id } => {
            respond(project_id, name, db.list_migrations(project_id).await, started)
        }
        Commands::Schema { project_id } => {
            let schema = db.schema_as_sql(project_id).await;
            respond(project_id, name, schema.map(|sql| serde_json::json!({ "sql": sql })), started)
        }
        Commands::Config { .. } => {
            fail(None, name, &SchemataError::validation("config does not use a database connection"))
        }
        Commands::Mcp => match McpServer::new(db.clone()).serve_stdio().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, "MCP server stopped");
                ExitCode::FAILURE
            }
        },
    }
}

fn save_config(global: bool, layer: SettingsLayer) -> ExitCode {
    let started = Instant::now();
    match write_config(global, layer) {
        Ok(data) => {
            emit(&SuccessEnvelope::new(None, "config", data, Metadata::new(elapsed_ms(started))));
            ExitCode::SUCCESS
        }
        Err(err) => fail(None, "config", &err),
    }
}

/// Merge `layer` over the chosen config file and write it back
fn write_config(global: bool, layer: SettingsLayer) -> Result<serde_json::Value> {
    let path = if global { config::global_config_path()? } else { config::local_config_path()? };
    let merged = layer.or(config::load_layer(&path)?);
    config::save_layer(&path, &merged)?;

    Ok(serde_json::json!({
        "path": path.display().to_string(),
        "database_url": merged.database_url.as_deref().map(config::redact_url),
        "database_url_env": merged.database_url_env,
    }))
}

/// Ask on stderr unless `--yes` was given
fn confirm_drop(project_id: u64, yes: bool) -> Result<()> {
    if yes {
        return Ok(());
    }

    let confirmed = dialoguer::Confirm::new()
        .with_prompt(format!("Drop namespace project_{project_id} and ALL of its data?"))
        .default(false)
        .interact()
        .map_err(|e| {
            SchemataError::validation(format!("Confirmation unavailable ({e}); pass --yes to drop"))
        })?;

    if confirmed {
        Ok(())
    } else {
        Err(SchemataError::validation("Drop cancelled"))
    }
}

/// `-` means read the SQL from stdin
fn read_sql_arg(sql: String) -> Result<String> {
    if sql != "-" {
        return Ok(sql);
    }

    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| SchemataError::validation(format!("Could not read SQL from stdin: {e}")))?;
    Ok(buf)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn respond<T: Serialize>(project_id: u64, command: &str, result: Result<T>, started: Instant) -> ExitCode {
    match result {
        Ok(data) => {
            let meta = Metadata::new(elapsed_ms(started));
            emit(&SuccessEnvelope::new(Some(project_id), command, data, meta));
            ExitCode::SUCCESS
        }
        Err(err) => fail(Some(project_id), command, &err),
    }
}

fn respond_query(project_id: u64, command: &str, result: QueryResult, started: Instant) -> ExitCode {
    match query_envelope(project_id, command, result, elapsed_ms(started)) {
        Ok(envelope) => {
            emit(&envelope);
            ExitCode::SUCCESS
        }
        Err(envelope) => {
            emit(&envelope);
            ExitCode::FAILURE
        }
    }
}

fn fail(project_id: Option<u64>, command: &str, err: &SchemataError) -> ExitCode {
    emit(&ErrorEnvelope::from_error(project_id, command, err));
    ExitCode::FAILURE
}

fn emit(envelope: &impl Serialize) {
    match serde_json::to_string(envelope) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("could not serialize output: {e}"),
    }
}
