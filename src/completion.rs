//! Migration proposals from a text-completion model
//!
//! The model itself sits behind [`MigrationGenerator`]; this module only builds
//! the prompt from the live schema and cleans up the reply. A proposal is never
//! applied here: callers review it and pass it to
//! [`TenantDatabase::apply_migration`](crate::engine::TenantDatabase::apply_migration).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::engine::TenantDatabase;
use crate::error::{Result, SchemataError};

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^```(?:sql)?\s*").expect("fence pattern is valid"));
static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```$").expect("fence pattern is valid"));

/// A text-completion backend
pub trait MigrationGenerator: Send + Sync {
    /// Complete `prompt` and return the raw model output
    fn generate(&self, prompt: &str) -> impl std::future::Future<Output = Result<String>> + Send;
}

/// Generated SQL awaiting review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedMigration {
    pub sql: String,
    pub description: String,
}

/// Prompt asking for a migration against `schema_sql`
#[must_use]
pub fn build_migration_prompt(schema_sql: &str, request: &str) -> String {
    format!(
        "Current database schema:\n```sql\n{schema_sql}\n```\n\n\
         User request: {request}\n\n\
         Generate a PostgreSQL migration to fulfill this request.\n\
         Output ONLY the SQL, no explanations.\n\
         Use proper PostgreSQL syntax."
    )
}

/// Remove a surrounding Markdown code fence, if any
#[must_use]
pub fn strip_code_fences(text: &str) -> String {
    let text = LEADING_FENCE.replace(text.trim(), "");
    TRAILING_FENCE.replace(&text, "").trim().to_string()
}

/// Ask `generator` for a migration fulfilling `request` in a project
///
/// # Errors
/// * Whatever introspection or the generator return
/// * `Validation` if `request` is blank or the reply contains no SQL
#[instrument(skip_all, fields(project_id = project_id))]
pub async fn propose_migration<D, G>(
    db: &D,
    generator: &G,
    project_id: u64,
    request: &str,
) -> Result<ProposedMigration>
where
    D: TenantDatabase,
    G: MigrationGenerator,
{
    let request = request.trim();
    if request.is_empty() {
        return Err(SchemataError::validation("Migration request cannot be empty"));
    }

    let schema = db.schema_as_sql(project_id).await?;
    let prompt = build_migration_prompt(&schema, request);
    let reply = generator.generate(&prompt).await?;

    let sql = strip_code_fences(&reply);
    if sql.is_empty() {
        return Err(SchemataError::validation("Model returned no SQL"));
    }

    debug!(sql_len = sql.len(), "migration proposed");
    Ok(ProposedMigration { sql, description: request.to_string() })
}
