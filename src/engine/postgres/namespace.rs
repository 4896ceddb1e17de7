//! Namespace lifecycle

use tracing::{error, info, instrument};

use super::ledger::ledger_ddl;
use super::PostgresEngine;
use crate::engine::{NamespaceInfo, TenantNamespace};
use crate::error::{Result, SchemataError};
use crate::identifier::quote_ident;

impl PostgresEngine {
    /// `CREATE SCHEMA IF NOT EXISTS` plus the ledger table, in one transaction
    #[instrument(skip_all, fields(project_id = ns.project_id(), namespace = %ns))]
    pub(super) async fn create_schema(&self, ns: &TenantNamespace) -> Result<NamespaceInfo> {
        let result = async {
            let mut client = self.acquire().await?;
            let tx = client.transaction().await?;
            tx.batch_execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(ns.name())))
                .await?;
            tx.batch_execute(&ledger_ddl(ns)).await?;
            tx.commit().await?;
            Ok::<_, SchemataError>(NamespaceInfo::from(ns))
        }
        .await;

        match result {
            Ok(info) => {
                info!("namespace ready");
                Ok(info)
            }
            Err(err) => {
                let err = err.into_fatal();
                error!(error = %err, "namespace creation failed");
                Err(err)
            }
        }
    }

    /// `DROP SCHEMA IF EXISTS ... CASCADE`
    #[instrument(skip_all, fields(project_id = ns.project_id(), namespace = %ns))]
    pub(super) async fn drop_schema(&self, ns: &TenantNamespace) -> Result<()> {
        let result = async {
            let client = self.acquire().await?;
            client
                .batch_execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_ident(ns.name())))
                .await?;
            Ok::<_, SchemataError>(())
        }
        .await;

        match result {
            Ok(()) => {
                info!("namespace dropped");
                Ok(())
            }
            Err(err) => {
                let err = err.into_fatal();
                error!(error = %err, "namespace drop failed");
                Err(err)
            }
        }
    }
}
