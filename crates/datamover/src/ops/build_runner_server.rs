//! `build_runner_server`: clone structure (and data unless `nct`) from the
//! template database into the destination runner database.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::OperationKind;
use crate::db::DatabaseClient;
use crate::engine::{ShippingAndReceiving, UnitTask};
use crate::error::Result;
use crate::ops::{OperationContext, TransferStrategy};
use crate::report::OperationReport;

pub struct BuildRunnerServer;

#[async_trait]
impl TransferStrategy for BuildRunnerServer {
    fn kind(&self) -> OperationKind {
        OperationKind::BuildRunnerServer
    }

    async fn run(
        &self,
        ctx: &OperationContext,
        engine: &ShippingAndReceiving,
    ) -> Result<OperationReport> {
        let template_endpoint = ctx
            .request
            .source
            .with_database(&ctx.request.template_db);
        let template: Arc<dyn DatabaseClient> = ctx.connector.connect(&template_endpoint).await?;
        let dest: Arc<dyn DatabaseClient> = ctx.connector.connect(ctx.request.dest()?).await?;

        // list_tables is lexicographically ordered, so runs are reproducible
        // and a partial failure is resumable by table name.
        let tables = template.list_tables().await?;
        let structure_only = ctx.request.structure_only;

        info!(
            "Building runner {} from template {} ({} tables{})",
            dest.database(),
            template.database(),
            tables.len(),
            if structure_only { ", structure only" } else { "" }
        );

        let mut units = Vec::with_capacity(tables.len());
        for table in tables {
            let template = Arc::clone(&template);
            let dest = Arc::clone(&dest);
            // CREATE TABLE is not idempotent; a retried attempt must not
            // re-issue it once it has run.
            let ddl_applied = Arc::new(AtomicBool::new(false));
            units.push(UnitTask::new(table.full_name(), move || {
                let template = Arc::clone(&template);
                let dest = Arc::clone(&dest);
                let ddl_applied = Arc::clone(&ddl_applied);
                let table = table.clone();
                Box::pin(async move {
                    if !ddl_applied.load(Ordering::Acquire) {
                        let ddl = template.table_structure(&table).await?;
                        dest.execute_ddl(&ddl).await?;
                        ddl_applied.store(true, Ordering::Release);
                    }
                    if structure_only {
                        return Ok(0);
                    }
                    let data = template.read_table(&table).await?;
                    let written = dest.write_table(&data).await?;
                    Ok(written)
                })
            }));
        }

        Ok(engine.run(self.kind(), units).await)
    }
}
