//! `staging_to_process`: copy the staging table set source to destination,
//! one transaction per table, with a read/write row-count check.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::OperationKind;
use crate::db::DatabaseClient;
use crate::engine::{ShippingAndReceiving, UnitTask};
use crate::error::{MoverError, Result};
use crate::ops::{resolve_tables, OperationContext, TransferStrategy};
use crate::report::OperationReport;

pub struct StagingToProcess;

#[async_trait]
impl TransferStrategy for StagingToProcess {
    fn kind(&self) -> OperationKind {
        OperationKind::StagingToProcess
    }

    async fn run(
        &self,
        ctx: &OperationContext,
        engine: &ShippingAndReceiving,
    ) -> Result<OperationReport> {
        let source: Arc<dyn DatabaseClient> = ctx.connector.connect(&ctx.request.source).await?;
        let dest: Arc<dyn DatabaseClient> = ctx.connector.connect(ctx.request.dest()?).await?;

        let tables = resolve_tables(&source, &ctx.request.tables).await?;
        info!(
            "Staging {} table(s) from {} to {}",
            tables.len(),
            source.database(),
            dest.database()
        );

        let mut units = Vec::with_capacity(tables.len());
        for table in tables {
            let source = Arc::clone(&source);
            let dest = Arc::clone(&dest);
            units.push(UnitTask::new(table.full_name(), move || {
                let source = Arc::clone(&source);
                let dest = Arc::clone(&dest);
                let table = table.clone();
                Box::pin(async move {
                    let data = source.read_table(&table).await?;
                    let read = data.row_count();
                    let written = dest.write_table(&data).await?;
                    if written != read {
                        return Err(MoverError::integrity(
                            table.full_name(),
                            format!("read {} rows but wrote {}", read, written),
                        ));
                    }
                    Ok(written)
                })
            }));
        }

        Ok(engine.run(self.kind(), units).await)
    }
}
