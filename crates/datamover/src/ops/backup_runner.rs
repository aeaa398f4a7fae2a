//! `backup_runner`: export, encrypt, upload, and verify.
//!
//! With `temp_location=network` every table becomes its own encrypted
//! artifact; with `temp_location=local` the whole database is exported as a
//! single dump. Either way each stored object gets a digest record that is
//! read back and verified before the unit counts as done.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{OperationKind, TempLocation};
use crate::crypto::CryptoHelper;
use crate::db::{DatabaseClient, TableData};
use crate::engine::{ShippingAndReceiving, UnitTask};
use crate::error::{MoverError, Result};
use crate::ops::{object_key, resolve_tables, upload_and_verify, OperationContext, TransferStrategy};
use crate::report::OperationReport;

/// Whole-database export used for `temp_location=local` backups.
#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseDump {
    pub database: String,
    pub structure: String,
    pub tables: Vec<TableData>,
}

pub struct BackupRunner;

#[async_trait]
impl TransferStrategy for BackupRunner {
    fn kind(&self) -> OperationKind {
        OperationKind::BackupRunner
    }

    async fn run(
        &self,
        ctx: &OperationContext,
        engine: &ShippingAndReceiving,
    ) -> Result<OperationReport> {
        let source: Arc<dyn DatabaseClient> = ctx.connector.connect(&ctx.request.source).await?;
        let store = ctx.storage()?;
        // Payload key is derived from the secret salted with the database
        // name, so two databases never share a key.
        let crypto = Arc::new(CryptoHelper::new(&ctx.request.secret, source.database()));
        let database = source.database().to_string();
        let exported_at = Utc::now();

        let units = match ctx.request.temp_location {
            TempLocation::Network => {
                let tables = resolve_tables(&source, &ctx.request.tables).await?;
                info!(
                    "Backing up {} table(s) of {} to object storage",
                    tables.len(),
                    database
                );

                let mut units = Vec::with_capacity(tables.len());
                for table in tables {
                    let source = Arc::clone(&source);
                    let store = Arc::clone(&store);
                    let crypto = Arc::clone(&crypto);
                    let database = database.clone();
                    units.push(UnitTask::new(table.full_name(), move || {
                        let source = Arc::clone(&source);
                        let store = Arc::clone(&store);
                        let crypto = Arc::clone(&crypto);
                        let database = database.clone();
                        let table = table.clone();
                        Box::pin(async move {
                            let data = source.read_table(&table).await?;
                            let rows = data.row_count();
                            let payload = serde_json::to_vec(&data).map_err(MoverError::Json)?;
                            let sealed = crypto.encrypt(&payload)?;
                            let key = object_key(&database, &table.full_name(), exported_at);
                            upload_and_verify(&store, &table.full_name(), &key, sealed).await?;
                            Ok(rows)
                        })
                    }));
                }
                units
            }
            TempLocation::Local => {
                info!("Backing up {} as a single dump", database);
                let database = database.clone();
                vec![UnitTask::new(format!("dump:{}", database), move || {
                    let source = Arc::clone(&source);
                    let store = Arc::clone(&store);
                    let crypto = Arc::clone(&crypto);
                    let database = database.clone();
                    Box::pin(async move {
                        let structure = source.dump_structure().await?;
                        let mut tables = Vec::new();
                        let mut rows = 0u64;
                        for table in source.list_tables().await? {
                            let data = source.read_table(&table).await?;
                            rows += data.row_count();
                            tables.push(data);
                        }
                        let dump = DatabaseDump {
                            database: database.clone(),
                            structure,
                            tables,
                        };
                        let payload = serde_json::to_vec(&dump).map_err(MoverError::Json)?;
                        let sealed = crypto.encrypt(&payload)?;
                        let key = object_key(&database, "dump", exported_at);
                        upload_and_verify(&store, &database, &key, sealed).await?;
                        Ok(rows)
                    })
                })]
            }
        };

        Ok(engine.run(self.kind(), units).await)
    }
}
