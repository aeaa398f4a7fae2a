//! Operation dispatch.
//!
//! Each registered operation kind maps to one [`TransferStrategy`]. The
//! strategy builds the unit tasks for an invocation and hands them to the
//! transfer engine, which owns concurrency, retry, and reporting.

mod backup_runner;
mod build_runner_server;
mod create_database;
mod staging_to_process;
mod structure_backup;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::{OperationKind, OperationRequest};
use crate::db::{Connector, DatabaseClient, TableRef};
use crate::engine::ShippingAndReceiving;
use crate::error::{MoverError, Result};
use crate::report::OperationReport;
use crate::storage::{StorageClient, DIGEST_SUFFIX};
use crate::{crypto, storage};

pub use backup_runner::{BackupRunner, DatabaseDump};
pub use build_runner_server::BuildRunnerServer;
pub use create_database::CreateDatabase;
pub use staging_to_process::StagingToProcess;
pub use structure_backup::StructureBackup;

/// Everything a strategy needs to run: the resolved request plus the
/// collaborators it talks through.
pub struct OperationContext {
    pub request: OperationRequest,
    pub connector: Arc<dyn Connector>,
    pub storage: Option<Arc<dyn StorageClient>>,
}

impl OperationContext {
    /// Storage client, or a Config error for kinds that need one.
    pub fn storage(&self) -> Result<Arc<dyn StorageClient>> {
        self.storage.clone().ok_or_else(|| {
            MoverError::Config(format!(
                "Operation {} requires object storage",
                self.request.kind
            ))
        })
    }
}

/// One registered operation.
#[async_trait]
pub trait TransferStrategy: Send + Sync {
    fn kind(&self) -> OperationKind;

    /// Request-shape checks beyond the generic ones.
    fn validate(&self, request: &OperationRequest) -> Result<()> {
        request.validate()
    }

    async fn run(
        &self,
        ctx: &OperationContext,
        engine: &ShippingAndReceiving,
    ) -> Result<OperationReport>;
}

/// Map an operation kind to its strategy.
pub fn strategy_for(kind: OperationKind) -> Box<dyn TransferStrategy> {
    match kind {
        OperationKind::CreateDatabase => Box::new(CreateDatabase),
        OperationKind::BuildRunnerServer => Box::new(BuildRunnerServer),
        OperationKind::StagingToProcess => Box::new(StagingToProcess),
        OperationKind::BackupRunner => Box::new(BackupRunner),
        OperationKind::StructureBackup => Box::new(StructureBackup),
    }
}

/// Validate the request, build the engine, and run the operation.
pub async fn dispatch(ctx: &OperationContext, cancel: CancellationToken) -> Result<OperationReport> {
    let strategy = strategy_for(ctx.request.kind);
    strategy.validate(&ctx.request)?;
    let engine = ShippingAndReceiving::new(ctx.request.workers, ctx.request.retry.clone(), cancel);
    strategy.run(ctx, &engine).await
}

/// Resolve the table set for an operation: the explicit `--table` list when
/// given (sorted, each verified to exist), otherwise every user table.
pub(crate) async fn resolve_tables(
    client: &Arc<dyn DatabaseClient>,
    explicit: &Option<Vec<String>>,
) -> Result<Vec<TableRef>> {
    match explicit {
        Some(names) => {
            let mut tables: Vec<TableRef> = names.iter().map(|n| TableRef::parse(n)).collect();
            tables.sort_by(|a, b| a.full_name().cmp(&b.full_name()));
            tables.dedup();
            for table in &tables {
                if !client.table_exists(table).await? {
                    return Err(MoverError::Config(format!(
                        "table {} does not exist in database {}",
                        table,
                        client.database()
                    )));
                }
            }
            Ok(tables)
        }
        None => client.list_tables().await,
    }
}

/// Upload a sealed payload and verify its stored digest round-trips.
pub(crate) async fn upload_and_verify(
    store: &Arc<dyn StorageClient>,
    unit: &str,
    key: &str,
    sealed: Vec<u8>,
) -> Result<()> {
    let expected = crypto::digest(&sealed);
    let stored = store.put(key, sealed).await?;
    if stored != expected {
        return Err(MoverError::integrity(
            unit,
            format!("upload digest mismatch for {}", key),
        ));
    }

    let record = store.get(&format!("{}{}", key, DIGEST_SUFFIX)).await?;
    if record != expected.as_bytes() {
        return Err(MoverError::integrity(
            unit,
            format!("stored digest record does not match for {}", key),
        ));
    }
    Ok(())
}

/// Storage key for one exported object of a database. `at` is fixed once
/// per operation run so every unit, and every retry of a unit, lands under
/// the same key.
pub(crate) fn object_key(database: &str, object_name: &str, at: DateTime<Utc>) -> String {
    storage::artifact_key(database, object_name, at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn every_kind_has_a_strategy() {
        for kind in OperationKind::all() {
            assert_eq!(strategy_for(*kind).kind(), *kind);
        }
    }

    #[test]
    fn unknown_operation_token_is_rejected() {
        let err = OperationKind::from_str("drop_everything").unwrap_err();
        assert!(matches!(err, MoverError::UnsupportedOperation(_)));
    }
}
