//! `create_database`: provision a new, empty database on the destination
//! server. Never overwrites an existing database.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::OperationKind;
use crate::engine::{ShippingAndReceiving, UnitTask};
use crate::error::{MoverError, Result};
use crate::ops::{OperationContext, TransferStrategy};
use crate::report::OperationReport;

/// Maintenance database used for server-level statements.
const MAINTENANCE_DB: &str = "postgres";

/// Baseline applied to every freshly provisioned database.
const BASELINE_DDL: &str = "\
CREATE EXTENSION IF NOT EXISTS \"uuid-ossp\";\n\
CREATE EXTENSION IF NOT EXISTS pg_trgm;";

pub struct CreateDatabase;

#[async_trait]
impl TransferStrategy for CreateDatabase {
    fn kind(&self) -> OperationKind {
        OperationKind::CreateDatabase
    }

    async fn run(
        &self,
        ctx: &OperationContext,
        engine: &ShippingAndReceiving,
    ) -> Result<OperationReport> {
        let dest = ctx.request.dest()?.clone();
        let connector = Arc::clone(&ctx.connector);
        let owner = dest.user.clone();

        // CREATE DATABASE is not idempotent and the exists-guard would
        // reject a database this very run just created, so the provisioning
        // phase runs at most once; only the IF NOT EXISTS baseline is
        // retried.
        let provisioned = Arc::new(AtomicBool::new(false));
        let unit = UnitTask::new(format!("create:{}", dest.database), move || {
            let connector = Arc::clone(&connector);
            let provisioned = Arc::clone(&provisioned);
            let dest = dest.clone();
            let owner = owner.clone();
            Box::pin(async move {
                if !provisioned.load(Ordering::Acquire) {
                    let maintenance = connector
                        .connect(&dest.with_database(MAINTENANCE_DB))
                        .await?;
                    if maintenance.database_exists(&dest.database).await? {
                        return Err(MoverError::Provisioning(format!(
                            "database {} already exists on {}",
                            dest.database, dest.host
                        )));
                    }

                    maintenance
                        .execute_ddl(&format!(
                            "CREATE DATABASE \"{}\" OWNER \"{}\"",
                            dest.database, owner
                        ))
                        .await?;
                    provisioned.store(true, Ordering::Release);
                    info!("Created database {} on {}", dest.database, dest.host);
                }

                let created = connector.connect(&dest).await?;
                created.execute_ddl(BASELINE_DDL).await?;
                Ok(0)
            })
        });

        Ok(engine.run(self.kind(), vec![unit]).await)
    }
}
