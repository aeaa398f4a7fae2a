//! `structure_backup`: schema-only export, encrypted and stored like any
//! other backup artifact.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::config::OperationKind;
use crate::crypto::CryptoHelper;
use crate::db::DatabaseClient;
use crate::engine::{ShippingAndReceiving, UnitTask};
use crate::error::Result;
use crate::ops::{object_key, upload_and_verify, OperationContext, TransferStrategy};
use crate::report::OperationReport;

pub struct StructureBackup;

#[async_trait]
impl TransferStrategy for StructureBackup {
    fn kind(&self) -> OperationKind {
        OperationKind::StructureBackup
    }

    async fn run(
        &self,
        ctx: &OperationContext,
        engine: &ShippingAndReceiving,
    ) -> Result<OperationReport> {
        let source: Arc<dyn DatabaseClient> = ctx.connector.connect(&ctx.request.source).await?;
        let store = ctx.storage()?;
        let crypto = Arc::new(CryptoHelper::new(&ctx.request.secret, source.database()));
        let database = source.database().to_string();
        let exported_at = Utc::now();

        info!("Exporting structure of {}", database);

        let unit_name = format!("structure:{}", database);
        let unit = UnitTask::new(unit_name.clone(), move || {
            let source = Arc::clone(&source);
            let store = Arc::clone(&store);
            let crypto = Arc::clone(&crypto);
            let database = database.clone();
            let unit_name = unit_name.clone();
            Box::pin(async move {
                let ddl = source.dump_structure().await?;
                let sealed = crypto.encrypt(ddl.as_bytes())?;
                let key = object_key(&database, "structure", exported_at);
                upload_and_verify(&store, &unit_name, &key, sealed).await?;
                Ok(0)
            })
        });

        Ok(engine.run(self.kind(), vec![unit]).await)
    }
}
