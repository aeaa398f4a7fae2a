//! # datamover
//!
//! Moves tabular data and database structure between PostgreSQL and
//! encrypted S3-compatible object storage, and orchestrates the derivative
//! operations around it:
//!
//! - **create_database** — provision a fresh database, never overwriting
//! - **build_runner_server** — clone a runner from a template database
//! - **staging_to_process** — copy staging tables with row-count checks
//! - **backup_runner** — export, encrypt (AES-256-GCM), upload, verify
//! - **structure_backup** — schema-only encrypted export
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use datamover::config::{EndpointConfig, OperationKind, OperationRequest};
//! use datamover::db::PgConnector;
//! use datamover::ops::OperationContext;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> datamover::Result<()> {
//!     let request = OperationRequest {
//!         kind: OperationKind::StructureBackup,
//!         ..todo!("resolve from CLI arguments")
//!     };
//!     let ctx = OperationContext {
//!         request,
//!         connector: Arc::new(PgConnector::new(4)),
//!         storage: Some(Arc::new(datamover::storage::ObjectStorage::s3("backups")?)),
//!     };
//!     let report = datamover::ops::dispatch(&ctx, CancellationToken::new()).await?;
//!     println!("{}", report.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crypto;
pub mod db;
pub mod engine;
pub mod error;
pub mod ops;
pub mod report;
pub mod storage;

// Re-exports for convenient access
pub use config::{EndpointConfig, OperationKind, OperationRequest, RetryConfig, TempLocation};
pub use crypto::CryptoHelper;
pub use db::{DatabaseClient, PgClient, SqlValue, TableData, TableRef};
pub use engine::{ShippingAndReceiving, UnitTask};
pub use error::{MoverError, Result};
pub use ops::{dispatch, OperationContext, TransferStrategy};
pub use report::{OperationReport, UnitOutcome, UnitStatus};
pub use storage::{ObjectStorage, StorageClient};
