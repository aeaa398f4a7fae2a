//! datamover CLI - encrypted data movement between PostgreSQL and object storage.

use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

use datamover::config::{
    secret_from_env, EndpointConfig, OperationKind, OperationRequest, RetryConfig, TempLocation,
};
use datamover::db::PgConnector;
use datamover::ops::OperationContext;
use datamover::storage::ObjectStorage;
use datamover::{MoverError, StorageClient};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "datamover")]
#[command(about = "Encrypted data movement between PostgreSQL and object storage")]
#[command(version)]
struct Cli {
    /// Operation to run: create_database, build_runner_server,
    /// staging_to_process, backup_runner, structure_backup
    #[arg(long = "type")]
    operation: String,

    /// Control (source) database host
    #[arg(long = "control_host")]
    control_host: String,

    /// Control (source) database name
    #[arg(long = "control_db")]
    control_db: String,

    /// Destination database host (defaults to the control host)
    #[arg(long = "dest_host", visible_alias = "h2")]
    dest_host: Option<String>,

    /// Destination database name
    #[arg(long = "dest_db", visible_alias = "d2")]
    dest_db: Option<String>,

    /// Database user
    #[arg(long, default_value = "postgres")]
    user: String,

    /// Database password
    #[arg(long, default_value = "")]
    password: String,

    /// Database port
    #[arg(long, default_value = "5432")]
    port: u16,

    /// SSL mode: disable, require, verify-ca, verify-full
    #[arg(long = "ssl_mode", default_value = "disable")]
    ssl_mode: String,

    /// Temp dump space for backup operations: network or local
    #[arg(long = "temp_location", default_value = "network")]
    temp_location: String,

    /// Structure only: skip bulk data copy
    #[arg(long)]
    nct: bool,

    /// Restrict to explicit schema.table names (repeatable)
    #[arg(long = "table")]
    tables: Vec<String>,

    /// Template database for build_runner_server
    #[arg(long, default_value = "v1_standard")]
    template: String,

    /// Parallel transfer workers
    #[arg(long, default_value = "4")]
    workers: usize,

    /// Object storage bucket for backup operations
    #[arg(long)]
    bucket: Option<String>,

    /// Attempts per unit for transient failures, including the first
    #[arg(long = "retry_attempts", default_value = "3")]
    retry_attempts: usize,

    /// Delay between retry attempts in milliseconds
    #[arg(long = "retry_delay_ms", default_value = "500")]
    retry_delay_ms: u64,

    /// Output the JSON report to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,
}

impl Cli {
    fn into_request(self, secret: String) -> Result<OperationRequest, MoverError> {
        let kind = OperationKind::from_str(&self.operation)?;
        let temp_location = TempLocation::from_str(&self.temp_location)?;

        let source = EndpointConfig {
            host: self.control_host.clone(),
            port: self.port,
            database: self.control_db,
            user: self.user,
            password: self.password,
            ssl_mode: self.ssl_mode,
        };
        let dest = self.dest_db.map(|database| EndpointConfig {
            host: self.dest_host.unwrap_or(self.control_host),
            database,
            ..source.clone()
        });

        Ok(OperationRequest {
            kind,
            source,
            dest,
            temp_location,
            structure_only: self.nct,
            template_db: self.template,
            tables: if self.tables.is_empty() {
                None
            } else {
                Some(self.tables)
            },
            bucket: self.bucket,
            workers: self.workers,
            retry: RetryConfig {
                max_attempts: self.retry_attempts,
                base_delay_ms: self.retry_delay_ms,
            },
            secret,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MoverError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(MoverError::Config)?;

    let secret = secret_from_env()?;
    let output_json = cli.output_json;
    let request = cli.into_request(secret)?;
    request.validate()?;

    let storage = build_storage(&request)?;
    let ctx = OperationContext {
        connector: Arc::new(PgConnector::new(request.workers.max(2))),
        storage,
        request,
    };

    let cancel_token = setup_signal_handler();
    info!("Starting operation {}", ctx.request.kind);

    let report = datamover::ops::dispatch(&ctx, cancel_token).await?;

    if output_json {
        println!("{}", report.to_json()?);
    } else {
        let (ok, failed, skipped) = report.counts();
        for unit in &report.units {
            match &unit.message {
                Some(message) => println!(
                    "{:?} {} ({} rows, {} ms): {}",
                    unit.status, unit.name, unit.rows, unit.duration_ms, message
                ),
                None => println!(
                    "{:?} {} ({} rows, {} ms)",
                    unit.status, unit.name, unit.rows, unit.duration_ms
                ),
            }
        }
        println!(
            "{}: {} succeeded, {} failed, {} skipped, {} rows total",
            report.operation,
            ok,
            failed,
            skipped,
            report.total_rows()
        );
    }

    // Skipped units only happen when a shutdown signal arrived mid-run.
    if report
        .units
        .iter()
        .any(|u| u.status == datamover::UnitStatus::Skipped)
    {
        return Err(MoverError::Cancelled);
    }

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Build the storage client for backup-style operations. Other kinds never
/// touch storage.
fn build_storage(request: &OperationRequest) -> Result<Option<Arc<dyn StorageClient>>, MoverError> {
    match request.kind {
        OperationKind::BackupRunner | OperationKind::StructureBackup => {
            let storage: Arc<dyn StorageClient> = match request.temp_location {
                TempLocation::Network => {
                    let bucket = request.bucket.as_deref().ok_or_else(|| {
                        MoverError::Config("Missing --bucket for object storage".into())
                    })?;
                    Arc::new(ObjectStorage::s3(bucket)?)
                }
                TempLocation::Local => {
                    let root = std::env::temp_dir().join("datamover");
                    Arc::new(ObjectStorage::local(&root)?)
                }
            };
            Ok(Some(storage))
        }
        _ => Ok(None),
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// SIGINT/SIGTERM cancel the token; in-flight units finish, pending units
/// are reported skipped.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    let token_int = cancel_token.clone();
    tokio::spawn(async move {
        if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
            sigint.recv().await;
            eprintln!("\nReceived SIGINT. Finishing in-flight units...");
            token_int.cancel();
        }
    });

    let token_term = cancel_token.clone();
    tokio::spawn(async move {
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            sigterm.recv().await;
            eprintln!("\nReceived SIGTERM. Finishing in-flight units...");
            token_term.cancel();
        }
    });

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Finishing in-flight units...");
            token.cancel();
        }
    });

    cancel_token
}
