//! Operation request types and validation.
//!
//! The CLI (or an embedding program) resolves its arguments into a single
//! [`OperationRequest`] up front. Everything downstream -- the factory, the
//! strategies, the transfer engine -- consumes that immutable request; no
//! component reads the environment or re-parses arguments on its own.

use crate::error::{MoverError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable holding the encryption secret.
pub const SECRET_ENV_VAR: &str = "DATA_MOVER_SECRET";

/// The closed set of supported operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Provision a new, empty database from the baseline template.
    CreateDatabase,
    /// Clone structure (and optionally data) from a template into a runner.
    BuildRunnerServer,
    /// Copy staging tables into a processing database.
    StagingToProcess,
    /// Export, encrypt, and upload a runner's tables to object storage.
    BackupRunner,
    /// Schema-only DDL export to object storage or local temp space.
    StructureBackup,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CreateDatabase => "create_database",
            OperationKind::BuildRunnerServer => "build_runner_server",
            OperationKind::StagingToProcess => "staging_to_process",
            OperationKind::BackupRunner => "backup_runner",
            OperationKind::StructureBackup => "structure_backup",
        }
    }

    /// All registered kinds, in registration order.
    pub fn all() -> &'static [OperationKind] {
        &[
            OperationKind::CreateDatabase,
            OperationKind::BuildRunnerServer,
            OperationKind::StagingToProcess,
            OperationKind::BackupRunner,
            OperationKind::StructureBackup,
        ]
    }
}

impl FromStr for OperationKind {
    type Err = MoverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create_database" => Ok(OperationKind::CreateDatabase),
            "build_runner_server" => Ok(OperationKind::BuildRunnerServer),
            "staging_to_process" => Ok(OperationKind::StagingToProcess),
            "backup_runner" => Ok(OperationKind::BackupRunner),
            "structure_backup" => Ok(OperationKind::StructureBackup),
            other => Err(MoverError::UnsupportedOperation(other.to_string())),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where temp dump space lives during backup-style operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempLocation {
    /// Stage per-table artifacts straight to object storage.
    #[default]
    Network,
    /// Stage one whole-database dump through local temp space.
    Local,
}

impl FromStr for TempLocation {
    type Err = MoverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "network" => Ok(TempLocation::Network),
            "local" => Ok(TempLocation::Local),
            other => Err(MoverError::Config(format!(
                "Invalid temp_location '{}'. Valid options: network, local",
                other
            ))),
        }
    }
}

/// A database endpoint (host, database, credentials).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode (default: "disable"). Valid: disable, verify-full.
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
}

impl EndpointConfig {
    /// Same endpoint, different database. Used for maintenance-database
    /// connections when provisioning.
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..self.clone()
        }
    }
}

/// Retry policy for transient (connection-level) failures.
///
/// The original system left retry bounds undocumented, so they are
/// configuration rather than constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per unit, including the first (default: 3).
    pub max_attempts: usize,

    /// Base delay between attempts in milliseconds (default: 500).
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

/// A fully resolved operation request: one per CLI invocation, immutable
/// after construction.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    /// Which operation to run.
    pub kind: OperationKind,

    /// Source endpoint (the "control" host/db in CLI terms).
    pub source: EndpointConfig,

    /// Destination endpoint, for kinds that have one.
    pub dest: Option<EndpointConfig>,

    /// Temp dump space policy for backup-style kinds.
    pub temp_location: TempLocation,

    /// Create structure only, skip bulk data copy (`nct`).
    pub structure_only: bool,

    /// Template database for `build_runner_server`.
    pub template_db: String,

    /// Explicit `schema.table` names; None means all tables.
    pub tables: Option<Vec<String>>,

    /// Object storage bucket for backup-style kinds.
    pub bucket: Option<String>,

    /// Parallel transfer workers.
    pub workers: usize,

    /// Retry policy for transient failures.
    pub retry: RetryConfig,

    /// Encryption secret, resolved from the environment at startup.
    pub secret: String,
}

impl OperationRequest {
    /// Validate field presence against the operation kind.
    ///
    /// `create_database` and `structure_backup` work from one endpoint;
    /// everything else moves between two.
    pub fn validate(&self) -> Result<()> {
        if self.secret.is_empty() {
            return Err(MoverError::Config(format!(
                "Encryption secret is empty (set {})",
                SECRET_ENV_VAR
            )));
        }
        if self.workers == 0 {
            return Err(MoverError::Config("workers must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(MoverError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        match self.kind {
            OperationKind::CreateDatabase
            | OperationKind::BuildRunnerServer
            | OperationKind::StagingToProcess => {
                if self.dest.is_none() {
                    return Err(MoverError::Config(format!(
                        "Missing destination host/db for {} (use --dest_host/--dest_db)",
                        self.kind
                    )));
                }
            }
            OperationKind::BackupRunner | OperationKind::StructureBackup => {
                if self.bucket.is_none() && self.temp_location == TempLocation::Network {
                    return Err(MoverError::Config(format!(
                        "Missing --bucket for {} with temp_location=network",
                        self.kind
                    )));
                }
            }
        }

        Ok(())
    }

    /// Destination endpoint or a Config error naming the kind.
    pub fn dest(&self) -> Result<&EndpointConfig> {
        self.dest.as_ref().ok_or_else(|| {
            MoverError::Config(format!("Operation {} requires a destination", self.kind))
        })
    }
}

/// Read the encryption secret from the environment. Its absence is a fatal
/// configuration error at startup.
pub fn secret_from_env() -> Result<String> {
    match std::env::var(SECRET_ENV_VAR) {
        Ok(s) if !s.is_empty() => Ok(s),
        _ => Err(MoverError::Config(format!(
            "Environment variable {} must be set to the encryption secret",
            SECRET_ENV_VAR
        ))),
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(db: &str) -> EndpointConfig {
        EndpointConfig {
            host: "db-dev1".into(),
            port: 5432,
            database: db.into(),
            user: "dbmover".into(),
            password: "pw".into(),
            ssl_mode: "disable".into(),
        }
    }

    fn request(kind: OperationKind) -> OperationRequest {
        OperationRequest {
            kind,
            source: endpoint("control"),
            dest: Some(endpoint("runner_1")),
            temp_location: TempLocation::Network,
            structure_only: false,
            template_db: "v1_standard".into(),
            tables: None,
            bucket: Some("backups".into()),
            workers: 2,
            retry: RetryConfig::default(),
            secret: "s3cret".into(),
        }
    }

    #[test]
    fn test_kind_parsing_round_trips() {
        for kind in OperationKind::all() {
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_unknown_kind_is_unsupported() {
        let err = "runner_to_mars".parse::<OperationKind>().unwrap_err();
        assert!(matches!(err, MoverError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_temp_location_parsing() {
        assert_eq!(
            "network".parse::<TempLocation>().unwrap(),
            TempLocation::Network
        );
        assert_eq!("local".parse::<TempLocation>().unwrap(), TempLocation::Local);
        assert!("cloud".parse::<TempLocation>().is_err());
    }

    #[test]
    fn test_two_endpoint_kinds_require_dest() {
        let mut req = request(OperationKind::StagingToProcess);
        req.dest = None;
        assert!(matches!(req.validate(), Err(MoverError::Config(_))));

        let mut req = request(OperationKind::CreateDatabase);
        req.dest = None;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_backup_requires_bucket_for_network_staging() {
        let mut req = request(OperationKind::BackupRunner);
        req.dest = None;
        req.bucket = None;
        assert!(req.validate().is_err());

        req.temp_location = TempLocation::Local;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_empty_secret_rejected() {
        let mut req = request(OperationKind::StagingToProcess);
        req.secret = String::new();
        assert!(matches!(req.validate(), Err(MoverError::Config(_))));
    }
}
