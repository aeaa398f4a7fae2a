//! Database access layer.
//!
//! All operations talk to PostgreSQL through the [`DatabaseClient`] trait so
//! the transfer engine and operation strategies never depend on a concrete
//! driver. [`PgClient`] is the production implementation; [`MemoryDb`] backs
//! the integration tests.

pub mod memory;
pub mod postgres;
pub mod value;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EndpointConfig;
use crate::error::Result;
pub use memory::{MemoryConnector, MemoryDb};
pub use postgres::{PgClient, PgConnector};
pub use value::{SqlNullType, SqlValue};

/// A schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parse `schema.table`, defaulting the schema to `public`.
    pub fn parse(spec: &str) -> Self {
        match spec.split_once('.') {
            Some((schema, name)) => Self::new(schema, name),
            None => Self::new("public", spec),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

/// A fully materialized table: column names, type names, and rows.
///
/// Serializable because backup payloads are the JSON encoding of this
/// structure prior to encryption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub table: TableRef,
    pub columns: Vec<String>,
    pub col_types: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl TableData {
    pub fn row_count(&self) -> u64 {
        self.rows.len() as u64
    }
}

/// Opens [`DatabaseClient`]s on demand. Provisioning operations connect to
/// the maintenance database first and to the freshly created database after.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &EndpointConfig) -> Result<Arc<dyn DatabaseClient>>;
}

/// Abstraction over a single PostgreSQL endpoint.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Name of the database this client is connected to.
    fn database(&self) -> &str;

    /// Cheap liveness check.
    async fn ping(&self) -> Result<()>;

    /// All user tables, lexicographically ordered by schema-qualified name.
    async fn list_tables(&self) -> Result<Vec<TableRef>>;

    async fn table_exists(&self, table: &TableRef) -> Result<bool>;

    /// Whether a database with the given name exists on this server.
    async fn database_exists(&self, name: &str) -> Result<bool>;

    /// CREATE TABLE DDL for a single table.
    async fn table_structure(&self, table: &TableRef) -> Result<String>;

    /// Read an entire table into memory.
    async fn read_table(&self, table: &TableRef) -> Result<TableData>;

    /// Write rows into an existing table inside one transaction.
    /// Returns the number of rows written.
    async fn write_table(&self, data: &TableData) -> Result<u64>;

    /// Run one or more DDL statements.
    async fn execute_ddl(&self, ddl: &str) -> Result<()>;

    async fn row_count(&self, table: &TableRef) -> Result<u64>;

    /// DDL for every user table in the database, in list_tables order.
    async fn dump_structure(&self) -> Result<String> {
        let mut out = String::new();
        for table in self.list_tables().await? {
            out.push_str(&self.table_structure(&table).await?);
            out.push_str("\n\n");
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ref_parse_defaults_to_public() {
        assert_eq!(TableRef::parse("users"), TableRef::new("public", "users"));
        assert_eq!(
            TableRef::parse("staging.orders"),
            TableRef::new("staging", "orders")
        );
    }

    #[test]
    fn table_ref_display_is_schema_qualified() {
        assert_eq!(TableRef::new("public", "users").to_string(), "public.users");
    }
}
