//! In-memory [`DatabaseClient`] used by integration tests.
//!
//! Holds tables in a sorted map, records every DDL statement it is asked to
//! run, and can be primed to fail a number of reads on a given table to
//! exercise retry behavior.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::EndpointConfig;
use crate::db::{Connector, DatabaseClient, SqlValue, TableData, TableRef};
use crate::error::{MoverError, Result};

#[derive(Default)]
struct Inner {
    tables: BTreeMap<String, TableData>,
    databases: HashSet<String>,
    read_failures: HashMap<String, usize>,
    ddl_failures: usize,
    executed_ddl: Vec<String>,
}

pub struct MemoryDb {
    database: String,
    inner: Mutex<Inner>,
}

impl MemoryDb {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Seed a table with data.
    pub fn insert_table(&self, data: TableData) {
        self.lock().tables.insert(data.table.full_name(), data);
    }

    /// Register a database name on this "server".
    pub fn add_database(&self, name: impl Into<String>) {
        self.lock().databases.insert(name.into());
    }

    /// Make the next `count` reads of `table` fail with a retryable
    /// connection error.
    pub fn fail_reads(&self, table: &TableRef, count: usize) {
        self.lock().read_failures.insert(table.full_name(), count);
    }

    /// Make the next `count` DDL statements fail with a retryable
    /// connection error.
    pub fn fail_ddl(&self, count: usize) {
        self.lock().ddl_failures = count;
    }

    /// Every DDL string passed to [`DatabaseClient::execute_ddl`], in order.
    pub fn executed_ddl(&self) -> Vec<String> {
        self.lock().executed_ddl.clone()
    }

    pub fn table_rows(&self, table: &TableRef) -> Option<Vec<Vec<SqlValue>>> {
        self.lock()
            .tables
            .get(&table.full_name())
            .map(|t| t.rows.clone())
    }
}

#[async_trait]
impl DatabaseClient for MemoryDb {
    fn database(&self) -> &str {
        &self.database
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableRef>> {
        Ok(self
            .lock()
            .tables
            .values()
            .map(|t| t.table.clone())
            .collect())
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        Ok(self.lock().tables.contains_key(&table.full_name()))
    }

    async fn database_exists(&self, name: &str) -> Result<bool> {
        Ok(self.lock().databases.contains(name))
    }

    async fn table_structure(&self, table: &TableRef) -> Result<String> {
        let inner = self.lock();
        let data = inner
            .tables
            .get(&table.full_name())
            .ok_or_else(|| MoverError::Config(format!("unknown table {}", table)))?;
        let cols: Vec<String> = data
            .columns
            .iter()
            .zip(&data.col_types)
            .map(|(c, t)| format!("    \"{}\" {}", c, t))
            .collect();
        Ok(format!(
            "CREATE TABLE \"{}\".\"{}\" (\n{}\n);",
            table.schema,
            table.name,
            cols.join(",\n")
        ))
    }

    async fn read_table(&self, table: &TableRef) -> Result<TableData> {
        let mut inner = self.lock();
        let key = table.full_name();
        if let Some(remaining) = inner.read_failures.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MoverError::connection(
                    "connection reset",
                    format!("reading table {}", table),
                ));
            }
        }
        inner
            .tables
            .get(&key)
            .cloned()
            .ok_or_else(|| MoverError::Config(format!("unknown table {}", table)))
    }

    async fn write_table(&self, data: &TableData) -> Result<u64> {
        let mut inner = self.lock();
        let entry = inner
            .tables
            .entry(data.table.full_name())
            .or_insert_with(|| TableData {
                table: data.table.clone(),
                columns: data.columns.clone(),
                col_types: data.col_types.clone(),
                rows: Vec::new(),
            });
        entry.rows.extend(data.rows.iter().cloned());
        Ok(data.rows.len() as u64)
    }

    async fn execute_ddl(&self, ddl: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.ddl_failures > 0 {
            inner.ddl_failures -= 1;
            return Err(MoverError::connection(
                "connection reset",
                format!("executing DDL on {}", self.database),
            ));
        }
        // Mirror CREATE DATABASE so database_exists reflects provisioning.
        let trimmed = ddl.trim();
        if let Some(rest) = trimmed
            .strip_prefix("CREATE DATABASE ")
            .or_else(|| trimmed.strip_prefix("create database "))
        {
            let name = rest
                .split_whitespace()
                .next()
                .unwrap_or("")
                .trim_matches(|c| c == '"' || c == ';');
            if !name.is_empty() {
                inner.databases.insert(name.to_string());
            }
        }
        inner.executed_ddl.push(ddl.to_string());
        Ok(())
    }

    async fn row_count(&self, table: &TableRef) -> Result<u64> {
        Ok(self
            .lock()
            .tables
            .get(&table.full_name())
            .map(|t| t.rows.len() as u64)
            .unwrap_or(0))
    }
}

/// [`Connector`] over a fixed set of in-memory databases, keyed by name.
/// Unknown names get a fresh empty database, which matches how a freshly
/// provisioned PostgreSQL database looks.
#[derive(Default)]
pub struct MemoryConnector {
    databases: Mutex<HashMap<String, Arc<MemoryDb>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, db: Arc<MemoryDb>) {
        let name = db.database().to_string();
        match self.databases.lock() {
            Ok(mut dbs) => dbs.insert(name, db),
            Err(poisoned) => poisoned.into_inner().insert(name, db),
        };
    }

    pub fn get(&self, name: &str) -> Option<Arc<MemoryDb>> {
        match self.databases.lock() {
            Ok(dbs) => dbs.get(name).cloned(),
            Err(poisoned) => poisoned.into_inner().get(name).cloned(),
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &EndpointConfig) -> Result<Arc<dyn DatabaseClient>> {
        let mut dbs = match self.databases.lock() {
            Ok(dbs) => dbs,
            Err(poisoned) => poisoned.into_inner(),
        };
        let db = dbs
            .entry(endpoint.database.clone())
            .or_insert_with(|| Arc::new(MemoryDb::new(endpoint.database.clone())))
            .clone();
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqlValue;

    fn users_table() -> TableData {
        TableData {
            table: TableRef::new("public", "users"),
            columns: vec!["id".into(), "name".into()],
            col_types: vec!["int8".into(), "text".into()],
            rows: vec![vec![SqlValue::I64(1), SqlValue::String("ada".into())]],
        }
    }

    #[tokio::test]
    async fn read_failures_are_consumed() {
        let db = MemoryDb::new("app");
        let table = TableRef::new("public", "users");
        db.insert_table(users_table());
        db.fail_reads(&table, 2);

        assert!(db.read_table(&table).await.is_err());
        assert!(db.read_table(&table).await.is_err());
        assert!(db.read_table(&table).await.is_ok());
    }

    #[tokio::test]
    async fn create_database_ddl_registers_database() {
        let db = MemoryDb::new("postgres");
        assert!(!db.database_exists("runner_7").await.unwrap());
        db.execute_ddl("CREATE DATABASE \"runner_7\" TEMPLATE template0")
            .await
            .unwrap();
        assert!(db.database_exists("runner_7").await.unwrap());
    }

    #[tokio::test]
    async fn list_tables_is_sorted_by_full_name() {
        let db = MemoryDb::new("app");
        for name in ["zeta", "alpha"] {
            db.insert_table(TableData {
                table: TableRef::new("public", name),
                columns: vec![],
                col_types: vec![],
                rows: vec![],
            });
        }
        let names: Vec<String> = db
            .list_tables()
            .await
            .unwrap()
            .iter()
            .map(|t| t.full_name())
            .collect();
        assert_eq!(names, vec!["public.alpha", "public.zeta"]);
    }
}
