//! PostgreSQL implementation of [`DatabaseClient`].

use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use rustls::ClientConfig;
use tokio_postgres::types::ToSql;
use tokio_postgres::Config as PgConfig;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, info, warn};

use crate::config::EndpointConfig;
use crate::db::value::{build_insert_sql, SqlNullType, SqlValue};
use crate::db::{Connector, DatabaseClient, TableData, TableRef};
use crate::error::{MoverError, Result};

/// PostgreSQL bind parameters are capped at u16::MAX; stay well under it
/// when batching multi-row INSERTs.
const MAX_PARAMS_PER_STATEMENT: usize = 60_000;

/// Pooled PostgreSQL client for one endpoint.
pub struct PgClient {
    pool: Pool,
    database: String,
}

impl PgClient {
    /// Create a pooled client and verify the connection.
    pub async fn connect(config: &EndpointConfig, max_conns: usize) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let pool = match config.ssl_mode.to_lowercase().as_str() {
            "disable" => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(max_conns)
                    .build()
                    .map_err(|e| MoverError::connection(e.to_string(), "creating PostgreSQL pool"))?
            }
            other => {
                let tls_config = Self::build_tls_config(other)?;
                let tls_connector = MakeRustlsConnect::new(tls_config);
                let mgr = Manager::from_config(pg_config, tls_connector, mgr_config);
                Pool::builder(mgr)
                    .max_size(max_conns)
                    .build()
                    .map_err(|e| MoverError::connection(e.to_string(), "creating PostgreSQL pool"))?
            }
        };

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| MoverError::connection(e.to_string(), "testing PostgreSQL connection"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            database: config.database.clone(),
        })
    }

    /// Build TLS configuration based on ssl_mode.
    fn build_tls_config(ssl_mode: &str) -> Result<ClientConfig> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = match ssl_mode {
            "require" => {
                warn!(
                    "ssl_mode=require: TLS enabled but server certificate is not verified. \
                     Consider using 'verify-full' for production."
                );
                ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(NoVerifier))
                    .with_no_client_auth()
            }
            "verify-ca" | "verify-full" => {
                info!("ssl_mode={}: certificate verification enabled", ssl_mode);
                ClientConfig::builder()
                    .with_root_certificates(root_store)
                    .with_no_client_auth()
            }
            other => {
                return Err(MoverError::Config(format!(
                    "Invalid ssl_mode '{}'. Valid options: disable, require, verify-ca, verify-full",
                    other
                )));
            }
        };

        Ok(config)
    }

    async fn get(&self) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MoverError::connection(e.to_string(), "getting connection from pool"))
    }

    /// Column names and udt type names in ordinal order.
    async fn column_types(&self, table: &TableRef) -> Result<Vec<(String, String)>> {
        let client = self.get().await?;
        let rows = client
            .query(
                "SELECT column_name, udt_name \
                 FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 \
                 ORDER BY ordinal_position",
                &[&table.schema, &table.name],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<_, String>(0), r.get::<_, String>(1)))
            .collect())
    }
}

/// SELECT expression for a column: types without a native decode path are
/// cast to text on the server so every row decodes cleanly.
fn select_expr(col: &str, udt: &str) -> String {
    if has_native_decode(udt) {
        format!("\"{}\"", col)
    } else {
        format!("\"{}\"::text", col)
    }
}

fn has_native_decode(udt: &str) -> bool {
    matches!(
        udt,
        "bool"
            | "int2"
            | "int4"
            | "int8"
            | "float4"
            | "float8"
            | "text"
            | "varchar"
            | "bpchar"
            | "name"
            | "bytea"
            | "uuid"
            | "timestamp"
            | "date"
    )
}

fn value_from_row(row: &tokio_postgres::Row, idx: usize, udt: &str) -> Result<SqlValue> {
    let value = match udt {
        "bool" => row
            .try_get::<_, Option<bool>>(idx)?
            .map_or(SqlValue::Null(SqlNullType::Bool), SqlValue::Bool),
        "int2" => row
            .try_get::<_, Option<i16>>(idx)?
            .map_or(SqlValue::Null(SqlNullType::I16), SqlValue::I16),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)?
            .map_or(SqlValue::Null(SqlNullType::I32), SqlValue::I32),
        "int8" => row
            .try_get::<_, Option<i64>>(idx)?
            .map_or(SqlValue::Null(SqlNullType::I64), SqlValue::I64),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .map_or(SqlValue::Null(SqlNullType::F32), SqlValue::F32),
        "float8" => row
            .try_get::<_, Option<f64>>(idx)?
            .map_or(SqlValue::Null(SqlNullType::F64), SqlValue::F64),
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(idx)?
            .map_or(SqlValue::Null(SqlNullType::Bytes), SqlValue::Bytes),
        "uuid" => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map_or(SqlValue::Null(SqlNullType::Uuid), SqlValue::Uuid),
        "timestamp" => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map_or(SqlValue::Null(SqlNullType::DateTime), SqlValue::DateTime),
        "date" => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)?
            .map_or(SqlValue::Null(SqlNullType::Date), SqlValue::Date),
        // Everything else arrives as text thanks to the server-side cast.
        _ => row
            .try_get::<_, Option<String>>(idx)?
            .map_or(SqlValue::Null(SqlNullType::String), SqlValue::String),
    };
    Ok(value)
}

#[async_trait]
impl DatabaseClient for PgClient {
    fn database(&self) -> &str {
        &self.database
    }

    async fn ping(&self) -> Result<()> {
        let client = self.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableRef>> {
        let client = self.get().await?;
        let rows = client
            .query(
                "SELECT table_schema, table_name \
                 FROM information_schema.tables \
                 WHERE table_type = 'BASE TABLE' \
                   AND table_schema NOT IN ('pg_catalog', 'information_schema') \
                 ORDER BY table_schema, table_name",
                &[],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|r| TableRef::new(r.get::<_, String>(0), r.get::<_, String>(1)))
            .collect())
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        let client = self.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS (\
                     SELECT 1 FROM information_schema.tables \
                     WHERE table_schema = $1 AND table_name = $2\
                 )",
                &[&table.schema, &table.name],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn database_exists(&self, name: &str) -> Result<bool> {
        let client = self.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)",
                &[&name],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn table_structure(&self, table: &TableRef) -> Result<String> {
        let client = self.get().await?;
        let cols = client
            .query(
                "SELECT column_name, \
                        udt_name, \
                        COALESCE(character_maximum_length, 0)::int4, \
                        CASE WHEN is_nullable = 'YES' THEN true ELSE false END, \
                        column_default \
                 FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 \
                 ORDER BY ordinal_position",
                &[&table.schema, &table.name],
            )
            .await?;

        if cols.is_empty() {
            return Err(MoverError::Config(format!(
                "table {} has no columns or does not exist",
                table
            )));
        }

        let mut defs: Vec<String> = Vec::with_capacity(cols.len());
        for col in &cols {
            let name: String = col.get(0);
            let udt: String = col.get(1);
            let max_len: i32 = col.get(2);
            let nullable: bool = col.get(3);
            let default: Option<String> = col.get(4);

            let mut def = format!("    \"{}\" {}", name, udt);
            if max_len > 0 {
                def.push_str(&format!("({})", max_len));
            }
            if !nullable {
                def.push_str(" NOT NULL");
            }
            if let Some(d) = default {
                def.push_str(&format!(" DEFAULT {}", d));
            }
            defs.push(def);
        }

        // Primary key, if any.
        let pk = client
            .query(
                "SELECT a.attname \
                 FROM pg_index i \
                 JOIN pg_class c ON c.oid = i.indrelid \
                 JOIN pg_namespace n ON n.oid = c.relnamespace \
                 JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(i.indkey) \
                 WHERE i.indisprimary AND n.nspname = $1 AND c.relname = $2 \
                 ORDER BY array_position(i.indkey, a.attnum)",
                &[&table.schema, &table.name],
            )
            .await?;
        if !pk.is_empty() {
            let pk_cols: Vec<String> = pk
                .iter()
                .map(|r| format!("\"{}\"", r.get::<_, String>(0)))
                .collect();
            defs.push(format!("    PRIMARY KEY ({})", pk_cols.join(", ")));
        }

        Ok(format!(
            "CREATE TABLE \"{}\".\"{}\" (\n{}\n);",
            table.schema,
            table.name,
            defs.join(",\n")
        ))
    }

    async fn read_table(&self, table: &TableRef) -> Result<TableData> {
        let col_types = self.column_types(table).await?;
        if col_types.is_empty() {
            return Err(MoverError::Config(format!(
                "table {} has no columns or does not exist",
                table
            )));
        }

        let select_list: Vec<String> = col_types
            .iter()
            .map(|(col, udt)| select_expr(col, udt))
            .collect();
        let sql = format!(
            "SELECT {} FROM \"{}\".\"{}\"",
            select_list.join(", "),
            table.schema,
            table.name
        );

        let client = self.get().await?;
        let pg_rows = client.query(sql.as_str(), &[]).await?;

        let mut rows = Vec::with_capacity(pg_rows.len());
        for pg_row in &pg_rows {
            let mut row = Vec::with_capacity(col_types.len());
            for (idx, (_, udt)) in col_types.iter().enumerate() {
                row.push(value_from_row(pg_row, idx, udt)?);
            }
            rows.push(row);
        }

        debug!("Read {} rows from {}", rows.len(), table);

        Ok(TableData {
            table: table.clone(),
            columns: col_types.iter().map(|(c, _)| c.clone()).collect(),
            col_types: col_types.into_iter().map(|(_, t)| t).collect(),
            rows,
        })
    }

    async fn write_table(&self, data: &TableData) -> Result<u64> {
        if data.rows.is_empty() {
            return Ok(0);
        }

        let ncols = data.columns.len().max(1);
        let rows_per_stmt = (MAX_PARAMS_PER_STATEMENT / ncols).max(1);

        let mut client = self.get().await?;
        let tx = client.transaction().await?;

        let mut written = 0u64;
        for chunk in data.rows.chunks(rows_per_stmt) {
            let (sql, params) = build_insert_sql(
                &data.table.schema,
                &data.table.name,
                &data.columns,
                chunk,
            );
            let param_refs: Vec<&(dyn ToSql + Sync)> = params
                .iter()
                .map(|p| p.as_ref() as &(dyn ToSql + Sync))
                .collect();
            written += tx.execute(sql.as_str(), &param_refs).await.map_err(|e| {
                MoverError::transfer(data.table.full_name(), format!("batched INSERT: {}", e))
            })?;
        }

        tx.commit().await?;
        debug!("Wrote {} rows to {}", written, data.table);
        Ok(written)
    }

    async fn execute_ddl(&self, ddl: &str) -> Result<()> {
        let client = self.get().await?;
        client.batch_execute(ddl).await?;
        Ok(())
    }

    async fn row_count(&self, table: &TableRef) -> Result<u64> {
        let client = self.get().await?;
        let sql = format!(
            "SELECT COUNT(*) FROM \"{}\".\"{}\"",
            table.schema, table.name
        );
        let row = client.query_one(sql.as_str(), &[]).await?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }
}

/// [`Connector`] producing pooled PostgreSQL clients.
pub struct PgConnector {
    max_conns: usize,
}

impl PgConnector {
    pub fn new(max_conns: usize) -> Self {
        Self { max_conns }
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self, endpoint: &EndpointConfig) -> Result<Arc<dyn DatabaseClient>> {
        let client = PgClient::connect(endpoint, self.max_conns).await?;
        Ok(Arc::new(client))
    }
}

/// Certificate verifier that accepts any server certificate.
///
/// Used only for `ssl_mode=require`, which encrypts the connection without
/// authenticating the server. Use `verify-full` on untrusted networks.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_types_are_cast_to_text() {
        assert_eq!(select_expr("total", "numeric"), "\"total\"::text");
        assert_eq!(select_expr("payload", "jsonb"), "\"payload\"::text");
        assert_eq!(select_expr("id", "int8"), "\"id\"");
    }

    #[test]
    fn invalid_ssl_mode_is_a_config_error() {
        let err = PgClient::build_tls_config("prefer").unwrap_err();
        assert!(matches!(err, MoverError::Config(_)));
    }
}
