//! Object storage adapter.
//!
//! The engine only needs three operations -- put, get, exists -- plus a
//! deterministic key scheme. Everything else (multipart thresholds,
//! credentials, transport retries) belongs to the backing `object_store`
//! implementation. Every uploaded artifact gets a sibling `.digest` record
//! holding the hex SHA-256 of the stored bytes, for later verification
//! without downloading the payload.

use crate::crypto;
use crate::error::{MoverError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use tracing::{debug, info};

/// Suffix for the sibling integrity record of an uploaded artifact.
pub const DIGEST_SUFFIX: &str = ".digest";

/// Narrow storage contract consumed by the transfer engine.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Store a payload under `key` and a sibling digest record under
    /// `key.digest`. Returns the hex SHA-256 digest of the stored bytes.
    async fn put(&self, key: &str, payload: Vec<u8>) -> Result<String>;

    /// Fetch a payload by key.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Whether an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Deterministic artifact key: `{database}/{table_or_dump}/{timestamp}.enc`.
///
/// Table names keep their schema qualifier with `.` replaced by `_` so the
/// key stays a three-segment path.
pub fn artifact_key(database: &str, object_name: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}.enc",
        database,
        object_name.replace('.', "_"),
        at.format("%Y%m%d%H%M%S")
    )
}

/// `StorageClient` backed by any `object_store` implementation (S3, local
/// filesystem, or in-memory for tests).
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    label: String,
}

impl ObjectStorage {
    /// Wrap an existing store. `label` is used in log lines only.
    pub fn new(store: Arc<dyn ObjectStore>, label: impl Into<String>) -> Self {
        Self {
            store,
            label: label.into(),
        }
    }

    /// S3-compatible bucket; region/endpoint/credentials come from the
    /// standard AWS environment variables.
    pub fn s3(bucket: &str) -> Result<Self> {
        let store = object_store::aws::AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| MoverError::connection(e.to_string(), "building S3 client"))?;
        Ok(Self::new(Arc::new(store), format!("s3://{}", bucket)))
    }

    /// Local filesystem store rooted at `root` (temp_location=local).
    pub fn local(root: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let store = object_store::local::LocalFileSystem::new_with_prefix(root)
            .map_err(|e| MoverError::connection(e.to_string(), "opening local temp store"))?;
        Ok(Self::new(
            Arc::new(store),
            format!("file://{}", root.display()),
        ))
    }

    /// In-memory store for tests.
    pub fn memory() -> Self {
        Self::new(
            Arc::new(object_store::memory::InMemory::new()),
            "memory".to_string(),
        )
    }
}

#[async_trait]
impl StorageClient for ObjectStorage {
    async fn put(&self, key: &str, payload: Vec<u8>) -> Result<String> {
        let digest = crypto::digest(&payload);
        let len = payload.len();

        self.store
            .put(&ObjectPath::from(key), PutPayload::from(payload))
            .await?;
        self.store
            .put(
                &ObjectPath::from(format!("{}{}", key, DIGEST_SUFFIX)),
                PutPayload::from(digest.clone().into_bytes()),
            )
            .await?;

        info!("{}: stored {} ({} bytes)", self.label, key, len);
        Ok(digest)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let bytes = self
            .store
            .get(&ObjectPath::from(key))
            .await?
            .bytes()
            .await?;
        debug!("{}: fetched {} ({} bytes)", self.label, key, bytes.len());
        Ok(bytes.to_vec())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self.store.head(&ObjectPath::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_artifact_key_scheme() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(
            artifact_key("runner_1", "staging.orders", at),
            "runner_1/staging_orders/20260314092653.enc"
        );
        assert_eq!(
            artifact_key("runner_1", "dump", at),
            "runner_1/dump/20260314092653.enc"
        );
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let storage = ObjectStorage::memory();
        let digest = storage.put("db/t/1.enc", b"sealed".to_vec()).await.unwrap();

        assert_eq!(storage.get("db/t/1.enc").await.unwrap(), b"sealed");
        assert_eq!(digest, crypto::digest(b"sealed"));
    }

    #[tokio::test]
    async fn test_digest_sibling_is_written() {
        let storage = ObjectStorage::memory();
        let digest = storage.put("db/t/1.enc", b"sealed".to_vec()).await.unwrap();

        let sibling = storage.get("db/t/1.enc.digest").await.unwrap();
        assert_eq!(String::from_utf8(sibling).unwrap(), digest);
    }

    #[tokio::test]
    async fn test_exists() {
        let storage = ObjectStorage::memory();
        assert!(!storage.exists("db/t/1.enc").await.unwrap());
        storage.put("db/t/1.enc", b"sealed".to_vec()).await.unwrap();
        assert!(storage.exists("db/t/1.enc").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ObjectStorage::local(dir.path()).unwrap();
        storage.put("db/t/1.enc", b"sealed".to_vec()).await.unwrap();
        assert_eq!(storage.get("db/t/1.enc").await.unwrap(), b"sealed");
    }
}
