//! Object stores and the storage writer that lays out staging and raw-zone keys.
mod http;
mod local;
mod memory;
mod writer;

use std::path::Path;

use bytes::Bytes;

use crate::StorageError;

pub use http::{HttpObjectStore, StoreToken, CREDENTIALS_ENV_VAR};
pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use writer::StorageWriter;

/// A flat key/value object store.
///
/// `put` must either make the full body visible at `key` or leave the key
/// untouched; partial objects are never observable.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes) -> Result<(), StorageError>;

    /// Uploads a local file. Stores that can copy files directly override this.
    async fn put_file(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        let body = tokio::fs::read(path).await.map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })?;
        self.put(key, Bytes::from(body)).await
    }

    /// Short human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Rejects keys that could escape the store root or collide with directories.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && !key.contains('\\')
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
