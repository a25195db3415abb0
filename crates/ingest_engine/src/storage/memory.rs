use std::collections::BTreeMap;
use std::sync::Mutex;

use bytes::Bytes;

use super::{validate_key, ObjectStore};
use crate::StorageError;

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(key).cloned())
    }

    /// Every stored key, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, body: Bytes) -> Result<(), StorageError> {
        validate_key(key)?;
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| StorageError::Io {
                key: key.to_string(),
                source: std::io::Error::other("memory store lock poisoned"),
            })?;
        objects.insert(key.to_string(), body);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
