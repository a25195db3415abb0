use std::sync::Arc;

use bytes::Bytes;
use chrono::NaiveDate;
use ingest_core::keys::{metadata_key, raw_table_key, staging_key};
use ingest_core::CanonicalTable;
use serde_json::Value;

use super::ObjectStore;
use crate::columnar::{table_to_parquet, PARQUET_EXTENSION};
use crate::retry::{with_retry, RetryPolicy};
use crate::{FetchedDocument, StorageError};

/// Places documents, tables and job metadata under their deterministic keys.
///
/// Every write is retried on transient store failures.
#[derive(Clone)]
pub struct StorageWriter {
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
}

impl StorageWriter {
    pub fn new(store: Arc<dyn ObjectStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Copies the fetched bytes to the staging zone.
    pub async fn write_staging(
        &self,
        document: &FetchedDocument,
        dataset_name: &str,
        capture_date: NaiveDate,
        source_name: &str,
    ) -> Result<String, StorageError> {
        let key = staging_key(dataset_name, capture_date, source_name);
        let store = &self.store;
        let (key_ref, path) = (key.as_str(), &*document.path);
        with_retry(&self.retry, "staging upload", move || store.put_file(key_ref, path)).await?;
        Ok(key)
    }

    /// Serializes `table` to Parquet and writes it to the raw zone.
    pub async fn write_raw(
        &self,
        table: &CanonicalTable,
        dataset_name: &str,
        capture_date: NaiveDate,
        source_name: &str,
        table_index: usize,
    ) -> Result<String, StorageError> {
        let key = raw_table_key(
            dataset_name,
            capture_date,
            source_name,
            table_index,
            PARQUET_EXTENSION,
        );
        let body = table_to_parquet(table).map_err(|err| StorageError::Serialize {
            key: key.clone(),
            message: err.to_string(),
        })?;
        self.put_bytes(&key, Bytes::from(body), "raw table upload")
            .await?;
        Ok(key)
    }

    /// Writes the job metadata document next to the raw-zone partitions.
    pub async fn write_metadata(
        &self,
        dataset_name: &str,
        capture_date: NaiveDate,
        metadata: &Value,
    ) -> Result<String, StorageError> {
        let key = metadata_key(dataset_name, capture_date);
        let body = serde_json::to_vec_pretty(metadata).map_err(|err| StorageError::Serialize {
            key: key.clone(),
            message: err.to_string(),
        })?;
        self.put_bytes(&key, Bytes::from(body), "metadata upload")
            .await?;
        Ok(key)
    }

    async fn put_bytes(&self, key: &str, body: Bytes, label: &str) -> Result<(), StorageError> {
        let store = &self.store;
        let body = &body;
        with_retry(&self.retry, label, move || store.put(key, body.clone())).await
    }
}
