use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Error taxonomy label recorded against a failed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidJob,
    Fetch,
    SizeLimitExceeded,
    Parse,
    Extraction,
    Storage,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::InvalidJob => "InvalidJobError",
            ErrorKind::Fetch => "FetchError",
            ErrorKind::SizeLimitExceeded => "SizeLimitExceeded",
            ErrorKind::Parse => "ParseError",
            ErrorKind::Extraction => "ExtractionError",
            ErrorKind::Storage => "StorageError",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub url: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Every selected document reached `Done` and nothing failed at job level
    /// (trivially true for zero documents).
    Completed,
    /// Some documents reached `Done`; some failed, or the metadata write did.
    PartiallyFailed,
    /// Documents were selected and none reached `Done`, or discovery failed.
    Failed,
}

/// Keys written for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageManifest {
    /// Staging and raw-zone keys of documents that reached `Done`.
    pub keys: BTreeSet<String>,
    /// Keys written for documents that failed at a later step.
    #[serde(default)]
    pub orphaned: BTreeSet<String>,
    /// The job metadata object, when it was written.
    pub metadata_key: Option<String>,
}

impl StorageManifest {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.orphaned.is_empty() && self.metadata_key.is_none()
    }

    /// Every key, metadata included, in sorted order.
    pub fn all_keys(&self) -> BTreeSet<String> {
        let mut all = self.keys.clone();
        all.extend(self.orphaned.iter().cloned());
        all.extend(self.metadata_key.iter().cloned());
        all
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub dataset_name: String,
    pub base_url: String,
    pub capture_date: NaiveDate,
    pub status: JobStatus,
    pub documents_attempted: usize,
    pub manifest: StorageManifest,
    pub failures: Vec<DocumentFailure>,
}

impl JobReport {
    pub fn failed_urls(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.url.as_str()).collect()
    }
}
