use ingest_core::{ErrorKind, InvalidJobError};

use crate::retry::Transient;
use crate::FetchError;
use crate::FailureKind;

/// The document could not be opened as its declared format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot read {format} document: {message}")]
pub struct ExtractionError {
    pub format: &'static str,
    pub message: String,
}

impl ExtractionError {
    pub(crate) fn new(format: &'static str, message: impl Into<String>) -> Self {
        Self {
            format,
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object key {0:?}")]
    InvalidKey(String),
    #[error("io error writing {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store rejected {key} with status {status}")]
    Status { key: String, status: u16 },
    #[error("network error writing {key}: {message}")]
    Network { key: String, message: String },
    #[error("cannot serialize {key}: {message}")]
    Serialize { key: String, message: String },
    #[error("credentials unavailable: {0}")]
    Credentials(String),
}

impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        match self {
            StorageError::Network { .. } => true,
            StorageError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

/// Why one document's sub-pipeline stopped.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("cancelled before {0}")]
    Cancelled(&'static str),
}

impl DocumentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocumentError::Fetch(err) => match err.kind {
                FailureKind::TooLarge { .. } => ErrorKind::SizeLimitExceeded,
                _ => ErrorKind::Fetch,
            },
            DocumentError::Extraction(_) => ErrorKind::Extraction,
            DocumentError::Storage(_) => ErrorKind::Storage,
            DocumentError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }
}

/// The job was rejected before any network activity. Everything that goes
/// wrong after that is recorded in the job report instead.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("invalid job: {0}")]
    InvalidJob(#[from] InvalidJobError),
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::InvalidJob(_) => ErrorKind::InvalidJob,
        }
    }
}
