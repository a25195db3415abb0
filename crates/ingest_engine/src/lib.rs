//! Ingest engine: fetching, link discovery, table extraction, storage and the
//! job orchestrator that executes `ingest_core` effects.
mod columnar;
mod config;
mod decode;
mod error;
pub mod extract;
mod fetch;
mod links;
mod pipeline;
mod progress;
mod retry;
pub mod storage;
mod types;

pub use columnar::{infer_column_type, table_to_parquet, ColumnarError, PARQUET_EXTENSION};
pub use config::{CaptureClock, EngineConfig};
pub use decode::{decode_html, DecodeError, DecodedHtml};
pub use error::{DocumentError, ExtractionError, JobError, StorageError};
pub use extract::{detect_format, DocumentFormat, FormatParser, TableExtractor};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher};
pub use links::{normalize_url, LinkError, LinkExtractor};
pub use pipeline::Pipeline;
pub use progress::{
    ChannelProgressSink, DocumentProgress, EngineEvent, LogProgressSink, NullProgressSink,
    ProgressSink,
};
pub use retry::{with_retry, RetryPolicy, Transient};
pub use storage::{
    HttpObjectStore, LocalObjectStore, MemoryObjectStore, ObjectStore, StorageWriter, StoreToken,
    CREDENTIALS_ENV_VAR,
};
pub use types::{FailureKind, FetchError, FetchMetadata, FetchOutput, FetchedDocument};
