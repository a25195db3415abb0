//! Ingest core: job parameters, site filters, canonical tables, storage keys
//! and the pure per-job state machine. No I/O happens here.
mod effect;
pub mod filter;
pub mod keys;
mod links;
mod msg;
mod params;
mod report;
mod selection;
mod state;
mod table;
mod update;

pub use effect::Effect;
pub use filter::{DefaultFilter, FilterRegistry, SiteFilter};
pub use links::{is_direct_document, url_filename, LinkRecord};
pub use msg::Msg;
pub use params::{FilterParams, InvalidJobError, JobParameters, JobPayload, DEFAULT_MAX_FILES};
pub use report::{DocumentFailure, ErrorKind, JobReport, JobStatus, StorageManifest};
pub use selection::select_documents;
pub use state::{DocId, DocStage, DocumentState, JobPhase, JobState};
pub use table::{normalize_table, CanonicalTable, CellValue, NormalizeOutcome, RawTable};
pub use update::update;
