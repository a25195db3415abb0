use crate::{DocId, DocStage, ErrorKind, LinkRecord};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Link discovery finished (or was skipped for a direct document).
    LinksFetched(Vec<LinkRecord>),
    /// The listing page could not be fetched or parsed, or the job was
    /// cancelled while fetching it.
    DiscoveryFailed { kind: ErrorKind, message: String },
    /// The site filter chose these URLs, in processing order.
    LinksFiltered(Vec<String>),
    /// A document moved to a non-terminal stage.
    DocumentStage { doc_id: DocId, stage: DocStage },
    /// A document's bytes are on local disk.
    DocumentFetched {
        doc_id: DocId,
        checksum: String,
        byte_size: u64,
    },
    /// Every key for the document was written.
    DocumentDone { doc_id: DocId, keys: Vec<String> },
    DocumentFailed {
        doc_id: DocId,
        kind: ErrorKind,
        message: String,
        /// Objects already written for the document before it failed.
        keys: Vec<String>,
    },
    MetadataWritten { key: String },
    MetadataFailed { message: String },
}
