use crate::{DocId, JobStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Run the site filter over the discovered links.
    FilterLinks,
    /// Start the fetch → extract → upload sub-pipeline for one document.
    DispatchDocument {
        doc_id: DocId,
        url: String,
        source_name: String,
    },
    /// All documents settled and something was written; record the job metadata.
    WriteMetadata,
    /// The job reached a terminal state.
    Finished(JobStatus),
}
