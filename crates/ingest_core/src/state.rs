use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::keys::metadata_key;
use crate::{DocumentFailure, JobParameters, JobReport, JobStatus, LinkRecord, StorageManifest};

pub type DocId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Initialized,
    LinksFetched,
    LinksFiltered,
    /// Documents dispatched, waiting for all of them to settle.
    Running,
    /// Documents settled, job metadata being written.
    Finalizing,
    Finished(JobStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum DocStage {
    Pending,
    Fetching,
    Extracting,
    Uploading,
    Done,
    Failed,
}

impl DocStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, DocStage::Done | DocStage::Failed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentState {
    pub doc_id: DocId,
    pub url: String,
    pub source_name: String,
    pub stage: DocStage,
    pub checksum: Option<String>,
    pub byte_size: Option<u64>,
    pub keys: Vec<String>,
    pub failure: Option<DocumentFailure>,
}

/// Per-job state. Mutated only through [`crate::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobState {
    params: JobParameters,
    capture_date: NaiveDate,
    phase: JobPhase,
    links: Vec<LinkRecord>,
    documents: BTreeMap<DocId, DocumentState>,
    metadata_key: Option<String>,
    job_failures: Vec<DocumentFailure>,
}

impl JobState {
    pub fn new(params: JobParameters, capture_date: NaiveDate) -> Self {
        Self {
            params,
            capture_date,
            phase: JobPhase::Initialized,
            links: Vec::new(),
            documents: BTreeMap::new(),
            metadata_key: None,
            job_failures: Vec::new(),
        }
    }

    pub fn params(&self) -> &JobParameters {
        &self.params
    }

    pub fn capture_date(&self) -> NaiveDate {
        self.capture_date
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub fn links(&self) -> &[LinkRecord] {
        &self.links
    }

    pub fn documents(&self) -> impl Iterator<Item = &DocumentState> {
        self.documents.values()
    }

    pub fn document(&self, doc_id: DocId) -> Option<&DocumentState> {
        self.documents.get(&doc_id)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, JobPhase::Finished(_))
    }

    /// Status implied by the documents settled so far and any job-level failure.
    ///
    /// A job-level failure (discovery, metadata) keeps the job from `Completed`.
    pub fn status(&self) -> JobStatus {
        let done = self
            .documents
            .values()
            .filter(|d| d.stage == DocStage::Done)
            .count();
        let total = self.documents.len();
        let job_failed = !self.job_failures.is_empty();
        if total == 0 {
            if job_failed {
                JobStatus::Failed
            } else {
                JobStatus::Completed
            }
        } else if done == 0 {
            JobStatus::Failed
        } else if done == total && !job_failed {
            JobStatus::Completed
        } else {
            JobStatus::PartiallyFailed
        }
    }

    pub fn manifest(&self) -> StorageManifest {
        StorageManifest {
            keys: self
                .documents
                .values()
                .filter(|d| d.stage == DocStage::Done)
                .flat_map(|d| d.keys.iter().cloned())
                .collect(),
            orphaned: self.orphaned_keys().into_iter().collect(),
            metadata_key: self.metadata_key.clone(),
        }
    }

    /// Keys written for documents that failed afterwards, sorted.
    fn orphaned_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .documents
            .values()
            .filter(|d| d.stage == DocStage::Failed)
            .flat_map(|d| d.keys.iter().cloned())
            .collect();
        keys.sort();
        keys
    }

    pub fn report(&self) -> JobReport {
        let mut failures: Vec<DocumentFailure> = self
            .documents
            .values()
            .filter_map(|d| d.failure.clone())
            .collect();
        failures.extend(self.job_failures.iter().cloned());
        JobReport {
            dataset_name: self.params.dataset_name().to_string(),
            base_url: self.params.base_url().to_string(),
            capture_date: self.capture_date,
            status: match self.phase {
                JobPhase::Finished(status) => status,
                _ => self.status(),
            },
            documents_attempted: self.documents.len(),
            manifest: self.manifest(),
            failures,
        }
    }

    /// Key the job metadata object goes to.
    pub fn metadata_key(&self) -> String {
        metadata_key(self.params.dataset_name(), self.capture_date)
    }

    /// Job metadata: dataset, capture date, every finished document and the
    /// objects left behind by failed ones.
    ///
    /// Contains nothing time-dependent, so reruns on the same date are byte-identical.
    pub fn metadata_document(&self) -> Value {
        let mut documents: Vec<&DocumentState> = self
            .documents
            .values()
            .filter(|d| d.stage == DocStage::Done)
            .collect();
        documents.sort_by(|a, b| a.url.cmp(&b.url));
        json!({
            "dataset_name": self.params.dataset_name(),
            "base_url": self.params.base_url().as_str(),
            "capture_date": self.capture_date.format("%Y-%m-%d").to_string(),
            "documents": documents.iter().map(|d| {
                let mut keys = d.keys.clone();
                keys.sort();
                json!({
                    "url": d.url,
                    "source_name": d.source_name,
                    "sha256": d.checksum,
                    "byte_size": d.byte_size,
                    "keys": keys,
                })
            }).collect::<Vec<_>>(),
            "orphaned_keys": self.orphaned_keys(),
        })
    }

    pub(crate) fn set_phase(&mut self, phase: JobPhase) {
        self.phase = phase;
    }

    pub(crate) fn set_links(&mut self, links: Vec<LinkRecord>) {
        self.links = links;
    }

    pub(crate) fn add_document(&mut self, doc_id: DocId, url: String, source_name: String) {
        self.documents.insert(
            doc_id,
            DocumentState {
                doc_id,
                url,
                source_name,
                stage: DocStage::Pending,
                checksum: None,
                byte_size: None,
                keys: Vec::new(),
                failure: None,
            },
        );
    }

    pub(crate) fn document_mut(&mut self, doc_id: DocId) -> Option<&mut DocumentState> {
        self.documents.get_mut(&doc_id)
    }

    pub(crate) fn all_settled(&self) -> bool {
        self.documents.values().all(|d| d.stage.is_terminal())
    }

    /// Whether any document, finished or failed, wrote an object.
    pub(crate) fn any_written(&self) -> bool {
        self.documents
            .values()
            .any(|d| d.stage == DocStage::Done || !d.keys.is_empty())
    }

    pub(crate) fn set_metadata_key(&mut self, key: String) {
        self.metadata_key = Some(key);
    }

    pub(crate) fn push_job_failure(&mut self, failure: DocumentFailure) {
        self.job_failures.push(failure);
    }
}
