use ingest_core::{DocId, DocStage, ErrorKind, JobStatus};
use ingest_logging::{ingest_info, ingest_warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentProgress {
    pub doc_id: DocId,
    pub url: String,
    pub stage: DocStage,
    pub bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Progress(DocumentProgress),
    DocumentFinished {
        doc_id: DocId,
        url: String,
        /// Keys written, or the kind of failure.
        result: Result<Vec<String>, ErrorKind>,
    },
    JobFinished {
        status: JobStatus,
    },
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _event: EngineEvent) {}
}

pub struct ChannelProgressSink {
    tx: std::sync::mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: std::sync::mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Writes document completions and the job outcome to the log.
#[derive(Debug, Default)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn emit(&self, event: EngineEvent) {
        match event {
            EngineEvent::Progress(_) => {}
            EngineEvent::DocumentFinished {
                url,
                result: Ok(keys),
                ..
            } => ingest_info!("{} done, {} objects written", url, keys.len()),
            EngineEvent::DocumentFinished {
                url,
                result: Err(kind),
                ..
            } => ingest_warn!("{} failed with {}", url, kind),
            EngineEvent::JobFinished { status } => ingest_info!("Job finished: {:?}", status),
        }
    }
}
