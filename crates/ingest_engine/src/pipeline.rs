//! Per-job orchestration: discovery, filtering, bounded fan-out of documents,
//! metadata and cleanup. Job state lives in `ingest_core` and only changes
//! through `update`; this module executes the effects it asks for.
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use futures_util::stream::{self, StreamExt};
use ingest_core::{
    is_direct_document, update, DocId, DocStage, Effect, ErrorKind, FilterRegistry, JobParameters,
    JobPhase, JobReport, JobState, LinkRecord, Msg,
};
use ingest_logging::{ingest_debug, ingest_error, ingest_info, ingest_warn};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::extract::TableExtractor;
use crate::links::LinkExtractor;
use crate::progress::{DocumentProgress, EngineEvent, NullProgressSink, ProgressSink};
use crate::retry::with_retry;
use crate::storage::{ObjectStore, StorageWriter};
use crate::{DocumentError, FailureKind, FetchError, Fetcher, JobError, ReqwestFetcher};

pub struct Pipeline {
    config: EngineConfig,
    fetcher: Arc<dyn Fetcher>,
    links: LinkExtractor,
    registry: Arc<FilterRegistry>,
    extractor: TableExtractor,
    writer: StorageWriter,
    sink: Arc<dyn ProgressSink>,
}

struct Dispatch {
    doc_id: DocId,
    url: String,
    source_name: String,
}

/// What every document task of one job shares.
struct JobScope<'a> {
    params: &'a JobParameters,
    capture_date: NaiveDate,
    scratch: &'a Path,
    cancel: &'a CancellationToken,
}

impl JobScope<'_> {
    fn checkpoint(&self, next_stage: &'static str) -> Result<(), DocumentError> {
        if self.cancel.is_cancelled() {
            Err(DocumentError::Cancelled(next_stage))
        } else {
            Ok(())
        }
    }
}

impl Pipeline {
    pub fn new(config: EngineConfig, store: Arc<dyn ObjectStore>) -> Self {
        let fetcher = Arc::new(ReqwestFetcher::new(config.fetch.clone()));
        let writer = StorageWriter::new(store, config.retry.clone());
        Self {
            config,
            fetcher,
            links: LinkExtractor::new(),
            registry: Arc::new(FilterRegistry::with_builtin()),
            extractor: TableExtractor::new(),
            writer,
            sink: Arc::new(NullProgressSink),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_registry(mut self, registry: FilterRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_extractor(mut self, extractor: TableExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates a raw JSON job payload and runs it.
    ///
    /// An invalid payload fails before any network activity.
    pub async fn run_payload(
        &self,
        payload: Value,
        cancel: CancellationToken,
    ) -> Result<JobReport, JobError> {
        let params = JobParameters::from_json(payload)?;
        self.run(params, cancel).await
    }

    /// Runs one job to a terminal state.
    ///
    /// Discovery and per-document failures are recorded in the report; the
    /// only `Err` is an invalid job.
    pub async fn run(
        &self,
        params: JobParameters,
        cancel: CancellationToken,
    ) -> Result<JobReport, JobError> {
        let capture_date = self.config.capture_clock.today();
        ingest_info!(
            "Starting job {} for dataset {} from {} (capture date {})",
            params.job_name().unwrap_or("-"),
            params.dataset_name(),
            params.base_url(),
            capture_date
        );

        let cancel = cancel.child_token();
        // Cancelling the child on return stops the timeout task.
        let _timer_guard = cancel.clone().drop_guard();
        if let Some(timeout) = self.config.job_timeout {
            let timer = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        ingest_warn!("Job timeout of {:?} elapsed, cancelling", timeout);
                        timer.cancel();
                    }
                    _ = timer.cancelled() => {}
                }
            });
        }

        let discovered = self.discover(&params, &cancel).await;
        let (mut state, effects) = update(JobState::new(params.clone(), capture_date), discovered);

        let mut scratch: Option<TempDir> = None;
        let mut queue: VecDeque<Effect> = effects.into();
        let mut dispatches = Vec::new();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::FilterLinks => {
                    let filter = self.registry.select(params.base_url(), params.params());
                    let urls = filter.filter_links(state.links());
                    ingest_info!(
                        "Filter {} kept {} of {} links",
                        filter.name(),
                        urls.len(),
                        state.links().len()
                    );
                    let (next, effects) = update(state, Msg::LinksFiltered(urls));
                    state = next;
                    queue.extend(effects);
                }
                Effect::DispatchDocument {
                    doc_id,
                    url,
                    source_name,
                } => dispatches.push(Dispatch {
                    doc_id,
                    url,
                    source_name,
                }),
                Effect::WriteMetadata => {
                    let msg = match self
                        .writer
                        .write_metadata(
                            params.dataset_name(),
                            capture_date,
                            &state.metadata_document(),
                        )
                        .await
                    {
                        Ok(key) => Msg::MetadataWritten { key },
                        Err(err) => {
                            ingest_error!("Writing job metadata failed: {}", err);
                            Msg::MetadataFailed {
                                message: err.to_string(),
                            }
                        }
                    };
                    let (next, effects) = update(state, msg);
                    state = next;
                    queue.extend(effects);
                }
                Effect::Finished(status) => {
                    self.sink.emit(EngineEvent::JobFinished { status });
                }
            }

            if queue.is_empty() && !dispatches.is_empty() {
                let dir = match scratch.take() {
                    Some(dir) => dir,
                    None => match self.create_scratch() {
                        Ok(dir) => dir,
                        Err(err) => {
                            ingest_error!("Cannot create job scratch directory: {}", err);
                            for dispatch in std::mem::take(&mut dispatches) {
                                let error = DocumentError::Fetch(FetchError::new(
                                    FailureKind::Io,
                                    format!("cannot create scratch directory: {err}"),
                                ));
                                let msg = self.settle_document(dispatch, Err((error, Vec::new())));
                                let (next, effects) = update(state, msg);
                                state = next;
                                queue.extend(effects);
                            }
                            continue;
                        }
                    },
                };
                let scope = JobScope {
                    params: &params,
                    capture_date,
                    scratch: scratch.insert(dir).path(),
                    cancel: &cancel,
                };
                let batch = std::mem::take(&mut dispatches);
                let (next, effects) = self.run_documents(state, batch, &scope).await;
                state = next;
                queue.extend(effects);
            }
        }

        if let Some(dir) = scratch {
            let path = dir.path().to_path_buf();
            if let Err(err) = dir.close() {
                ingest_warn!("Could not remove scratch directory {:?}: {}", path, err);
            }
        }

        let report = state.report();
        ingest_info!(
            "Job for {} finished {:?}: {} documents, {} keys, {} failures",
            report.dataset_name,
            report.status,
            report.documents_attempted,
            report.manifest.keys.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Fetches the listing page, or skips it for a direct document.
    async fn discover(&self, params: &JobParameters, cancel: &CancellationToken) -> Msg {
        let base_url = params.base_url();
        if is_direct_document(base_url) {
            ingest_info!("{} is a document, skipping link discovery", base_url);
            return Msg::LinksFetched(vec![LinkRecord::new(base_url.as_str(), "")]);
        }
        tokio::select! {
            links = self.links.fetch_links(self.fetcher.as_ref(), base_url, &self.config.retry) => {
                match links {
                    Ok(links) => Msg::LinksFetched(links),
                    Err(err) => {
                        ingest_error!("Link discovery on {} failed: {}", base_url, err);
                        Msg::DiscoveryFailed {
                            kind: err.kind(),
                            message: err.to_string(),
                        }
                    }
                }
            }
            _ = cancel.cancelled() => {
                ingest_warn!("Job cancelled during link discovery on {}", base_url);
                Msg::DiscoveryFailed {
                    kind: ErrorKind::Cancelled,
                    message: "cancelled during link discovery".to_string(),
                }
            }
        }
    }

    fn create_scratch(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ingest-job-");
        match &self.config.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    /// Fans documents out with bounded concurrency and folds their messages
    /// into the job state until every document has settled.
    async fn run_documents(
        &self,
        state: JobState,
        batch: Vec<Dispatch>,
        scope: &JobScope<'_>,
    ) -> (JobState, Vec<Effect>) {
        let (tx, mut rx) = unbounded_channel();
        let concurrency = self.config.concurrency.max(1);
        ingest_debug!("Processing {} documents, {} at a time", batch.len(), concurrency);

        let work = stream::iter(batch)
            .map(move |dispatch| self.process_document(scope, dispatch, tx.clone()))
            .buffer_unordered(concurrency)
            .collect::<Vec<()>>();

        let fold = async move {
            let mut state = state;
            let mut effects = Vec::new();
            while state.phase() == JobPhase::Running {
                let Some(msg) = rx.recv().await else { break };
                let (next, mut produced) = update(state, msg);
                state = next;
                effects.append(&mut produced);
            }
            (state, effects)
        };

        let (_, folded) = tokio::join!(work, fold);
        folded
    }

    async fn process_document(
        &self,
        scope: &JobScope<'_>,
        dispatch: Dispatch,
        tx: UnboundedSender<Msg>,
    ) {
        let mut keys = Vec::new();
        let result = self
            .document_pipeline(scope, &dispatch, &tx, &mut keys)
            .await;
        let outcome = match result {
            Ok(()) => Ok(keys),
            Err(err) => Err((err, keys)),
        };
        let _ = tx.send(self.settle_document(dispatch, outcome));
    }

    /// Reports a document's outcome and turns it into its terminal message.
    /// A failure carries the keys written before it happened.
    fn settle_document(
        &self,
        dispatch: Dispatch,
        outcome: Result<Vec<String>, (DocumentError, Vec<String>)>,
    ) -> Msg {
        let Dispatch { doc_id, url, .. } = dispatch;
        let (msg, result) = match outcome {
            Ok(keys) => (
                Msg::DocumentDone {
                    doc_id,
                    keys: keys.clone(),
                },
                Ok(keys),
            ),
            Err((err, keys)) => {
                let kind = err.kind();
                ingest_warn!("{} failed ({}): {}", url, kind, err);
                if !keys.is_empty() {
                    ingest_warn!("{} left {} objects behind: {:?}", url, keys.len(), keys);
                }
                (
                    Msg::DocumentFailed {
                        doc_id,
                        kind,
                        message: err.to_string(),
                        keys,
                    },
                    Err(kind),
                )
            }
        };
        self.sink.emit(EngineEvent::DocumentFinished {
            doc_id,
            url,
            result,
        });
        msg
    }

    /// Fetch, extract, upload. Every key written is pushed to `keys` as soon
    /// as it lands. The fetched file is deleted when this returns.
    async fn document_pipeline(
        &self,
        scope: &JobScope<'_>,
        dispatch: &Dispatch,
        tx: &UnboundedSender<Msg>,
        keys: &mut Vec<String>,
    ) -> Result<(), DocumentError> {
        let doc_id = dispatch.doc_id;
        let url = dispatch.url.as_str();
        let source_name = dispatch.source_name.as_str();
        scope.checkpoint("fetch")?;
        self.stage(tx, doc_id, url, DocStage::Fetching, None);
        let document = with_retry(&self.config.retry, "document fetch", || {
            self.fetcher.fetch_document(url, scope.scratch)
        })
        .await?;
        let _ = tx.send(Msg::DocumentFetched {
            doc_id,
            checksum: document.checksum.clone(),
            byte_size: document.byte_size,
        });

        scope.checkpoint("extraction")?;
        self.stage(tx, doc_id, url, DocStage::Extracting, Some(document.byte_size));
        let tables = self.extractor.extract_tables(&document).await?;

        scope.checkpoint("upload")?;
        self.stage(tx, doc_id, url, DocStage::Uploading, Some(document.byte_size));
        let dataset = scope.params.dataset_name();
        keys.push(
            self.writer
                .write_staging(&document, dataset, scope.capture_date, source_name)
                .await?,
        );
        for (index, table) in tables.iter().enumerate() {
            keys.push(
                self.writer
                    .write_raw(table, dataset, scope.capture_date, source_name, index)
                    .await?,
            );
        }
        Ok(())
    }

    fn stage(
        &self,
        tx: &UnboundedSender<Msg>,
        doc_id: DocId,
        url: &str,
        stage: DocStage,
        bytes: Option<u64>,
    ) {
        ingest_debug!("{} -> {:?}", url, stage);
        let _ = tx.send(Msg::DocumentStage { doc_id, stage });
        self.sink.emit(EngineEvent::Progress(DocumentProgress {
            doc_id,
            url: url.to_string(),
            stage,
            bytes,
        }));
    }
}
