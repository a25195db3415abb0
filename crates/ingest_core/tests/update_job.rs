use chrono::NaiveDate;
use ingest_core::{
    update, DocStage, Effect, ErrorKind, JobParameters, JobPhase, JobState, JobStatus, LinkRecord,
    Msg,
};
use pretty_assertions::assert_eq;

fn capture_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 22).unwrap()
}

fn new_state(max_files: usize) -> JobState {
    let params = JobParameters::new("meu_dataset", "http://x/")
        .unwrap()
        .with_max_files(max_files)
        .unwrap();
    JobState::new(params, capture_date())
}

fn dispatched(effects: &[Effect]) -> Vec<(usize, String, String)> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::DispatchDocument {
                doc_id,
                url,
                source_name,
            } => Some((*doc_id, url.clone(), source_name.clone())),
            _ => None,
        })
        .collect()
}

fn running_state(urls: &[&str]) -> (JobState, Vec<Effect>) {
    let links: Vec<LinkRecord> = urls.iter().map(|u| LinkRecord::new(*u, "")).collect();
    let (state, effects) = update(new_state(10), Msg::LinksFetched(links));
    assert_eq!(effects, vec![Effect::FilterLinks]);
    update(
        state,
        Msg::LinksFiltered(urls.iter().map(|u| u.to_string()).collect()),
    )
}

#[test]
fn filtered_links_are_dispatched_in_order_with_unique_names() {
    let (state, effects) = running_state(&["http://x/2024/a.pdf", "http://x/b.pdf", "http://x/2025/a.pdf"]);
    let docs = dispatched(&effects);

    assert_eq!(state.phase(), JobPhase::Running);
    assert_eq!(docs.len(), 3);
    assert_eq!(docs[0], (0, "http://x/2024/a.pdf".into(), "a.pdf".into()));
    assert_eq!(docs[1], (1, "http://x/b.pdf".into(), "b.pdf".into()));
    assert!(docs[2].2.starts_with("a--") && docs[2].2.ends_with(".pdf"));
}

#[test]
fn max_files_caps_dispatch() {
    let links: Vec<LinkRecord> = (0..5)
        .map(|i| LinkRecord::new(format!("http://x/{i}.pdf"), ""))
        .collect();
    let urls = links.iter().map(|l| l.url.clone()).collect();
    let (state, _) = update(new_state(2), Msg::LinksFetched(links));
    let (_, effects) = update(state, Msg::LinksFiltered(urls));
    assert_eq!(dispatched(&effects).len(), 2);
}

#[test]
fn empty_selection_completes_immediately() {
    let (state, _) = update(new_state(10), Msg::LinksFetched(Vec::new()));
    let (state, effects) = update(state, Msg::LinksFiltered(Vec::new()));

    assert_eq!(effects, vec![Effect::Finished(JobStatus::Completed)]);
    let report = state.report();
    assert_eq!(report.status, JobStatus::Completed);
    assert!(report.manifest.is_empty());
    assert!(report.failures.is_empty());
}

#[test]
fn all_done_writes_metadata_then_completes() {
    let (state, _) = running_state(&["http://x/a.pdf", "http://x/b.pdf"]);
    let (state, _) = update(
        state,
        Msg::DocumentStage {
            doc_id: 0,
            stage: DocStage::Fetching,
        },
    );
    assert_eq!(state.document(0).unwrap().stage, DocStage::Fetching);

    let (state, effects) = update(
        state,
        Msg::DocumentDone {
            doc_id: 0,
            keys: vec!["staging/meu_dataset/data_captura=20251122/a.pdf".into()],
        },
    );
    assert!(effects.is_empty());

    let (state, effects) = update(
        state,
        Msg::DocumentDone {
            doc_id: 1,
            keys: vec!["staging/meu_dataset/data_captura=20251122/b.pdf".into()],
        },
    );
    assert_eq!(effects, vec![Effect::WriteMetadata]);
    assert_eq!(state.phase(), JobPhase::Finalizing);

    let key = state.metadata_key();
    assert_eq!(key, "raw/meu_dataset/data_captura=20251122/metadata.json");
    let (state, effects) = update(state, Msg::MetadataWritten { key: key.clone() });
    assert_eq!(effects, vec![Effect::Finished(JobStatus::Completed)]);

    let report = state.report();
    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.manifest.keys.len(), 2);
    assert_eq!(report.manifest.metadata_key, Some(key));
}

#[test]
fn one_failure_among_successes_is_partial() {
    let (state, _) = running_state(&["http://x/a.pdf", "http://x/b.pdf"]);
    let (state, _) = update(
        state,
        Msg::DocumentDone {
            doc_id: 0,
            keys: vec!["staging/meu_dataset/data_captura=20251122/a.pdf".into()],
        },
    );
    let (state, effects) = update(
        state,
        Msg::DocumentFailed {
            doc_id: 1,
            kind: ErrorKind::Fetch,
            message: "http status 500".into(),
            keys: Vec::new(),
        },
    );
    assert_eq!(effects, vec![Effect::WriteMetadata]);
    let (state, effects) = update(
        state,
        Msg::MetadataFailed {
            message: "bucket unavailable".into(),
        },
    );
    assert_eq!(effects, vec![Effect::Finished(JobStatus::PartiallyFailed)]);

    let report = state.report();
    assert_eq!(report.status, JobStatus::PartiallyFailed);
    assert_eq!(
        report.manifest.keys.iter().collect::<Vec<_>>(),
        vec!["staging/meu_dataset/data_captura=20251122/a.pdf"]
    );
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].url, "http://x/b.pdf");
    assert_eq!(report.failures[0].kind, ErrorKind::Fetch);
    assert_eq!(report.failures[1].kind, ErrorKind::Storage);
}

#[test]
fn all_failures_skip_metadata_and_fail() {
    let (state, _) = running_state(&["http://x/a.pdf"]);
    let (state, effects) = update(
        state,
        Msg::DocumentFailed {
            doc_id: 0,
            kind: ErrorKind::Extraction,
            message: "not a pdf".into(),
            keys: Vec::new(),
        },
    );
    assert_eq!(effects, vec![Effect::Finished(JobStatus::Failed)]);
    assert!(state.is_finished());
}

#[test]
fn settled_documents_ignore_late_messages() {
    let (state, _) = running_state(&["http://x/a.pdf", "http://x/b.pdf"]);
    let (state, _) = update(
        state,
        Msg::DocumentFailed {
            doc_id: 0,
            kind: ErrorKind::Cancelled,
            message: "cancelled".into(),
            keys: Vec::new(),
        },
    );
    let (state, _) = update(
        state,
        Msg::DocumentDone {
            doc_id: 0,
            keys: vec!["late".into()],
        },
    );
    let (state, _) = update(
        state,
        Msg::DocumentStage {
            doc_id: 0,
            stage: DocStage::Uploading,
        },
    );
    let doc = state.document(0).unwrap();
    assert_eq!(doc.stage, DocStage::Failed);
    assert!(doc.keys.is_empty());
}

#[test]
fn out_of_phase_messages_are_ignored() {
    let state = new_state(10);
    let (state, effects) = update(state, Msg::LinksFiltered(vec!["http://x/a.pdf".into()]));
    assert!(effects.is_empty());
    assert_eq!(state.phase(), JobPhase::Initialized);
}

#[test]
fn metadata_document_is_stable_and_sorted() {
    let (state, _) = running_state(&["http://x/b.pdf", "http://x/a.pdf"]);
    let (state, _) = update(
        state,
        Msg::DocumentFetched {
            doc_id: 0,
            checksum: "bb".into(),
            byte_size: 2,
        },
    );
    let (state, _) = update(
        state,
        Msg::DocumentDone {
            doc_id: 0,
            keys: vec!["k2".into(), "k1".into()],
        },
    );
    let (state, _) = update(
        state,
        Msg::DocumentDone {
            doc_id: 1,
            keys: vec!["k3".into()],
        },
    );
    let doc = state.metadata_document();
    assert_eq!(doc["capture_date"], "2025-11-22");
    assert_eq!(doc["documents"][0]["url"], "http://x/a.pdf");
    assert_eq!(doc["documents"][1]["sha256"], "bb");
    assert_eq!(doc["documents"][1]["keys"], serde_json::json!(["k1", "k2"]));
    assert_eq!(state.metadata_document(), doc);
}

#[test]
fn discovery_failure_fails_the_job_with_one_entry() {
    let (state, effects) = update(
        new_state(10),
        Msg::DiscoveryFailed {
            kind: ErrorKind::Fetch,
            message: "http://x/ returned 404 Not Found".into(),
        },
    );

    assert_eq!(effects, vec![Effect::Finished(JobStatus::Failed)]);
    let report = state.report();
    assert_eq!(report.status, JobStatus::Failed);
    assert_eq!(report.documents_attempted, 0);
    assert!(report.manifest.is_empty());
    assert_eq!(report.failed_urls(), vec!["http://x/"]);
    assert_eq!(report.failures[0].kind, ErrorKind::Fetch);
}

#[test]
fn discovery_failure_after_links_is_ignored() {
    let (state, _) = update(new_state(10), Msg::LinksFetched(Vec::new()));
    let (state, effects) = update(
        state,
        Msg::DiscoveryFailed {
            kind: ErrorKind::Cancelled,
            message: "late".into(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.phase(), JobPhase::LinksFetched);
}

#[test]
fn metadata_failure_keeps_job_from_completing() {
    let (state, _) = running_state(&["http://x/a.pdf"]);
    let (state, effects) = update(
        state,
        Msg::DocumentDone {
            doc_id: 0,
            keys: vec!["staging/meu_dataset/data_captura=20251122/a.pdf".into()],
        },
    );
    assert_eq!(effects, vec![Effect::WriteMetadata]);
    let (state, effects) = update(
        state,
        Msg::MetadataFailed {
            message: "bucket unavailable".into(),
        },
    );

    assert_eq!(effects, vec![Effect::Finished(JobStatus::PartiallyFailed)]);
    let report = state.report();
    assert_eq!(report.status, JobStatus::PartiallyFailed);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, ErrorKind::Storage);
}

#[test]
fn keys_of_failed_documents_are_reported_as_orphaned() {
    let staging = "staging/meu_dataset/data_captura=20251122/a.html";
    let (state, _) = running_state(&["http://x/a.html"]);
    let (state, effects) = update(
        state,
        Msg::DocumentFailed {
            doc_id: 0,
            kind: ErrorKind::Storage,
            message: "store rejected raw key with status 403".into(),
            keys: vec![staging.into()],
        },
    );
    // Something reached the store, so the job still records its metadata.
    assert_eq!(effects, vec![Effect::WriteMetadata]);
    assert_eq!(state.metadata_document()["orphaned_keys"], serde_json::json!([staging]));
    assert_eq!(state.metadata_document()["documents"], serde_json::json!([]));

    let key = state.metadata_key();
    let (state, effects) = update(state, Msg::MetadataWritten { key: key.clone() });
    assert_eq!(effects, vec![Effect::Finished(JobStatus::Failed)]);

    let manifest = state.report().manifest;
    assert!(manifest.keys.is_empty());
    assert_eq!(manifest.orphaned.iter().collect::<Vec<_>>(), vec![staging]);
    assert_eq!(
        manifest.all_keys().into_iter().collect::<Vec<_>>(),
        vec![key, staging.to_string()]
    );
}
