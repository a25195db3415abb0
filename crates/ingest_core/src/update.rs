use crate::keys::assign_source_names;
use crate::selection::select_documents;
use crate::{DocStage, DocumentFailure, Effect, ErrorKind, JobPhase, JobState, JobStatus, Msg};

/// Pure update function: applies a message to job state and returns any effects.
///
/// Messages that do not fit the current phase, or that target a document
/// which already settled, are ignored.
pub fn update(mut state: JobState, msg: Msg) -> (JobState, Vec<Effect>) {
    let effects = match msg {
        Msg::LinksFetched(links) => {
            if state.phase() != JobPhase::Initialized {
                return (state, Vec::new());
            }
            state.set_links(links);
            state.set_phase(JobPhase::LinksFetched);
            vec![Effect::FilterLinks]
        }
        Msg::DiscoveryFailed { kind, message } => {
            if state.phase() != JobPhase::Initialized {
                return (state, Vec::new());
            }
            let url = state.params().base_url().to_string();
            state.push_job_failure(DocumentFailure { url, kind, message });
            finish(&mut state)
        }
        Msg::LinksFiltered(urls) => {
            if state.phase() != JobPhase::LinksFetched {
                return (state, Vec::new());
            }
            let selected = select_documents(state.links(), urls, state.params());
            state.set_phase(JobPhase::LinksFiltered);
            if selected.is_empty() {
                state.set_phase(JobPhase::Finished(JobStatus::Completed));
                return (state, vec![Effect::Finished(JobStatus::Completed)]);
            }

            let names = assign_source_names(&selected);
            let mut effects = Vec::with_capacity(selected.len());
            for (doc_id, (url, source_name)) in selected.into_iter().zip(names).enumerate() {
                state.add_document(doc_id, url.clone(), source_name.clone());
                effects.push(Effect::DispatchDocument {
                    doc_id,
                    url,
                    source_name,
                });
            }
            state.set_phase(JobPhase::Running);
            effects
        }
        Msg::DocumentStage { doc_id, stage } => {
            if state.phase() == JobPhase::Running && !stage.is_terminal() {
                if let Some(doc) = state.document_mut(doc_id) {
                    if !doc.stage.is_terminal() {
                        doc.stage = stage;
                    }
                }
            }
            Vec::new()
        }
        Msg::DocumentFetched {
            doc_id,
            checksum,
            byte_size,
        } => {
            if let Some(doc) = state.document_mut(doc_id) {
                if !doc.stage.is_terminal() {
                    doc.checksum = Some(checksum);
                    doc.byte_size = Some(byte_size);
                }
            }
            Vec::new()
        }
        Msg::DocumentDone { doc_id, keys } => {
            if let Some(doc) = state.document_mut(doc_id) {
                if !doc.stage.is_terminal() {
                    doc.stage = DocStage::Done;
                    doc.keys = keys;
                }
            }
            settle(&mut state)
        }
        Msg::DocumentFailed {
            doc_id,
            kind,
            message,
            keys,
        } => {
            if let Some(doc) = state.document_mut(doc_id) {
                if !doc.stage.is_terminal() {
                    doc.stage = DocStage::Failed;
                    doc.keys = keys;
                    doc.failure = Some(DocumentFailure {
                        url: doc.url.clone(),
                        kind,
                        message,
                    });
                }
            }
            settle(&mut state)
        }
        Msg::MetadataWritten { key } => {
            if state.phase() != JobPhase::Finalizing {
                return (state, Vec::new());
            }
            state.set_metadata_key(key);
            finish(&mut state)
        }
        Msg::MetadataFailed { message } => {
            if state.phase() != JobPhase::Finalizing {
                return (state, Vec::new());
            }
            let url = state.params().base_url().to_string();
            state.push_job_failure(DocumentFailure {
                url,
                kind: ErrorKind::Storage,
                message,
            });
            finish(&mut state)
        }
    };

    (state, effects)
}

fn settle(state: &mut JobState) -> Vec<Effect> {
    if state.phase() != JobPhase::Running || !state.all_settled() {
        return Vec::new();
    }
    if state.any_written() {
        state.set_phase(JobPhase::Finalizing);
        vec![Effect::WriteMetadata]
    } else {
        finish(state)
    }
}

fn finish(state: &mut JobState) -> Vec<Effect> {
    let status = state.status();
    state.set_phase(JobPhase::Finished(status));
    vec![Effect::Finished(status)]
}
