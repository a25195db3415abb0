use std::collections::HashSet;

use crate::{JobParameters, LinkRecord};

/// Turns a site filter's output into the job's download list.
///
/// Optional `filename_contains` / `link_text_contains` hints narrow the list
/// (a URL survives when either hint matches); when the hints match nothing the
/// filter output is kept as is. Duplicates are removed preserving first
/// occurrence, then the list is capped at `max_files`.
pub fn select_documents(
    links: &[LinkRecord],
    filtered: Vec<String>,
    params: &JobParameters,
) -> Vec<String> {
    let narrowed = apply_hints(
        links,
        filtered,
        params.filename_contains().map(|h| h.to_lowercase()),
        params.link_text_contains().map(|h| h.to_lowercase()),
    );

    let mut seen = HashSet::new();
    narrowed
        .into_iter()
        .filter(|url| seen.insert(url.clone()))
        .take(params.max_files())
        .collect()
}

fn apply_hints(
    links: &[LinkRecord],
    selected: Vec<String>,
    filename_hint: Option<String>,
    text_hint: Option<String>,
) -> Vec<String> {
    if (filename_hint.is_none() && text_hint.is_none()) || selected.is_empty() {
        return selected;
    }

    let matches = |url: &String| {
        if let Some(hint) = filename_hint.as_deref() {
            if url.to_lowercase().contains(hint) {
                return true;
            }
        }
        if let Some(hint) = text_hint.as_deref() {
            let text = links
                .iter()
                .find(|link| &link.url == url)
                .map(|link| link.anchor_text.to_lowercase())
                .unwrap_or_default();
            if text.contains(hint) {
                return true;
            }
        }
        false
    };

    let narrowed: Vec<String> = selected.iter().filter(|url| matches(url)).cloned().collect();
    if narrowed.is_empty() {
        selected
    } else {
        narrowed
    }
}
