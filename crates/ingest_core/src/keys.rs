//! Deterministic object-storage keys.
//!
//! Staging: `staging/<dataset>/data_captura=<YYYYMMDD>/<source-name>`
//! Raw:     `raw/<dataset>/data_captura=<YYYYMMDD>/year=<YYYY>/month=<MM>/<stem>_<index>.<ext>`
use std::collections::HashSet;

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::links::url_filename;

const MAX_NAME_LEN: usize = 120;

pub fn capture_partition(capture_date: NaiveDate) -> String {
    format!("data_captura={}", capture_date.format("%Y%m%d"))
}

pub fn staging_key(dataset_name: &str, capture_date: NaiveDate, source_name: &str) -> String {
    format!(
        "staging/{dataset_name}/{}/{source_name}",
        capture_partition(capture_date)
    )
}

pub fn raw_table_key(
    dataset_name: &str,
    capture_date: NaiveDate,
    source_name: &str,
    table_index: usize,
    extension: &str,
) -> String {
    format!(
        "raw/{dataset_name}/{}/year={}/month={}/{}_{table_index}.{extension}",
        capture_partition(capture_date),
        capture_date.format("%Y"),
        capture_date.format("%m"),
        source_stem(source_name),
    )
}

/// Key of the per-job metadata object.
pub fn metadata_key(dataset_name: &str, capture_date: NaiveDate) -> String {
    format!(
        "raw/{dataset_name}/{}/metadata.json",
        capture_partition(capture_date)
    )
}

/// Object name derived from a document URL: its sanitized last path segment,
/// or `download-<hash>` when the URL has none.
pub fn source_name(url: &str) -> String {
    match url_filename(url).map(|name| sanitize_name(&name)) {
        Some(name) if !name.is_empty() => name,
        _ => format!("download-{}", short_hash(url)),
    }
}

/// Source names for a job's documents, unique within the job.
///
/// The first URL to claim a name keeps it; later URLs with the same filename
/// get `<stem>--<hash>.<ext>` so they do not overwrite each other.
pub fn assign_source_names(urls: &[String]) -> Vec<String> {
    let mut taken = HashSet::new();
    urls.iter()
        .map(|url| {
            let name = source_name(url);
            if taken.insert(name.clone()) {
                return name;
            }
            let disambiguated = match name.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() => {
                    format!("{stem}--{}.{ext}", short_hash(url))
                }
                _ => format!("{name}--{}", short_hash(url)),
            };
            taken.insert(disambiguated.clone());
            disambiguated
        })
        .collect()
}

/// Name without its final extension.
pub fn source_stem(source_name: &str) -> &str {
    match source_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => source_name,
    }
}

/// First four bytes of the SHA-256 of `input`, as hex.
pub fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

fn sanitize_name(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]);

    // Collapse runs of underscores.
    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.chars() {
        if c == '_' {
            if !prev_underscore {
                compacted.push(c);
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }

    if compacted.len() > MAX_NAME_LEN {
        let mut end = MAX_NAME_LEN;
        while !compacted.is_char_boundary(end) {
            end -= 1;
        }
        compacted.truncate(end);
    }
    compacted
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' | '\0'..='\u{1F}'
    )
}
