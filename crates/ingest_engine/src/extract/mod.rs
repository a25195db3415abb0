//! Format detection and table extraction from fetched documents.
mod html;
mod pdf;

use std::sync::Arc;

use ingest_core::{normalize_table, CanonicalTable, RawTable};
use ingest_logging::{ingest_debug, ingest_info};

use crate::{ExtractionError, FetchedDocument};

pub use html::HtmlTableParser;
pub use pdf::{detect_text_tables, PdfTableParser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Html,
    Unknown,
}

impl DocumentFormat {
    pub fn label(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Html => "html",
            DocumentFormat::Unknown => "unknown",
        }
    }
}

/// Content type first, then the URL extension, then magic bytes.
pub fn detect_format(content_type: Option<&str>, url: &str, head: &[u8]) -> DocumentFormat {
    if let Some(ct) = content_type {
        let mime = ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase();
        match mime.as_str() {
            "application/pdf" | "application/x-pdf" => return DocumentFormat::Pdf,
            "text/html" | "application/xhtml+xml" => return DocumentFormat::Html,
            _ => {}
        }
    }

    let path = url::Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_else(|_| url.to_ascii_lowercase());
    if path.ends_with(".pdf") {
        return DocumentFormat::Pdf;
    }
    if path.ends_with(".html") || path.ends_with(".htm") {
        return DocumentFormat::Html;
    }

    if is_pdf_magic(head) {
        DocumentFormat::Pdf
    } else if is_html_magic(head) {
        DocumentFormat::Html
    } else {
        DocumentFormat::Unknown
    }
}

fn skip_preamble(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

fn is_pdf_magic(bytes: &[u8]) -> bool {
    skip_preamble(bytes).starts_with(b"%PDF")
}

fn is_html_magic(bytes: &[u8]) -> bool {
    let head = skip_preamble(bytes);
    let head = &head[..head.len().min(16)];
    let lower = head.to_ascii_lowercase();
    lower.starts_with(b"<!doctype html") || lower.starts_with(b"<html")
}

/// Parses one document format into raw tables. Runs on a blocking worker.
pub trait FormatParser: Send + Sync {
    fn format(&self) -> DocumentFormat;

    /// Fails only when `bytes` is not a readable instance of the format.
    fn parse(&self, bytes: &[u8]) -> Result<Vec<RawTable>, ExtractionError>;
}

/// Dispatches documents to format parsers and normalizes what they find.
#[derive(Clone)]
pub struct TableExtractor {
    parsers: Vec<Arc<dyn FormatParser>>,
}

impl TableExtractor {
    pub fn new() -> Self {
        Self {
            parsers: vec![Arc::new(PdfTableParser), Arc::new(HtmlTableParser)],
        }
    }

    /// An extractor that knows no formats; every document yields zero tables.
    pub fn empty() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Installs `parser`, replacing any parser for the same format.
    pub fn with_parser(mut self, parser: Arc<dyn FormatParser>) -> Self {
        self.parsers.retain(|p| p.format() != parser.format());
        self.parsers.push(parser);
        self
    }

    fn parser_for(&self, format: DocumentFormat) -> Option<Arc<dyn FormatParser>> {
        self.parsers.iter().find(|p| p.format() == format).cloned()
    }

    pub async fn extract_tables(
        &self,
        document: &FetchedDocument,
    ) -> Result<Vec<CanonicalTable>, ExtractionError> {
        let bytes = tokio::fs::read(&document.path)
            .await
            .map_err(|err| ExtractionError::new("local", err.to_string()))?;
        let format = detect_format(
            document.content_type.as_deref(),
            &document.final_url,
            &bytes[..bytes.len().min(1024)],
        );
        let Some(parser) = self.parser_for(format) else {
            ingest_debug!("No table parser for {} ({})", document.source_url, format.label());
            return Ok(Vec::new());
        };

        let raw_tables = tokio::task::spawn_blocking(move || parser.parse(&bytes))
            .await
            .map_err(|err| ExtractionError::new(format.label(), format!("parser crashed: {err}")))??;

        let found = raw_tables.len();
        let tables: Vec<CanonicalTable> = raw_tables
            .into_iter()
            .filter_map(|raw| normalize_table(raw).table)
            .collect();
        ingest_info!(
            "Extracted {} of {} tables from {}",
            tables.len(),
            found,
            document.source_url
        );
        Ok(tables)
    }
}

impl Default for TableExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_are_recognized_after_bom_and_whitespace() {
        assert!(is_pdf_magic(b"%PDF-1.4"));
        assert!(is_pdf_magic(b"\xEF\xBB\xBF  %PDF-1.7"));
        assert!(!is_pdf_magic(b"PK\x03\x04"));
        assert!(is_html_magic(b"\n<!DOCTYPE html><html>"));
        assert!(!is_html_magic(b"<?xml version"));
    }
}
