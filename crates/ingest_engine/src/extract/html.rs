use ingest_core::RawTable;
use scraper::{ElementRef, Html};

use super::{DocumentFormat, FormatParser};
use crate::decode::decode_html;
use crate::ExtractionError;

/// One raw table per `<table>` element; the first row is the header.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlTableParser;

impl FormatParser for HtmlTableParser {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Html
    }

    fn parse(&self, bytes: &[u8]) -> Result<Vec<RawTable>, ExtractionError> {
        let decoded =
            decode_html(bytes, None).map_err(|err| ExtractionError::new("html", err.to_string()))?;
        Ok(parse_html_tables(&decoded.html))
    }
}

pub(crate) fn parse_html_tables(html: &str) -> Vec<RawTable> {
    let document = Html::parse_document(html);
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|element| element.value().name() == "table")
        .filter_map(|table| RawTable::from_rows(table_rows(table)))
        .collect()
}

/// Rows that belong to `table` itself, skipping rows of nested tables.
fn table_rows(table: ElementRef<'_>) -> Vec<Vec<String>> {
    table
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|element| element.value().name() == "tr")
        .filter(|row| owning_table(*row).map(|t| t.id()) == Some(table.id()))
        .map(|row| {
            row.children()
                .filter_map(ElementRef::wrap)
                .filter(|cell| matches!(cell.value().name(), "td" | "th"))
                .map(|cell| cell.text().collect::<String>())
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect()
}

fn owning_table(row: ElementRef<'_>) -> Option<ElementRef<'_>> {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() == "table")
}
