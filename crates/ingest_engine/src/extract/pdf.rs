use ingest_core::RawTable;

use super::{DocumentFormat, FormatParser};
use crate::ExtractionError;

/// Finds tables in the text layer of a PDF.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTableParser;

impl FormatParser for PdfTableParser {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn parse(&self, bytes: &[u8]) -> Result<Vec<RawTable>, ExtractionError> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|err| ExtractionError::new("pdf", err.to_string()))?;
        Ok(detect_text_tables(&text))
    }
}

/// Stream-mode table detection over laid-out text.
///
/// Cells are separated by a tab or by two or more spaces. Consecutive lines
/// with at least two cells form a block; blocks of two or more lines are
/// tables whose first line is the header.
pub fn detect_text_tables(text: &str) -> Vec<RawTable> {
    let mut tables = Vec::new();
    let mut block: Vec<Vec<String>> = Vec::new();

    for line in text.lines() {
        let cells = split_cells(line);
        if cells.len() >= 2 {
            block.push(cells);
            continue;
        }
        flush_block(&mut block, &mut tables);
    }
    flush_block(&mut block, &mut tables);
    tables
}

fn flush_block(block: &mut Vec<Vec<String>>, tables: &mut Vec<RawTable>) {
    let rows = std::mem::take(block);
    if rows.len() < 2 {
        return;
    }
    if let Some(table) = RawTable::from_rows(rows) {
        tables.push(table);
    }
}

fn split_cells(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut spaces = 0;

    for c in line.trim().chars() {
        match c {
            '\t' => {
                push_cell(&mut current, &mut cells);
                spaces = 0;
            }
            ' ' => spaces += 1,
            _ => {
                if spaces >= 2 {
                    push_cell(&mut current, &mut cells);
                } else if spaces == 1 && !current.is_empty() {
                    current.push(' ');
                }
                spaces = 0;
                current.push(c);
            }
        }
    }
    push_cell(&mut current, &mut cells);
    cells
}

fn push_cell(current: &mut String, cells: &mut Vec<String>) {
    if !current.is_empty() {
        cells.push(std::mem::take(current));
    }
}
