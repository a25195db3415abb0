//! Canonical tables and the normalization every extracted table goes through.
use std::collections::{HashMap, HashSet};

use ingest_logging::ingest_warn;
use serde::Serialize;

/// A scalar cell. Empty text is [`CellValue::Null`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Types a raw cell: trims it, then tries integer, decimal, and
    /// Brazilian-formatted decimal (`1.234,56`) before falling back to text.
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim();
        if text.is_empty() {
            return CellValue::Null;
        }
        if let Some(n) = parse_integer(text) {
            return CellValue::Integer(n);
        }
        if let Some(f) = parse_decimal(text).or_else(|| parse_br_decimal(text)) {
            return CellValue::Float(f);
        }
        CellValue::Text(text.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

/// A table as a format-specific parser found it: header plus untrimmed rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Splits off the first row as the header. `None` when there are no rows.
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        let header = rows.remove(0);
        Some(Self { header, rows })
    }
}

/// Ordered columns and fixed-width rows aligned to them.
///
/// Each typed cell keeps the trimmed text it was parsed from, so columns that
/// end up as text can be written exactly as the source had them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalTable {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    #[serde(skip)]
    source_text: Vec<Vec<String>>,
}

impl CanonicalTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cells of column `index`, top to bottom.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &CellValue> {
        self.rows.iter().map(move |row| &row[index])
    }

    /// Trimmed source text of column `index`, top to bottom. Padding cells are empty.
    pub fn column_text(&self, index: usize) -> impl Iterator<Item = &str> {
        self.source_text.iter().map(move |row| row[index].as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOutcome {
    pub table: Option<CanonicalTable>,
    pub padded_rows: usize,
    pub dropped_rows: usize,
}

/// Converts a raw table into a [`CanonicalTable`].
///
/// Short rows are right-padded with nulls, over-long rows are dropped with a
/// warning, blank rows are skipped. A table left without columns or rows
/// yields `None`.
pub fn normalize_table(raw: RawTable) -> NormalizeOutcome {
    let columns = normalize_header(&raw.header);
    let width = columns.len();
    let mut padded_rows = 0;
    let mut dropped_rows = 0;

    if width == 0 {
        return NormalizeOutcome {
            table: None,
            padded_rows,
            dropped_rows: raw.rows.len(),
        };
    }

    let mut rows = Vec::with_capacity(raw.rows.len());
    let mut source_text = Vec::with_capacity(raw.rows.len());
    for (line, row) in raw.rows.into_iter().enumerate() {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        if row.len() > width {
            ingest_warn!(
                "Dropping malformed row {} ({} cells, header has {})",
                line + 1,
                row.len(),
                width
            );
            dropped_rows += 1;
            continue;
        }
        let mut cells: Vec<CellValue> = row.iter().map(|cell| CellValue::parse(cell)).collect();
        let mut text: Vec<String> = row.iter().map(|cell| cell.trim().to_string()).collect();
        if cells.len() < width {
            padded_rows += 1;
            cells.resize(width, CellValue::Null);
            text.resize(width, String::new());
        }
        rows.push(cells);
        source_text.push(text);
    }

    let table = (!rows.is_empty()).then(|| CanonicalTable {
        columns,
        rows,
        source_text,
    });
    NormalizeOutcome {
        table,
        padded_rows,
        dropped_rows,
    }
}

fn normalize_header(header: &[String]) -> Vec<String> {
    let trimmed: Vec<String> = header.iter().map(|h| collapse_whitespace(h)).collect();
    if trimmed.iter().all(String::is_empty) {
        return Vec::new();
    }

    // Generated names are reserved too, so `a, a, a_2` cannot yield two `a_2`.
    let mut emitted: HashSet<String> = HashSet::new();
    let mut next_suffix: HashMap<String, usize> = HashMap::new();
    trimmed
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let base = if name.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                name
            };
            if emitted.insert(base.clone()) {
                return base;
            }
            let suffix = next_suffix.entry(base.clone()).or_insert(1);
            loop {
                *suffix += 1;
                let candidate = format!("{base}_{suffix}");
                if emitted.insert(candidate.clone()) {
                    return candidate;
                }
            }
        })
        .collect()
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_integer(text: &str) -> Option<i64> {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Zero-padded codes (postal codes, registry ids) stay text.
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    text.parse().ok()
}

fn parse_decimal(text: &str) -> Option<f64> {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    let (int_part, frac_part) = digits.split_once('.')?;
    if int_part.is_empty()
        || frac_part.is_empty()
        || !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    text.parse().ok()
}

fn parse_br_decimal(text: &str) -> Option<f64> {
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let (int_part, frac_part) = digits.split_once(',')?;
    if int_part.is_empty() || frac_part.is_empty() || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let groups: Vec<&str> = int_part.split('.').collect();
    let first_max = if groups.len() > 1 { 3 } else { usize::MAX };
    let first_ok = !groups[0].is_empty()
        && groups[0].len() <= first_max
        && groups[0].bytes().all(|b| b.is_ascii_digit());
    let rest_ok = groups[1..]
        .iter()
        .all(|g| g.len() == 3 && g.bytes().all(|b| b.is_ascii_digit()));
    if !first_ok || !rest_ok {
        return None;
    }
    format!("{sign}{}.{frac_part}", groups.concat()).parse().ok()
}
