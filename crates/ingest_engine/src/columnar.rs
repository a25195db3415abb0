//! Parquet serialization of canonical tables.
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use ingest_core::{CanonicalTable, CellValue};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;

pub const PARQUET_EXTENSION: &str = "parquet";

#[derive(Debug, thiserror::Error)]
pub enum ColumnarError {
    #[error("cannot build record batch: {0}")]
    Arrow(#[from] ArrowError),
    #[error("cannot write parquet: {0}")]
    Parquet(#[from] ParquetError),
}

/// Narrowest Arrow type that holds every non-null cell of a column.
pub fn infer_column_type<'a>(cells: impl Iterator<Item = &'a CellValue>) -> DataType {
    let mut data_type = DataType::Int64;
    for cell in cells {
        match cell {
            CellValue::Null | CellValue::Integer(_) => {}
            CellValue::Float(_) => data_type = DataType::Float64,
            CellValue::Text(_) => return DataType::Utf8,
        }
    }
    data_type
}

fn build_column(table: &CanonicalTable, index: usize, data_type: &DataType) -> ArrayRef {
    match data_type {
        DataType::Int64 => Arc::new(Int64Array::from(
            table
                .column(index)
                .map(|cell| match cell {
                    CellValue::Integer(n) => Some(*n),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            table
                .column(index)
                .map(|cell| match cell {
                    CellValue::Integer(n) => Some(*n as f64),
                    CellValue::Float(f) => Some(*f),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        // Text columns carry the source text, not a re-rendering of parsed numbers.
        _ => Arc::new(StringArray::from(
            table
                .column(index)
                .zip(table.column_text(index))
                .map(|(cell, text)| (!cell.is_null()).then(|| text.to_string()))
                .collect::<Vec<_>>(),
        )),
    }
}

/// Serializes `table` as a single-row-group Snappy Parquet file.
///
/// Identical tables produce identical bytes.
pub fn table_to_parquet(table: &CanonicalTable) -> Result<Vec<u8>, ColumnarError> {
    let mut fields = Vec::with_capacity(table.width());
    let mut columns = Vec::with_capacity(table.width());
    for (index, name) in table.columns().iter().enumerate() {
        let data_type = infer_column_type(table.column(index));
        columns.push(build_column(table, index, &data_type));
        fields.push(Field::new(name, data_type, true));
    }
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(buffer)
}
