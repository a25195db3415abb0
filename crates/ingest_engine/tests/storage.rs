use std::sync::Arc;
use std::time::Duration;

use arrow::array::Array;
use bytes::Bytes;
use chrono::NaiveDate;
use ingest_core::{normalize_table, RawTable};
use ingest_engine::{
    HttpObjectStore, LocalObjectStore, MemoryObjectStore, ObjectStore, RetryPolicy, StorageError,
    StorageWriter, StoreToken,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use pretty_assertions::assert_eq;
use wiremock::matchers::{body_bytes, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        factor: 2.0,
    }
}

fn capture_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 22).unwrap()
}

fn sample_table() -> ingest_core::CanonicalTable {
    let raw = RawTable {
        header: vec!["UF".into(), "Valor".into(), "Total".into()],
        rows: vec![
            vec!["SP".into(), "10".into(), "1.234,5".into()],
            vec!["RJ".into(), "".into(), "7".into()],
        ],
    };
    normalize_table(raw).table.unwrap()
}

#[tokio::test]
async fn local_store_writes_nested_keys_and_overwrites() {
    let root = tempfile::tempdir().unwrap();
    let store = LocalObjectStore::new(root.path());
    let key = "staging/d/data_captura=20251122/a.pdf";

    store.put(key, Bytes::from_static(b"first")).await.unwrap();
    store.put(key, Bytes::from_static(b"second")).await.unwrap();

    let target = root
        .path()
        .join("staging/d/data_captura=20251122/a.pdf");
    assert_eq!(std::fs::read(&target).unwrap(), b"second");
    let siblings: Vec<_> = std::fs::read_dir(target.parent().unwrap())
        .unwrap()
        .collect();
    assert_eq!(siblings.len(), 1);
}

#[tokio::test]
async fn local_store_copies_files() {
    let root = tempfile::tempdir().unwrap();
    let store = LocalObjectStore::new(root.path());
    let source = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(source.path(), b"pdf bytes").unwrap();

    store.put_file("raw/x.pdf", source.path()).await.unwrap();
    assert_eq!(
        std::fs::read(root.path().join("raw").join("x.pdf")).unwrap(),
        b"pdf bytes"
    );
}

#[tokio::test]
async fn local_store_rejects_escaping_keys() {
    let root = tempfile::tempdir().unwrap();
    let store = LocalObjectStore::new(root.path());
    let err = store
        .put("../outside", Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidKey(_)));
}

#[tokio::test]
async fn http_store_puts_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/bucket/raw/d/metadata.json"))
        .and(header("authorization", "Bearer tok-123"))
        .and(body_bytes(b"{}".to_vec()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = HttpObjectStore::new(
        format!("{}/", server.uri()),
        "bucket",
        Some(StoreToken::new("tok-123")),
        Duration::from_secs(5),
    )
    .unwrap();
    store
        .put("raw/d/metadata.json", Bytes::from_static(b"{}"))
        .await
        .unwrap();
}

#[tokio::test]
async fn writer_retries_transient_store_errors() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let store = HttpObjectStore::new(server.uri(), "b", None, Duration::from_secs(5)).unwrap();
    let writer = StorageWriter::new(Arc::new(store), fast_retry());
    let key = writer
        .write_metadata("d", capture_date(), &serde_json::json!({"a": 1}))
        .await
        .unwrap();
    assert_eq!(key, "raw/d/data_captura=20251122/metadata.json");
}

#[tokio::test]
async fn writer_gives_up_on_rejected_writes() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let store = HttpObjectStore::new(server.uri(), "b", None, Duration::from_secs(5)).unwrap();
    let writer = StorageWriter::new(Arc::new(store), fast_retry());
    let err = writer
        .write_metadata("d", capture_date(), &serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Status { status: 403, .. }));
}

#[tokio::test]
async fn raw_tables_are_parquet_with_inferred_types() {
    let store = Arc::new(MemoryObjectStore::new());
    let writer = StorageWriter::new(store.clone(), fast_retry());

    let key = writer
        .write_raw(&sample_table(), "meu_dataset", capture_date(), "a.pdf", 0)
        .await
        .unwrap();
    assert_eq!(
        key,
        "raw/meu_dataset/data_captura=20251122/year=2025/month=11/a_0.parquet"
    );

    let bytes = store.get(&key).unwrap();
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)
        .unwrap()
        .build()
        .unwrap();
    let batches: Vec<_> = reader.map(|batch| batch.unwrap()).collect();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.num_rows(), 2);

    let schema = batch.schema();
    let types: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| format!("{}:{}", f.name(), f.data_type()))
        .collect();
    assert_eq!(types, vec!["UF:Utf8", "Valor:Int64", "Total:Float64"]);
    assert_eq!(batch.column(1).null_count(), 1);
}

#[tokio::test]
async fn identical_tables_serialize_identically() {
    let store = Arc::new(MemoryObjectStore::new());
    let writer = StorageWriter::new(store.clone(), fast_retry());
    let first = writer
        .write_raw(&sample_table(), "d", capture_date(), "a.pdf", 1)
        .await
        .unwrap();
    let bytes = store.get(&first).unwrap();
    writer
        .write_raw(&sample_table(), "d", capture_date(), "a.pdf", 1)
        .await
        .unwrap();
    assert_eq!(store.get(&first).unwrap(), bytes);
    assert_eq!(store.keys().len(), 1);
}

#[tokio::test]
async fn text_columns_keep_the_source_spelling_of_numbers() {
    let raw = RawTable {
        header: vec!["Valor".into()],
        rows: vec![
            vec!["1.234,56".into()],
            vec!["3.50".into()],
            vec!["+5".into()],
            vec!["n/d".into()],
        ],
    };
    let table = normalize_table(raw).table.unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let writer = StorageWriter::new(store.clone(), fast_retry());
    let key = writer
        .write_raw(&table, "d", capture_date(), "a.pdf", 0)
        .await
        .unwrap();

    let reader = ParquetRecordBatchReaderBuilder::try_new(store.get(&key).unwrap())
        .unwrap()
        .build()
        .unwrap();
    let batch = reader.map(|batch| batch.unwrap()).next().unwrap();
    let column = batch
        .column(0)
        .as_any()
        .downcast_ref::<arrow::array::StringArray>()
        .unwrap();
    let values: Vec<Option<&str>> = column.iter().collect();
    assert_eq!(
        values,
        vec![Some("1.234,56"), Some("3.50"), Some("+5"), Some("n/d")]
    );
}

#[test]
fn tokens_load_from_file_and_reject_empty_files() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("token");
    std::fs::write(&good, "  abc\n").unwrap();
    assert!(StoreToken::from_file(&good).is_ok());

    let empty = dir.path().join("empty");
    std::fs::write(&empty, "\n").unwrap();
    assert!(matches!(
        StoreToken::from_file(&empty),
        Err(StorageError::Credentials(_))
    ));
}
