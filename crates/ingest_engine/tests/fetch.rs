use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ingest_engine::{
    with_retry, FailureKind, FetchSettings, Fetcher, ReqwestFetcher, RetryPolicy, Transient,
};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn scratch_is_empty(dir: &tempfile::TempDir) -> bool {
    std::fs::read_dir(dir.path()).unwrap().next().is_none()
}

#[tokio::test]
async fn page_fetch_returns_body_and_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lista"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let url = format!("{}/lista", server.uri());

    let output = fetcher.fetch_page(&url).await.expect("fetch ok");
    assert_eq!(output.metadata.original_url, url);
    assert_eq!(output.metadata.final_url, output.metadata.original_url);
    assert_eq!(output.metadata.redirect_count, 0);
    assert!(output
        .metadata
        .content_type
        .unwrap()
        .starts_with("text/html"));
    assert_eq!(output.bytes, b"<html>ok</html>");
}

#[tokio::test]
async fn http_errors_carry_status_and_transience() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());

    let err = fetcher
        .fetch_page(&format!("{}/missing", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(404));
    assert!(!err.is_transient());

    let err = fetcher
        .fetch_page(&format!("{}/busy", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(503));
    assert!(err.is_transient());
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(250))
                .set_body_string("slow"),
        )
        .mount(&server)
        .await;

    let settings = FetchSettings {
        request_timeout: Duration::from_millis(50),
        ..FetchSettings::default()
    };
    let fetcher = ReqwestFetcher::new(settings);

    let err = fetcher
        .fetch_page(&format!("{}/slow", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
    assert!(err.is_transient());
}

#[tokio::test]
async fn invalid_urls_are_rejected_without_request() {
    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let err = fetcher.fetch_page("not a url").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::InvalidUrl);
}

#[tokio::test]
async fn documents_stream_to_scratch_with_checksum() {
    let server = MockServer::start().await;
    let body = b"%PDF-1.4 fake document body".to_vec();
    Mock::given(method("GET"))
        .and(path("/a.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.clone(), "application/pdf"))
        .mount(&server)
        .await;

    let scratch = tempfile::tempdir().unwrap();
    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let url = format!("{}/a.pdf", server.uri());

    let document = fetcher.fetch_document(&url, scratch.path()).await.unwrap();
    assert_eq!(document.source_url, url);
    assert_eq!(document.byte_size, body.len() as u64);
    assert_eq!(document.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(document.checksum, format!("{:x}", Sha256::digest(&body)));
    assert!(document.path.starts_with(scratch.path()));
    assert_eq!(std::fs::read(&document.path).unwrap(), body);

    drop(document);
    assert!(scratch_is_empty(&scratch));
}

#[tokio::test]
async fn oversized_documents_fail_and_leave_nothing_behind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/large.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/pdf")
                .set_body_string("01234567890"),
        )
        .mount(&server)
        .await;

    let settings = FetchSettings {
        max_document_bytes: 10,
        ..FetchSettings::default()
    };
    let fetcher = ReqwestFetcher::new(settings);
    let scratch = tempfile::tempdir().unwrap();

    let err = fetcher
        .fetch_document(&format!("{}/large.pdf", server.uri()), scratch.path())
        .await
        .unwrap_err();
    assert_eq!(
        err.kind,
        FailureKind::TooLarge {
            max_bytes: 10,
            actual: Some(11)
        }
    );
    assert!(!err.is_transient());
    assert!(scratch_is_empty(&scratch));
}

/// Answers every connection with a chunked body and no `Content-Length`.
async fn serve_chunked(body: &'static [u8], chunk_size: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;

            let mut response = b"HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\n\
                Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
                .to_vec();
            for part in body.chunks(chunk_size) {
                response.extend_from_slice(format!("{:x}\r\n", part.len()).as_bytes());
                response.extend_from_slice(part);
                response.extend_from_slice(b"\r\n");
            }
            response.extend_from_slice(b"0\r\n\r\n");
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        }
    });
    (format!("http://{addr}/stream.pdf"), requests)
}

#[tokio::test]
async fn streams_without_length_stop_at_the_size_limit() {
    const BODY: &[u8] = &[b'x'; 64];
    let (url, requests) = serve_chunked(BODY, 16).await;
    let fetcher = ReqwestFetcher::new(FetchSettings {
        max_document_bytes: 40,
        ..FetchSettings::default()
    });
    let scratch = tempfile::tempdir().unwrap();
    let policy = RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        factor: 2.0,
    };

    let err = with_retry(&policy, "document fetch", || {
        fetcher.fetch_document(&url, scratch.path())
    })
    .await
    .unwrap_err();

    match err.kind {
        FailureKind::TooLarge {
            max_bytes,
            actual: Some(actual),
        } => {
            assert_eq!(max_bytes, 40);
            assert!(actual > 40 && actual <= BODY.len() as u64);
        }
        other => panic!("expected a size-limit failure, got {other:?}"),
    }
    assert_eq!(requests.load(Ordering::SeqCst), 1);
    assert!(scratch_is_empty(&scratch));
}

#[tokio::test]
async fn redirects_beyond_the_limit_fail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", format!("{}/loop", server.uri())),
        )
        .mount(&server)
        .await;

    let settings = FetchSettings {
        redirect_limit: 2,
        ..FetchSettings::default()
    };
    let fetcher = ReqwestFetcher::new(settings);
    let err = fetcher
        .fetch_page(&format!("{}/loop", server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::RedirectLimitExceeded);
}
