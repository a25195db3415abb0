use std::path::Path;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use futures_util::StreamExt;
use ingest_logging::ingest_debug;
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::{FailureKind, FetchError, FetchMetadata, FetchOutput, FetchedDocument};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    /// Cap on a streamed document body.
    pub max_document_bytes: u64,
    /// Cap on a listing page, which is held in memory.
    pub max_page_bytes: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            redirect_limit: 5,
            max_document_bytes: 100 * 1024 * 1024,
            max_page_bytes: 5 * 1024 * 1024,
            user_agent: concat!("ingest/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches a listing page into memory.
    async fn fetch_page(&self, url: &str) -> Result<FetchOutput, FetchError>;

    /// Streams a document into a new file under `temp_dir`.
    async fn fetch_document(&self, url: &str, temp_dir: &Path)
        -> Result<FetchedDocument, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    fn build_client(&self, redirect_counter: Arc<AtomicUsize>) -> Result<reqwest::Client, FetchError> {
        let redirect_limit = self.settings.redirect_limit;
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            let count = attempt.previous().len();
            redirect_counter.store(count, Ordering::Relaxed);
            if count >= redirect_limit {
                attempt.error("redirect limit exceeded")
            } else {
                attempt.follow()
            }
        });

        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .user_agent(self.settings.user_agent.as_str())
            .redirect(policy)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))
    }

    /// Sends the GET and checks status and declared length.
    async fn open(
        &self,
        url: &str,
        max_bytes: u64,
    ) -> Result<(reqwest::Response, Arc<AtomicUsize>), FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let redirect_counter = Arc::new(AtomicUsize::new(0));
        let client = self.build_client(redirect_counter.clone())?;

        let response = client.get(parsed).send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                format!("{url} returned {status}"),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(too_large(max_bytes, Some(content_len)));
            }
        }

        Ok((response, redirect_counter))
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch_page(&self, url: &str) -> Result<FetchOutput, FetchError> {
        let max_bytes = self.settings.max_page_bytes;
        let (response, redirect_counter) = self.open(url, max_bytes).await?;
        let final_url = response.url().to_string();
        let content_type = content_type(&response);

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(too_large(max_bytes, Some(next_len)));
            }
            bytes.extend_from_slice(&chunk);
        }

        let metadata = FetchMetadata {
            original_url: url.to_string(),
            final_url,
            redirect_count: redirect_counter.load(Ordering::Relaxed),
            content_type,
            byte_len: bytes.len() as u64,
        };
        Ok(FetchOutput { bytes, metadata })
    }

    async fn fetch_document(
        &self,
        url: &str,
        temp_dir: &Path,
    ) -> Result<FetchedDocument, FetchError> {
        let max_bytes = self.settings.max_document_bytes;
        let (response, _) = self.open(url, max_bytes).await?;
        let final_url = response.url().to_string();
        let content_type = content_type(&response);

        // The temp path owns the file from here on; any early return deletes it.
        let (file, path) = NamedTempFile::new_in(temp_dir)
            .map_err(io_error)?
            .into_parts();
        let mut file = tokio::fs::File::from_std(file);
        let mut hasher = Sha256::new();
        let mut byte_size: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            byte_size += chunk.len() as u64;
            if byte_size > max_bytes {
                return Err(too_large(max_bytes, Some(byte_size)));
            }
            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(io_error)?;
        }
        file.flush().await.map_err(io_error)?;
        drop(file);

        ingest_debug!("Fetched {} ({} bytes) to {:?}", url, byte_size, &*path);
        Ok(FetchedDocument {
            source_url: url.to_string(),
            final_url,
            path,
            byte_size,
            content_type,
            checksum: format!("{:x}", hasher.finalize()),
        })
    }
}

fn content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

fn too_large(max_bytes: u64, actual: Option<u64>) -> FetchError {
    FetchError::new(
        FailureKind::TooLarge { max_bytes, actual },
        "response exceeds the size limit",
    )
}

fn io_error(err: std::io::Error) -> FetchError {
    FetchError::new(FailureKind::Io, err.to_string())
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
