use std::fmt;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use ingest_logging::ingest_debug;

use super::{validate_key, ObjectStore};
use crate::StorageError;

/// Environment variable naming the file that holds the store's bearer token.
pub const CREDENTIALS_ENV_VAR: &str = "INGEST_CREDENTIALS_PATH";

/// Bearer token for the HTTP object store. `Debug` never prints it.
#[derive(Clone)]
pub struct StoreToken(String);

impl StoreToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Reads the token from `path`, trimming surrounding whitespace.
    pub fn from_file(path: &Path) -> Result<Self, StorageError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            StorageError::Credentials(format!("cannot read {}: {err}", path.display()))
        })?;
        let token = raw.trim();
        if token.is_empty() {
            return Err(StorageError::Credentials(format!(
                "{} is empty",
                path.display()
            )));
        }
        Ok(Self(token.to_string()))
    }

    /// Token from the file named by [`CREDENTIALS_ENV_VAR`], if the variable is set.
    pub fn from_env() -> Result<Option<Self>, StorageError> {
        match std::env::var_os(CREDENTIALS_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::from_file(Path::new(&path)).map(Some),
            _ => Ok(None),
        }
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StoreToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoreToken(<redacted>)")
    }
}

/// Writes each object with a single `PUT {endpoint}/{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    token: Option<StoreToken>,
}

impl HttpObjectStore {
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        token: Option<StoreToken>,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| StorageError::Network {
                key: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into().trim_matches('/').to_string(),
            token,
        })
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }
}

#[async_trait::async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, key: &str, body: Bytes) -> Result<(), StorageError> {
        validate_key(key)?;
        let len = body.len();
        let mut request = self.client.put(self.object_url(key)).body(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose());
        }

        let response = request.send().await.map_err(|err| StorageError::Network {
            key: key.to_string(),
            message: err.to_string(),
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Status {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }
        ingest_debug!("PUT {} ({} bytes) -> {}", key, len, status);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.endpoint, self.bucket)
    }
}
