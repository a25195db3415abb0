//! Configuration and wiring for the `ingest` command.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use ingest_core::JobStatus;
use ingest_engine::{
    EngineConfig, FetchSettings, HttpObjectStore, LocalObjectStore, MemoryObjectStore,
    ObjectStore, RetryPolicy, StoreToken, CREDENTIALS_ENV_VAR,
};
use ingest_logging::{ingest_info, ingest_warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Contents of the RON config file. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    /// Also log to this file when set.
    pub log_file: Option<PathBuf>,
    pub store: StoreConfig,
    pub engine: EngineSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
            store: StoreConfig::default(),
            engine: EngineSection::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_ron(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_ron(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = ron::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.engine.concurrency == 0 {
            bail!("engine.concurrency must be at least 1");
        }
        if self.engine.retry_attempts == 0 {
            bail!("engine.retry_attempts must be at least 1");
        }
        if let StoreConfig::Http { endpoint, bucket, .. } = &self.store {
            if endpoint.trim().is_empty() || bucket.trim().is_empty() {
                bail!("store endpoint and bucket must not be empty");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoreConfig {
    Local {
        root: PathBuf,
    },
    Http {
        endpoint: String,
        bucket: String,
        #[serde(default = "default_store_timeout_secs")]
        timeout_secs: u64,
    },
    /// Keeps objects in memory; nothing outlives the process.
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Local {
            root: PathBuf::from("./data"),
        }
    }
}

fn default_store_timeout_secs() -> u64 {
    120
}

/// Engine tuning as it appears in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub concurrency: usize,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub redirect_limit: usize,
    pub max_document_bytes: u64,
    pub max_page_bytes: u64,
    pub retry_attempts: usize,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_factor: f32,
    pub job_timeout_secs: Option<u64>,
    pub scratch_root: Option<PathBuf>,
}

impl Default for EngineSection {
    fn default() -> Self {
        let fetch = FetchSettings::default();
        let retry = RetryPolicy::default();
        let engine = EngineConfig::default();
        Self {
            concurrency: engine.concurrency,
            connect_timeout_secs: fetch.connect_timeout.as_secs(),
            request_timeout_secs: fetch.request_timeout.as_secs(),
            redirect_limit: fetch.redirect_limit,
            max_document_bytes: fetch.max_document_bytes,
            max_page_bytes: fetch.max_page_bytes,
            retry_attempts: retry.max_attempts,
            retry_initial_delay_ms: retry.initial_delay.as_millis() as u64,
            retry_max_delay_ms: retry.max_delay.as_millis() as u64,
            retry_factor: retry.factor,
            job_timeout_secs: None,
            scratch_root: None,
        }
    }
}

impl EngineSection {
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            fetch: FetchSettings {
                connect_timeout: Duration::from_secs(self.connect_timeout_secs),
                request_timeout: Duration::from_secs(self.request_timeout_secs),
                redirect_limit: self.redirect_limit,
                max_document_bytes: self.max_document_bytes,
                max_page_bytes: self.max_page_bytes,
                ..FetchSettings::default()
            },
            retry: RetryPolicy {
                max_attempts: self.retry_attempts,
                initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
                max_delay: Duration::from_millis(self.retry_max_delay_ms),
                factor: self.retry_factor,
            },
            concurrency: self.concurrency,
            job_timeout: self.job_timeout_secs.map(Duration::from_secs),
            scratch_root: self.scratch_root.clone(),
            ..EngineConfig::default()
        }
    }
}

/// Builds the configured object store. `token` is only used by the HTTP store.
pub fn build_store(
    config: &StoreConfig,
    token: Option<StoreToken>,
) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match config {
        StoreConfig::Local { root } => Arc::new(LocalObjectStore::new(root.clone())),
        StoreConfig::Http {
            endpoint,
            bucket,
            timeout_secs,
        } => {
            if token.is_none() {
                ingest_warn!(
                    "{} is not set; writing to {} without credentials",
                    CREDENTIALS_ENV_VAR,
                    endpoint
                );
            }
            Arc::new(
                HttpObjectStore::new(
                    endpoint.clone(),
                    bucket.clone(),
                    token,
                    Duration::from_secs(*timeout_secs),
                )
                .context("building HTTP object store")?,
            )
        }
        StoreConfig::Memory => Arc::new(MemoryObjectStore::new()),
    };
    ingest_info!("Writing objects to {}", store.describe());
    Ok(store)
}

/// Job payload from command-line flags. Extra `key=value` hints are forwarded as strings.
pub fn payload_from_flags(
    dataset_name: Option<&str>,
    base_url: Option<&str>,
    max_files: Option<i64>,
    hints: &[String],
) -> anyhow::Result<Value> {
    let mut payload = Map::new();
    if let Some(name) = dataset_name {
        payload.insert("dataset_name".into(), Value::from(name));
    }
    if let Some(url) = base_url {
        payload.insert("base_url".into(), Value::from(url));
    }
    if let Some(max) = max_files {
        payload.insert("max_files".into(), Value::from(max));
    }
    for hint in hints {
        let Some((key, value)) = hint.split_once('=') else {
            bail!("filter hint {hint:?} must look like key=value");
        };
        payload.insert(key.trim().to_string(), Value::from(value.trim()));
    }
    Ok(Value::Object(payload))
}

/// Reads a JSON job payload from `path`, or from stdin when `path` is `-`.
pub fn load_payload(path: &Path) -> anyhow::Result<Value> {
    let content = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("reading payload from stdin")?
    } else {
        fs::read_to_string(path).with_context(|| format!("reading payload {}", path.display()))?
    };
    serde_json::from_str(&content).context("payload is not valid JSON")
}

/// Process exit code for a finished job.
pub fn exit_code(status: JobStatus) -> u8 {
    match status {
        JobStatus::Completed => 0,
        JobStatus::PartiallyFailed => 2,
        JobStatus::Failed => 1,
    }
}
