use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Cap applied when the payload does not name `max_files`.
pub const DEFAULT_MAX_FILES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidJobError {
    #[error("missing required parameter: dataset_name")]
    MissingDatasetName,
    #[error("dataset_name {0:?} must be a single path segment")]
    InvalidDatasetName(String),
    #[error("missing required parameter: base_url")]
    MissingBaseUrl,
    #[error("base_url {url:?} is not a valid http(s) URL: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("max_files must be a positive integer, got {0}")]
    InvalidMaxFiles(i64),
    #[error("malformed job payload: {0}")]
    MalformedPayload(String),
}

/// Raw job payload as handed to the orchestrator.
///
/// Every key other than the named ones is a filter hint and is forwarded
/// verbatim to the selected site filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(default)]
    pub dataset_name: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub max_files: Option<i64>,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(flatten)]
    pub filter_params: BTreeMap<String, Value>,
}

impl JobPayload {
    pub fn from_json(value: Value) -> Result<Self, InvalidJobError> {
        serde_json::from_value(value).map_err(|e| InvalidJobError::MalformedPayload(e.to_string()))
    }
}

/// Opaque filter hints. Site filters read what they understand and ignore the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterParams(BTreeMap<String, Value>);

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Non-empty string value for `key`; numbers are rendered as text.
    pub fn get_str(&self, key: &str) -> Option<String> {
        let text = match self.0.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }

    /// A list of strings, accepting either a JSON array or a single string.
    pub fn get_str_list(&self, key: &str) -> Option<Vec<String>> {
        match self.0.get(key)? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            Value::String(s) if !s.trim().is_empty() => Some(vec![s.trim().to_string()]),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for FilterParams {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

/// Validated, immutable configuration for one ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobParameters {
    dataset_name: String,
    base_url: Url,
    max_files: usize,
    job_name: Option<String>,
    params: FilterParams,
}

impl JobParameters {
    pub fn new(dataset_name: &str, base_url: &str) -> Result<Self, InvalidJobError> {
        let dataset_name = validate_dataset_name(Some(dataset_name))?;
        let base_url = validate_base_url(Some(base_url))?;
        Ok(Self {
            dataset_name,
            base_url,
            max_files: DEFAULT_MAX_FILES,
            job_name: None,
            params: FilterParams::new(),
        })
    }

    pub fn from_payload(payload: JobPayload) -> Result<Self, InvalidJobError> {
        // dataset_name is checked first so a nameless job never gets further.
        let dataset_name = validate_dataset_name(payload.dataset_name.as_deref())?;
        let base_url = validate_base_url(payload.base_url.as_deref())?;
        let max_files = match payload.max_files {
            None => DEFAULT_MAX_FILES,
            Some(n) if n > 0 => n as usize,
            Some(n) => return Err(InvalidJobError::InvalidMaxFiles(n)),
        };
        Ok(Self {
            dataset_name,
            base_url,
            max_files,
            job_name: payload.job_name.filter(|n| !n.trim().is_empty()),
            params: FilterParams::from(payload.filter_params),
        })
    }

    pub fn from_json(value: Value) -> Result<Self, InvalidJobError> {
        Self::from_payload(JobPayload::from_json(value)?)
    }

    pub fn with_max_files(mut self, max_files: usize) -> Result<Self, InvalidJobError> {
        if max_files == 0 {
            return Err(InvalidJobError::InvalidMaxFiles(0));
        }
        self.max_files = max_files;
        Ok(self)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key, value);
        self
    }

    pub fn with_job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = Some(job_name.into());
        self
    }

    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    pub fn job_name(&self) -> Option<&str> {
        self.job_name.as_deref()
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    pub fn filename_contains(&self) -> Option<String> {
        self.params.get_str("filename_contains")
    }

    pub fn link_text_contains(&self) -> Option<String> {
        self.params.get_str("link_text_contains")
    }
}

fn validate_dataset_name(raw: Option<&str>) -> Result<String, InvalidJobError> {
    let name = raw.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(InvalidJobError::MissingDatasetName);
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(InvalidJobError::InvalidDatasetName(name.to_string()));
    }
    Ok(name.to_string())
}

fn validate_base_url(raw: Option<&str>) -> Result<Url, InvalidJobError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(InvalidJobError::MissingBaseUrl);
    }
    let url = Url::parse(raw).map_err(|e| InvalidJobError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(InvalidJobError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(url)
}
