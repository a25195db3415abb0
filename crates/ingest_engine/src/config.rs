use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};

use crate::fetch::FetchSettings;
use crate::retry::RetryPolicy;

/// Source of the capture date that partitions a job's keys.
#[derive(Clone)]
pub struct CaptureClock(Arc<dyn Fn() -> NaiveDate + Send + Sync>);

impl CaptureClock {
    pub fn utc_today() -> Self {
        Self(Arc::new(|| Utc::now().date_naive()))
    }

    /// Always reports `date`. Reruns against a fixed date write the same keys.
    pub fn fixed(date: NaiveDate) -> Self {
        Self(Arc::new(move || date))
    }

    pub fn today(&self) -> NaiveDate {
        (self.0)()
    }
}

impl Default for CaptureClock {
    fn default() -> Self {
        Self::utc_today()
    }
}

impl fmt::Debug for CaptureClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CaptureClock({})", self.today())
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub fetch: FetchSettings,
    pub retry: RetryPolicy,
    /// Documents processed at the same time within one job.
    pub concurrency: usize,
    pub job_timeout: Option<Duration>,
    /// Parent of each job's scratch directory; the system temp dir when unset.
    pub scratch_root: Option<PathBuf>,
    pub capture_clock: CaptureClock,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchSettings::default(),
            retry: RetryPolicy::default(),
            concurrency: 4,
            job_timeout: None,
            scratch_root: None,
            capture_clock: CaptureClock::default(),
        }
    }
}
