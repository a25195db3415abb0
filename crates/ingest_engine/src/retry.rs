use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use ingest_logging::ingest_warn;

/// Errors that say whether trying again could help.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Exponential backoff applied to every network operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_max_times(self.max_attempts.saturating_sub(1))
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
    }
}

/// Runs `operation`, retrying transient failures with the policy's backoff.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    operation
        .retry(policy.backoff())
        .when(|err: &E| err.is_transient())
        .notify(|err: &E, delay: Duration| {
            ingest_warn!("{label} failed, retrying in {:?}: {}", delay, err);
        })
        .await
}
