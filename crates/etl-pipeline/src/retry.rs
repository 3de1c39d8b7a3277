//! Retry with bounded exponential backoff.
//!
//! Pauses grow as `start * factor^n` and are capped at `border`. Retries go
//! on forever unless an attempt limit is set. Every retry is logged, and an
//! optional observer sees the attempt number, the pause and the error.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff as _;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use etl_types::RetrySettings;
use tracing::{error, warn};

/// Classifies errors the retry loop may retry.
pub trait Retryable {
    /// True if the same call may succeed when repeated later.
    fn is_transient(&self) -> bool;
}

/// What an observer is told before each pause.
#[derive(Debug, Clone)]
pub struct RetryNotice {
    pub operation: String,
    /// Failed attempts so far, starting at 1
    pub attempt: u32,
    pub delay: Duration,
    pub error: String,
}

pub type RetryObserver = Arc<dyn Fn(&RetryNotice) + Send + Sync>;

#[derive(Clone)]
pub struct RetryPolicy {
    start: Duration,
    factor: f64,
    border: Duration,
    max_attempts: Option<u32>,
    observer: Option<RetryObserver>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("start", &self.start)
            .field("factor", &self.factor)
            .field("border", &self.border)
            .field("max_attempts", &self.max_attempts)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), 2.0, Duration::from_secs(30))
    }
}

impl RetryPolicy {
    pub fn new(start: Duration, factor: f64, border: Duration) -> Self {
        Self {
            start,
            factor,
            border,
            max_attempts: None,
            observer: None,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        let policy = Self::new(settings.start(), settings.factor, settings.border());
        match settings.max_attempts {
            Some(max) => policy.with_max_attempts(max),
            None => policy,
        }
    }

    /// Give up once `max` calls have failed.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    pub fn with_observer(mut self, observer: impl Fn(&RetryNotice) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Fresh backoff state for one logical operation.
    pub fn backoff(&self, operation: &str) -> Backoff {
        let inner = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.start)
            .with_multiplier(self.factor)
            .with_max_interval(self.border)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build();
        Backoff {
            operation: operation.to_string(),
            inner,
            border: self.border,
            max_attempts: self.max_attempts,
            observer: self.observer.clone(),
            attempts: 0,
        }
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt limit is reached.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display + Send + Sync,
    {
        let mut backoff = self.backoff(operation);
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    if !backoff.pause(&e).await {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Backoff state for callers that drive their own retry loop.
pub struct Backoff {
    operation: String,
    inner: ExponentialBackoff,
    border: Duration,
    max_attempts: Option<u32>,
    observer: Option<RetryObserver>,
    attempts: u32,
}

impl Backoff {
    /// Failed attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a failed attempt and sleep before the next one.
    ///
    /// Returns `false` without sleeping when the attempt limit is reached.
    pub async fn pause(&mut self, err: &(dyn fmt::Display + Sync)) -> bool {
        self.attempts += 1;

        if let Some(max) = self.max_attempts {
            if self.attempts >= max {
                error!(
                    operation = %self.operation,
                    attempts = self.attempts,
                    error = %err,
                    "Retry attempts exhausted"
                );
                return false;
            }
        }

        let delay = self
            .inner
            .next_backoff()
            .unwrap_or(self.border)
            .min(self.border);

        warn!(
            operation = %self.operation,
            attempt = self.attempts,
            retry_in_ms = delay.as_millis() as u64,
            error = %err,
            "Operation failed, retrying"
        );

        if let Some(observer) = &self.observer {
            observer(&RetryNotice {
                operation: self.operation.clone(),
                attempt: self.attempts,
                delay,
                error: err.to_string(),
            });
        }

        tokio::time::sleep(delay).await;
        true
    }

    /// Forget earlier failures after a success.
    pub fn reset(&mut self) {
        self.inner.reset();
        self.attempts = 0;
    }
}
