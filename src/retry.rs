//! Bounded retry with jittered delay.
//!
//! [`RetryState`] holds the decision logic without any I/O or timers;
//! [`with_retry`] drives it with `tokio::time::sleep`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::Error;

type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Per-call query options.
///
/// ```
/// use std::time::Duration;
/// use wisp_mysql::QueryOptions;
///
/// let options = QueryOptions::new()
///     .retry_on(|e| e.sql_code() == Some(1213))
///     .max_retries(3)
///     .retry_delay(Duration::from_millis(10), Duration::from_millis(50));
/// assert_eq!(options.get_max_retries(), 3);
/// ```
#[derive(Clone)]
pub struct QueryOptions {
    retry_on: RetryPredicate,
    max_retries: u32,
    min_retry_delay: Duration,
    max_retry_delay: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            retry_on: Arc::new(|_| false),
            max_retries: 0,
            min_retry_delay: Duration::ZERO,
            max_retry_delay: Duration::from_millis(100),
        }
    }
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("max_retries", &self.max_retries)
            .field("min_retry_delay", &self.min_retry_delay)
            .field("max_retry_delay", &self.max_retry_delay)
            .finish_non_exhaustive()
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Predicate deciding whether a failed attempt may be retried.
    ///
    /// Default: never retry.
    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.retry_on = Arc::new(predicate);
        self
    }

    /// Number of retries after the first attempt.
    ///
    /// Default: `0`
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Bounds of the uniformly distributed delay between attempts.
    ///
    /// Default: `0ms..=100ms`
    pub fn retry_delay(mut self, min: Duration, max: Duration) -> Self {
        self.min_retry_delay = min;
        self.max_retry_delay = max;
        self
    }

    pub fn get_max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn get_retry_delay(&self) -> (Duration, Duration) {
        (self.min_retry_delay, self.max_retry_delay)
    }

    fn should_retry(&self, error: &Error) -> bool {
        (self.retry_on)(error)
    }

    /// Pick a delay uniformly from the configured bounds.
    ///
    /// An inverted range collapses to the minimum.
    pub fn random_delay(&self) -> Duration {
        let min = self.min_retry_delay;
        let max = self.max_retry_delay;
        if max <= min {
            return min;
        }
        let micros = rand::rng().random_range(min.as_micros()..=max.as_micros());
        Duration::from_micros(u64::try_from(micros).unwrap_or(u64::MAX))
    }
}

/// What to do after a failed attempt.
#[derive(Debug)]
pub enum RetryDecision {
    /// Sleep for the delay, then run the next attempt.
    Retry(Duration),
    /// Give up with this error.
    Fail(Error),
}

/// Sans-I/O retry bookkeeping for one logical call.
#[derive(Debug)]
pub struct RetryState<'a> {
    options: &'a QueryOptions,
    attempt: u32,
    errors: Vec<Error>,
}

impl<'a> RetryState<'a> {
    pub fn new(options: &'a QueryOptions) -> Self {
        Self {
            options,
            attempt: 0,
            errors: Vec::new(),
        }
    }

    /// Zero-based index of the attempt in progress.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a failed attempt and decide whether to try again.
    ///
    /// With `max_retries == 0` the error is returned untouched. Once the
    /// budget is spent the result is [`Error::MaxRetries`] carrying every
    /// error seen, oldest first.
    pub fn on_error(&mut self, error: Error) -> RetryDecision {
        let max_retries = self.options.max_retries;
        if max_retries == 0 {
            return RetryDecision::Fail(error);
        }
        if self.attempt >= max_retries {
            self.errors.push(error);
            return RetryDecision::Fail(Error::MaxRetries {
                max_retries,
                errors: std::mem::take(&mut self.errors),
            });
        }
        if !self.options.should_retry(&error) {
            return RetryDecision::Fail(error);
        }
        self.errors.push(error);
        self.attempt += 1;
        RetryDecision::Retry(self.options.random_delay())
    }
}

/// Run `f` until it succeeds or [`QueryOptions`] says to stop.
///
/// `f` is called once per attempt; with `max_retries = n` it runs at most
/// `n + 1` times.
#[cfg(feature = "tokio")]
pub async fn with_retry<T, F>(options: &QueryOptions, mut f: F) -> crate::error::Result<T>
where
    F: AsyncFnMut() -> crate::error::Result<T>,
{
    let mut state = RetryState::new(options);
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(error) => match state.on_error(error) {
                RetryDecision::Retry(delay) => {
                    tracing::debug!(attempt = state.attempt(), ?delay, "retrying");
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Fail(error) => return Err(error),
            },
        }
    }
}
