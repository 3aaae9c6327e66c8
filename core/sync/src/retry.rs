//! Backoff for vault mutations.
//!
//! Creates and deletes are retried when the vault reports a transient
//! failure. Delays double from the initial delay up to a cap, with optional
//! jitter so that concurrent mirrors do not retry in lockstep.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use coldmirror_common::Result;

/// Upper bound for a single backoff delay.
const MAX_DELAY: Duration = Duration::from_secs(60);

/// How often and how patiently to retry.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt; zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap for the doubled delay.
    pub max_delay: Duration,
    /// Scale each delay by a random factor in `[0.75, 1.25)`.
    pub jitter: bool,
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_secs(1),
            max_delay: MAX_DELAY,
            jitter: true,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay before retry number `retry` (zero based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let doubled = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_delay);

        if self.jitter {
            doubled.mul_f64(0.75 + rand::random::<f64>() * 0.5)
        } else {
            doubled
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Awaits one vault operation at a time, sleeping in place between attempts.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation`, retrying while it fails with a transient error.
    ///
    /// `label` names the operation in log lines, e.g. `create report.pdf`.
    /// The error of the final attempt is returned.
    pub async fn execute<F, Fut, T>(&self, label: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;

        loop {
            let err = match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!("{} succeeded after {} retries", label, retries);
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_transient() || retries >= self.config.max_retries {
                if retries > 0 {
                    warn!("{} gave up after {} retries: {}", label, retries, err);
                }
                return Err(err);
            }

            let delay = self.config.delay_for_retry(retries);
            retries += 1;
            warn!("{} failed ({}), retry {} in {:?}", label, err, retries, delay);
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldmirror_common::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_retries: u32) -> RetryExecutor {
        RetryExecutor::new(
            RetryConfig::new(max_retries)
                .with_initial_delay(Duration::from_millis(1))
                .without_jitter(),
        )
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .without_jitter();

        assert_eq!(config.delay_for_retry(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_retry(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_retry(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_retry(3), Duration::from_secs(5));
        assert_eq!(config.delay_for_retry(40), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let config = RetryConfig::new(1).with_initial_delay(Duration::from_millis(1000));
        for _ in 0..50 {
            let delay = config.delay_for_retry(0);
            assert!(delay >= Duration::from_millis(750));
            assert!(delay < Duration::from_millis(1250));
        }
    }

    #[tokio::test]
    async fn test_transient_upload_failure_is_retried() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let result = quick(3)
            .execute("create a.txt", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Upload("connection reset".to_string()))
                } else {
                    Ok("archive-1")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "archive-1");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let result: Result<()> = quick(3)
            .execute("delete old", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::NotFound("archive old".to_string()))
            })
            .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_with_last_error() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let result: Result<()> = quick(2)
            .execute("delete old", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::Remote(format!("attempt {}", n)))
            })
            .await;

        match result {
            Err(Error::Remote(msg)) => assert_eq!(msg, "attempt 2"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let result: Result<()> = quick(0)
            .execute("create a.txt", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::Upload("boom".to_string()))
            })
            .await;

        assert!(matches!(result, Err(Error::Upload(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
