use std::future::Future;
use std::time::Duration;

use config::shared::RetryConfig;
use tracing::warn;

use crate::error::{ErrorKind, EtlError, EtlResult};

/// Retry behavior for a classified error.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RetryDirective {
    /// The operation is attempted again after the configured delay.
    Timed,
    /// The operation fails immediately.
    NoRetry,
}

/// Decides whether an error is worth another attempt.
///
/// Only transient connectivity, query and I/O failures are retried. Schema, data and
/// configuration errors would fail again the same way.
pub fn retry_directive(error: &EtlError) -> RetryDirective {
    match error.kind() {
        ErrorKind::SourceConnectionFailed
        | ErrorKind::DestinationConnectionFailed
        | ErrorKind::SourceQueryFailed
        | ErrorKind::DestinationQueryFailed
        | ErrorKind::SourceLockTimeout
        | ErrorKind::SourceOperationCanceled
        | ErrorKind::IoError
        | ErrorKind::SourceIoError
        | ErrorKind::DestinationIoError => RetryDirective::Timed,

        #[cfg(feature = "failpoints")]
        ErrorKind::WithTimedRetry => RetryDirective::Timed,

        _ => RetryDirective::NoRetry,
    }
}

/// Fixed-delay retry policy for one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Policy that runs the operation exactly once.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Runs `operation` until it succeeds, fails with a non retriable error or runs out of
    /// retries. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, step: &'static str, mut operation: F) -> EtlResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EtlResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if retry_directive(&err) == RetryDirective::NoRetry {
                        return Err(err);
                    }

                    if attempt >= self.max_retries {
                        warn!(step, attempts = attempt + 1, "giving up after retries");
                        return Err(err);
                    }

                    attempt += 1;
                    warn!(
                        step,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %err,
                        "step failed with a transient error, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.delay_ms))
    }
}
