// Retry loop shared by every monitoring API call.

use std::future::Future;

use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{CollectorError, Result};

/// Outcome of one failed attempt.
#[derive(Debug)]
pub enum AttemptError {
    /// Network error or unexpected response; try again while budget remains.
    Transient(String),
    /// Surfaces immediately, no further attempts.
    Fatal(CollectorError),
}

/// Runs `attempt` until it succeeds, fails fatally, or `policy.max_attempts` is used up.
/// Sleeps `policy.delay_after(n)` between attempts.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryConfig,
    operation: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    let mut failures: u32 = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(e)) => return Err(e),
            Err(AttemptError::Transient(last_error)) => {
                failures += 1;
                if failures >= policy.max_attempts {
                    return Err(CollectorError::RetriesExceeded {
                        operation: operation.to_string(),
                        attempts: failures,
                        last_error,
                    });
                }
                let delay = policy.delay_after(failures);
                warn!(
                    operation,
                    attempt = failures,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "request failed; retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
