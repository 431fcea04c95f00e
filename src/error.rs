// Error taxonomy for collector operations. Transient network failures never surface here;
// they are retried inside api_client::retry and only show up as RetriesExceeded.

use thiserror::Error;

pub type Result<T, E = CollectorError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CollectorError {
    /// The monitoring server refused to create another model.
    #[error("model quota exceeded: {0}")]
    ModelQuotaExceeded(String),

    /// Carries the server's reason text verbatim.
    #[error("{0}")]
    MetricNotFound(String),

    /// The server reported success but the body was unusable. Not retried: the
    /// request already took effect.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExceeded {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    /// The data-path flush could not be confirmed; nothing may be deleted.
    #[error("flusher metric {metric} not observed within {timeout_secs}s")]
    FlusherMetricNotFound { metric: String, timeout_secs: u64 },

    #[error("user aborted operation")]
    UserAbortedOperation,

    #[error("no confirmation received within {timeout_secs}s")]
    WarningPromptTimeout { timeout_secs: u64 },

    /// Malformed caller input, rejected before any network call.
    #[error("{0}")]
    InvalidFilter(String),

    #[error("storage: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
